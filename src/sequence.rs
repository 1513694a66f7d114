//! The aliquot-sequence driver: iterate N -> s(N) until the sum reaches
//! zero, a perfect number fixes the sequence, or a cycle repeats.

use std::path::Path;

use num_bigint::BigUint;
use num_traits::Zero;

use crate::cache::{self, FactorCache};
use crate::error::Result;
use crate::factorize::{factor, factor_with_cache};
use crate::factors::PrimeFactors;

/// Sum of the divisors of `n` excluding `n` itself, with the
/// factorization that produced it.
pub fn sum_of_divisors(
    n: &BigUint,
    cache: &FactorCache,
    num_threads: usize,
) -> Result<(BigUint, PrimeFactors)> {
    let factors = factor(n, cache, num_threads)?;
    let sum = aliquot_sum(&factors, n);
    Ok((sum, factors))
}

fn aliquot_sum(factors: &PrimeFactors, n: &BigUint) -> BigUint {
    let mut sum = BigUint::zero();
    for divisor in factors.divisors(false) {
        if &divisor != n {
            sum += divisor;
        }
    }
    sum
}

/// Compute the aliquot sequence of `n`: the successive sums of proper
/// divisors, stopping at zero, at a fixed point (perfect number), or when
/// a sum repeats (amicable pair or longer sociable cycle).
///
/// Some sequences are open problems; nothing here guarantees termination
/// for an arbitrary starting value.
pub fn aliquot_sequence(
    n: &BigUint,
    cache_path: Option<&Path>,
    verbose: bool,
    num_threads: usize,
) -> Result<Vec<BigUint>> {
    let cache = match cache_path {
        Some(path) => FactorCache::open(path)?,
        None => FactorCache::closed(),
    };

    let mut history: Vec<BigUint> = Vec::new();
    let mut current = n.clone();
    loop {
        let (factors, from_cache) = factor_with_cache(&current, &cache, num_threads)?;
        if cache.is_open() && !from_cache && cache::fits_width(&current) && !factors.is_empty() {
            cache.insert(&factors)?;
        }

        let sum = aliquot_sum(&factors, &current);
        if verbose {
            println!("{}: {}", history.len(), sum);
        }
        if sum.is_zero() {
            break;
        }
        history.push(sum.clone());
        if sum == current {
            // Perfect number: the sequence is a fixed point
            break;
        }
        if history[..history.len() - 1].contains(&sum) {
            log::debug!("cycle detected at {sum}");
            break;
        }
        current = sum;
    }
    Ok(history)
}
