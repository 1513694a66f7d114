//! Trial-division factorizers: a linear walk over the prime-gap table for
//! small numbers and a multithreaded wheel search for large ones, behind
//! a single cache-aware dispatcher.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use num_bigint::BigUint;
use num_integer::Roots;
use num_traits::{One, ToPrimitive, Zero};

use crate::cache::FactorCache;
use crate::error::{Error, Result};
use crate::factors::PrimeFactors;
use crate::gaps::default_prime_gaps;
use crate::primality::{is_probably_prime, IsPrime, MILLER_RABIN_ROUNDS};
use crate::wheel::{
    small_primes_for, wheel, Wheel, BITS_PER_WHEEL_GAP, GAPS_PER_WORD, GAP_MASK,
    SUPPORTED_MODULI, WHEEL30, WHEEL30_BITS_PER_GAP, WHEEL30_MASK,
};

/// Below this, the linear factorizer wins over thread dispatch.
pub const LINEAR_CUTOFF: u64 = 3_000_000;

/// Worker count matching the machine.
pub fn default_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Factor `n` by walking the prime-gap table, then continuing on the
/// wheel-30 ring once the table is exhausted. Exact for every n >= 1.
pub fn factor_linear(n: &BigUint) -> PrimeFactors {
    let table = default_prime_gaps();
    let oracle = IsPrime::from_gaps(&table);
    let one = BigUint::one();

    let mut factors = PrimeFactors::new();
    let mut remainder = n.clone();
    let mut last_prime = 2u64;

    for prime in table.primes() {
        last_prime = prime;
        if remainder == one {
            return factors;
        }
        // A small-prime remainder is its own last factor
        if oracle.is_small_prime(&remainder) {
            factors.add_factor(remainder);
            return factors;
        }
        let prime = BigUint::from(prime);
        while (&remainder % &prime).is_zero() {
            factors.add_factor(prime.clone());
            remainder /= &prime;
        }
    }

    if remainder > one {
        // Continue past the table on the wheel-30 ring, aligned down to
        // the nearest candidate congruent to 1 mod 30. Rounding down only
        // re-tests primes already divided out; it cannot skip a candidate.
        let mut candidate = BigUint::from(last_prime);
        let excess = (&candidate % 30u32).to_u64().unwrap_or(0);
        candidate -= (excess + 29) % 30;

        let mut ring = WHEEL30;
        while remainder > one {
            if candidate > one {
                while (&remainder % &candidate).is_zero() {
                    factors.add_factor(candidate.clone());
                    remainder /= &candidate;
                }
            }
            let increment = u64::from(ring & WHEEL30_MASK);
            ring = ring.rotate_right(WHEEL30_BITS_PER_GAP);
            candidate += increment;
        }
    }

    factors
}

/// Factor `n` with `num_threads` workers sweeping wheel candidates up to
/// sqrt(n) in interleaved blocks of one wheel revolution each.
///
/// Fails with [`Error::TooSmall`] when sqrt(n) divided by the worker
/// count is below the smallest wheel modulus; the dispatcher downgrades
/// that case to the linear factorizer.
pub fn factor_parallel(n: &BigUint, num_threads: usize) -> Result<PrimeFactors> {
    let table = default_prime_gaps();
    let oracle = IsPrime::from_gaps(&table);
    let threads = num_threads.max(1);

    let sqrt_n = n.sqrt();
    let per_thread = &sqrt_n / (threads as u64);
    let modulus = SUPPORTED_MODULI
        .iter()
        .rev()
        .find(|&&m| per_thread >= BigUint::from(m))
        .copied()
        .ok_or_else(|| Error::TooSmall {
            modulus: per_thread.to_u64().unwrap_or(0),
        })?;
    let wheel = wheel(modulus)?;

    // Divide out the wheel's own primes up front; the wheel never visits
    // their multiples.
    let mut seeded = PrimeFactors::new();
    let mut remainder = n.clone();
    for &q in small_primes_for(modulus)? {
        let q = BigUint::from(q);
        while (&remainder % &q).is_zero() {
            seeded.add_factor(q.clone());
            remainder /= &q;
        }
    }

    let modulus_big = BigUint::from(modulus);
    let max_factor = (&sqrt_n + &modulus_big - 1u32) / &modulus_big * &modulus_big;

    let found = AtomicBool::new(false);
    let local = Mutex::new(seeded);

    log::debug!(
        "parallel factorization of {n}: modulus {modulus}, bound {max_factor}, {threads} threads"
    );

    std::thread::scope(|scope| {
        for thread_id in 0..threads {
            let wheel = &wheel;
            let local = &local;
            let found = &found;
            let oracle = &oracle;
            let max_factor = &max_factor;
            let modulus_big = &modulus_big;
            scope.spawn(move || {
                // This worker takes blocks thread_id, thread_id + threads, ...
                let stride = modulus_big * (threads as u64);
                let mut block_start = modulus_big * (thread_id as u64);
                while &block_start < max_factor && !found.load(Ordering::Relaxed) {
                    let mut block_end = &block_start + modulus_big;
                    if &block_end > max_factor {
                        block_end = max_factor.clone();
                    }
                    if search_block(n, &block_start, &block_end, oracle, wheel, local, found) {
                        return;
                    }
                    block_start += &stride;
                }
            });
        }
    });

    let mut local = local.into_inner().expect("factor set lock poisoned");
    let product = local.product();
    if product == *n {
        return Ok(local);
    }
    if product > *n {
        return Err(Error::ProductOverflow);
    }
    let residual = n / &product;
    if residual > BigUint::one() && is_probably_prime(&residual, MILLER_RABIN_ROUNDS) {
        local.add_factor(residual);
        Ok(local)
    } else {
        Err(Error::Incomplete { residual })
    }
}

/// Walk one wheel revolution of candidates in [block_start, block_end),
/// dividing hits into the shared factor set. Returns true once the
/// factorization is complete.
fn search_block(
    n: &BigUint,
    block_start: &BigUint,
    block_end: &BigUint,
    oracle: &IsPrime,
    wheel: &Wheel,
    local: &Mutex<PrimeFactors>,
    found: &AtomicBool,
) -> bool {
    let one = BigUint::one();
    let mut candidate = block_start + 1u32;

    while &candidate < block_end {
        for &word in wheel.words() {
            let mut word = word;
            for _ in 0..GAPS_PER_WORD {
                if found.load(Ordering::Relaxed) {
                    return false;
                }
                if candidate > one && (n % &candidate).is_zero() {
                    let mut guard = local.lock().expect("factor set lock poisoned");
                    // Another worker may have taken this factor already;
                    // work against the still-unfactored quotient.
                    let mut quotient = n / guard.product();
                    while (&quotient % &candidate).is_zero() {
                        guard.add_factor(candidate.clone());
                        quotient /= &candidate;
                    }
                    if quotient == one {
                        found.store(true, Ordering::Relaxed);
                        return true;
                    }
                    if quotient > one && oracle.is_prime(&quotient) {
                        guard.add_factor(quotient);
                        found.store(true, Ordering::Relaxed);
                        return true;
                    }
                }
                let gap = word & GAP_MASK;
                word >>= BITS_PER_WHEEL_GAP;
                if gap != 0 {
                    candidate += gap;
                }
            }
        }
    }
    false
}

/// Factor `n`: consult the cache, then pick the linear or parallel
/// strategy by size, downgrading a too-small parallel split to linear.
pub fn factor(n: &BigUint, cache: &FactorCache, num_threads: usize) -> Result<PrimeFactors> {
    Ok(factor_with_cache(n, cache, num_threads)?.0)
}

/// As [`factor`], also reporting whether the result came from the cache.
pub(crate) fn factor_with_cache(
    n: &BigUint,
    cache: &FactorCache,
    num_threads: usize,
) -> Result<(PrimeFactors, bool)> {
    if let Some(cached) = cache.lookup(n)? {
        log::debug!("cache hit for {n}");
        return Ok((cached, true));
    }
    if *n < BigUint::from(LINEAR_CUTOFF) {
        return Ok((factor_linear(n), false));
    }
    match factor_parallel(n, num_threads) {
        Ok(factors) => Ok((factors, false)),
        Err(Error::TooSmall { modulus }) => {
            log::debug!("per-thread modulus {modulus} below 30, using linear factorization");
            Ok((factor_linear(n), false))
        }
        Err(err) => Err(err),
    }
}
