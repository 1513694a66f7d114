//! A multiset of prime factors: prime -> exponent, with product and
//! divisor enumeration.

use std::collections::BTreeMap;
use std::fmt;

use num_bigint::BigUint;
use num_traits::One;

/// Prime factorization as a map from prime to exponent (always >= 1).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrimeFactors {
    counts: BTreeMap<BigUint, usize>,
}

impl PrimeFactors {
    pub fn new() -> Self {
        PrimeFactors {
            counts: BTreeMap::new(),
        }
    }

    /// Record one occurrence of `factor`.
    pub fn add_factor(&mut self, factor: BigUint) {
        *self.counts.entry(factor).or_insert(0) += 1;
    }

    /// Record `exponent` occurrences of `factor` at once.
    pub fn add_factor_pow(&mut self, factor: BigUint, exponent: usize) {
        if exponent > 0 {
            *self.counts.entry(factor).or_insert(0) += exponent;
        }
    }

    /// Fold another factorization into this one.
    pub fn merge(&mut self, other: &PrimeFactors) {
        for (prime, &count) in &other.counts {
            *self.counts.entry(prime.clone()).or_insert(0) += count;
        }
    }

    pub fn contains(&self, factor: &BigUint) -> bool {
        self.counts.contains_key(factor)
    }

    /// Exponent of `factor`, 0 when absent.
    pub fn exponent_of(&self, factor: &BigUint) -> usize {
        self.counts.get(factor).copied().unwrap_or(0)
    }

    /// Number of distinct primes.
    pub fn distinct_count(&self) -> usize {
        self.counts.len()
    }

    /// Sum of exponents (the number Omega of prime factors with multiplicity).
    pub fn count(&self) -> usize {
        self.counts.values().sum()
    }

    pub fn largest_factor(&self) -> Option<&BigUint> {
        self.counts.keys().next_back()
    }

    pub fn max_exponent(&self) -> usize {
        self.counts.values().copied().max().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn clear(&mut self) {
        self.counts.clear();
    }

    /// Iterate over (prime, exponent) pairs in ascending prime order.
    pub fn iter(&self) -> impl Iterator<Item = (&BigUint, usize)> {
        self.counts.iter().map(|(prime, &count)| (prime, count))
    }

    /// The represented integer: the product of all prime powers.
    pub fn product(&self) -> BigUint {
        let mut product = BigUint::one();
        for (prime, &count) in &self.counts {
            for _ in 0..count {
                product *= prime;
            }
        }
        product
    }

    /// Every divisor of the product, as all combinations of prime powers.
    /// The result has prod(exponent + 1) entries and always contains 1.
    pub fn divisors(&self, sorted: bool) -> Vec<BigUint> {
        let mut divisors = vec![BigUint::one()];
        for (prime, &count) in &self.counts {
            let current_size = divisors.len();
            let mut prime_power = BigUint::one();
            for _ in 1..=count {
                prime_power *= prime;
                for j in 0..current_size {
                    divisors.push(&divisors[j] * &prime_power);
                }
            }
        }
        if sorted {
            divisors.sort_unstable();
        }
        divisors
    }
}

impl fmt::Display for PrimeFactors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.counts.is_empty() {
            return write!(f, "1");
        }
        let mut first = true;
        for (prime, &count) in &self.counts {
            if !first {
                write!(f, " * ")?;
            }
            if count == 1 {
                write!(f, "{}", prime)?;
            } else {
                write!(f, "{}^{}", prime, count)?;
            }
            first = false;
        }
        Ok(())
    }
}
