//! Primality testing: an exact bitset oracle for values covered by the
//! prime-gap table, with a Miller-Rabin fallback above it.

use num_bigint::BigUint;
use num_integer::Integer;
use num_traits::{One, ToPrimitive};
use rand::Rng;

use crate::gaps::GapTable;

/// Rounds used everywhere a probabilistic test backs an exact answer.
/// The false-positive probability is at most 4^-25.
pub const MILLER_RABIN_ROUNDS: u32 = 25;

/// Checks whether a number is prime using a bitset of odd values below the
/// gap-table maximum, falling back to Miller-Rabin for larger numbers.
pub struct IsPrime {
    bits: Vec<u64>,
    max_prime: u64,
}

impl IsPrime {
    /// Build the oracle from the process-wide gap table.
    pub fn new() -> Self {
        Self::from_gaps(&crate::gaps::default_prime_gaps())
    }

    /// Build the oracle from a specific gap table.
    pub fn from_gaps(table: &GapTable) -> Self {
        let max_prime = table.primes().last().unwrap_or(2).max(2);

        // One bit per odd number in [1, max_prime]; 2 is handled separately.
        let num_bits = (max_prime / 2 + 1) as usize;
        let mut bits = vec![0u64; num_bits.div_ceil(64)];
        for prime in table.primes().skip(1) {
            let idx = (prime >> 1) as usize;
            bits[idx >> 6] |= 1 << (idx & 63);
        }

        IsPrime { bits, max_prime }
    }

    /// Largest value the bitset answers exactly.
    pub fn max_prime(&self) -> u64 {
        self.max_prime
    }

    /// Exact test for values covered by the table; false above it.
    pub fn is_small_prime_u64(&self, n: u64) -> bool {
        if n < 2 {
            return false;
        }
        if n == 2 {
            return true;
        }
        if n & 1 == 0 {
            return false;
        }
        if n > self.max_prime {
            return false;
        }
        let idx = (n >> 1) as usize;
        (self.bits[idx >> 6] >> (idx & 63)) & 1 == 1
    }

    /// Exact test for values covered by the table; false above it.
    pub fn is_small_prime(&self, n: &BigUint) -> bool {
        match n.to_u64() {
            Some(v) => self.is_small_prime_u64(v),
            None => false,
        }
    }

    /// Exact below the table maximum, probabilistic above it.
    pub fn is_prime(&self, n: &BigUint) -> bool {
        if let Some(v) = n.to_u64() {
            if v <= self.max_prime {
                return self.is_small_prime_u64(v);
            }
        }
        is_probably_prime(n, MILLER_RABIN_ROUNDS)
    }
}

impl Default for IsPrime {
    fn default() -> Self {
        Self::new()
    }
}

/// Miller-Rabin probabilistic primality test.
pub fn is_probably_prime(n: &BigUint, rounds: u32) -> bool {
    let one = BigUint::one();
    let two = &one + &one;
    let three = &two + &one;

    if *n < two {
        return false;
    }
    if *n == two || *n == three {
        return true;
    }
    if n.is_even() {
        return false;
    }

    // Write n-1 as 2^r * d with d odd
    let n_minus_1 = n - &one;
    let mut d = n_minus_1.clone();
    let mut r: u32 = 0;
    while d.is_even() {
        d >>= 1u32;
        r += 1;
    }

    let mut rng = rand::thread_rng();

    'witness: for _ in 0..rounds {
        // Random witness a in [2, n-2]
        let a = loop {
            let mut bytes = vec![0u8; n.to_bytes_be().len()];
            rng.fill(&mut bytes[..]);
            let a = BigUint::from_bytes_be(&bytes) % n;
            if a >= two && a <= &n_minus_1 - &one {
                break a;
            }
        };

        let mut x = a.modpow(&d, n);
        if x == one || x == n_minus_1 {
            continue 'witness;
        }

        for _ in 0..r - 1 {
            x = x.modpow(&two, n);
            if x == n_minus_1 {
                continue 'witness;
            }
        }

        return false;
    }

    true
}

/// Smallest prime strictly greater than `n`.
pub fn next_prime(n: &BigUint) -> BigUint {
    let two = BigUint::from(2u32);
    if *n < two {
        return two;
    }
    let mut candidate = n + 1u32;
    if candidate.is_even() {
        candidate += 1u32;
    }
    while !is_probably_prime(&candidate, MILLER_RABIN_ROUNDS) {
        candidate += 2u32;
    }
    candidate
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gaps::{generate_prime_gaps, GapTable};

    #[test]
    fn test_is_probably_prime() {
        assert!(is_probably_prime(&BigUint::from(7u32), 25));
        assert!(is_probably_prime(&BigUint::from(65537u32), 25));
        assert!(is_probably_prime(&BigUint::from(104729u32), 25));
        assert!(!is_probably_prime(&BigUint::from(100u32), 25));
        assert!(!is_probably_prime(&BigUint::from(1u32), 25));
        assert!(!is_probably_prime(&BigUint::from(0u32), 25));
    }

    #[test]
    fn test_next_prime() {
        assert_eq!(next_prime(&BigUint::from(0u32)), BigUint::from(2u32));
        assert_eq!(next_prime(&BigUint::from(2u32)), BigUint::from(3u32));
        assert_eq!(next_prime(&BigUint::from(3u32)), BigUint::from(5u32));
        assert_eq!(next_prime(&BigUint::from(13u32)), BigUint::from(17u32));
        assert_eq!(next_prime(&BigUint::from(65521u32)), BigUint::from(65537u32));
    }

    #[test]
    fn test_small_primes_exact() {
        let gaps = generate_prime_gaps(&BigUint::from(100u32), false);
        let oracle = IsPrime::from_gaps(&GapTable::from_bytes(gaps));
        assert_eq!(oracle.max_prime(), 97);

        let primes = [2u64, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37, 41, 43, 47, 89, 97];
        for p in primes {
            assert!(oracle.is_small_prime_u64(p), "oracle rejected prime {}", p);
        }
        let non_primes = [0u64, 1, 4, 6, 8, 9, 10, 12, 14, 15, 16, 18, 20, 91, 95];
        for c in non_primes {
            assert!(!oracle.is_small_prime_u64(c), "oracle accepted composite {}", c);
        }
    }

    #[test]
    fn test_exhaustive_below_max() {
        let gaps = generate_prime_gaps(&BigUint::from(1000u32), false);
        let oracle = IsPrime::from_gaps(&GapTable::from_bytes(gaps));
        // Compare against naive trial division for every value in range
        for n in 0..=oracle.max_prime() {
            let expected = n >= 2 && (2..n).take_while(|d| d * d <= n).all(|d| n % d != 0);
            assert_eq!(
                oracle.is_small_prime_u64(n),
                expected,
                "oracle disagrees with trial division at {}",
                n
            );
        }
    }

    #[test]
    fn test_is_prime_above_table() {
        let gaps = generate_prime_gaps(&BigUint::from(100u32), false);
        let oracle = IsPrime::from_gaps(&GapTable::from_bytes(gaps));
        // Values above the table fall through to Miller-Rabin
        assert!(oracle.is_prime(&BigUint::from(999983u64)));
        assert!(oracle.is_prime(&BigUint::from(1000003u64)));
        assert!(!oracle.is_prime(&BigUint::from(1000000u64)));
        // ...but the small-prime test alone says false up there
        assert!(!oracle.is_small_prime(&BigUint::from(999983u64)));
    }
}
