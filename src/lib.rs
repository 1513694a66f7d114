//! Aliquot sequences over a cached, wheeled, multithreaded factorizer.
//!
//! Starting from N, the aliquot sequence repeatedly replaces the current
//! value with the sum of its proper divisors until it reaches zero, a
//! perfect number, or a cycle. The sequences grow fast, so the crate is
//! mostly a factorization engine: a memory-mappable prime-gap table, a
//! bitset primality oracle, packed factorization wheels, a linear and a
//! parallel trial-division factorizer, and a persistent on-disk cache of
//! known factorizations.

pub mod cache;
pub mod error;
pub mod factorize;
pub mod factors;
pub mod gaps;
pub mod primality;
pub mod sequence;
pub mod wheel;

pub use cache::{CacheInfo, CacheStats, FactorCache};
pub use error::{Error, Result};
pub use factorize::{default_threads, factor, factor_linear, factor_parallel};
pub use factors::PrimeFactors;
pub use gaps::{
    generate_prime_gaps, get_nth_prime, get_prime_index, load_prime_gaps, prime_gaps, GapTable,
};
pub use primality::{is_probably_prime, next_prime, IsPrime};
pub use sequence::{aliquot_sequence, sum_of_divisors};
pub use wheel::{small_primes_for, wheel, Wheel};
