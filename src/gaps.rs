//! The prime-gap table: a byte stream of LEB128-encoded gaps between
//! consecutive primes, starting with the gap from 0 to the first prime.
//! Walking the stream and accumulating yields 2, 3, 5, 7, 11, ...
//!
//! The process-wide table is either memory-mapped from a file produced by
//! `primegen`, or generated on demand up to a small default bound.

use std::fs::File;
use std::path::Path;
use std::sync::{Arc, RwLock};

use memmap2::Mmap;
use num_bigint::BigUint;
use num_traits::{ToPrimitive, Zero};

use crate::error::Result;
use crate::primality::next_prime;

/// Bound for the lazily generated fallback table.
pub const DEFAULT_GAP_LIMIT: u64 = 65536;

enum Backing {
    Mapped(Mmap),
    Owned(Vec<u8>),
}

/// A prime-gap byte stream, either memory-mapped or owned.
pub struct GapTable {
    backing: Backing,
}

impl GapTable {
    /// Wrap an owned gap buffer.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        GapTable {
            backing: Backing::Owned(bytes),
        }
    }

    /// The raw encoded gap stream.
    pub fn bytes(&self) -> &[u8] {
        match &self.backing {
            Backing::Mapped(map) => map,
            Backing::Owned(bytes) => bytes,
        }
    }

    /// Walk the table, yielding 2, 3, 5, ... up to the table maximum.
    pub fn primes(&self) -> PrimeIter<'_> {
        PrimeIter {
            bytes: self.bytes(),
            pos: 0,
            current: 0,
        }
    }
}

/// Lazy prime sequence decoded from a gap stream.
pub struct PrimeIter<'a> {
    bytes: &'a [u8],
    pos: usize,
    current: u64,
}

impl Iterator for PrimeIter<'_> {
    type Item = u64;

    fn next(&mut self) -> Option<u64> {
        let gap = decode_gap(self.bytes, &mut self.pos)?;
        self.current += gap;
        Some(self.current)
    }
}

/// Decode one LEB128 gap at `pos`, advancing it. `None` at end of stream;
/// a group truncated by EOF also terminates the stream.
pub fn decode_gap(bytes: &[u8], pos: &mut usize) -> Option<u64> {
    if *pos >= bytes.len() {
        return None;
    }
    let mut gap = 0u64;
    let mut shift = 0u32;
    loop {
        let byte = *bytes.get(*pos)?;
        *pos += 1;
        gap |= u64::from(byte & 0x7F) << shift;
        shift += 7;
        if byte & 0x80 == 0 {
            break;
        }
    }
    Some(gap)
}

/// Append one LEB128-encoded gap to `out`.
pub fn encode_gap(mut gap: u64, out: &mut Vec<u8>) {
    loop {
        let mut byte = (gap & 0x7F) as u8;
        gap >>= 7;
        if gap > 0 {
            byte |= 0x80;
        }
        out.push(byte);
        if gap == 0 {
            break;
        }
    }
}

static PRIME_GAPS: RwLock<Option<Arc<GapTable>>> = RwLock::new(None);

/// Memory-map a gap file read-only and install it as the process-wide
/// table, replacing (and unmapping) any previous one.
pub fn load_prime_gaps(path: impl AsRef<Path>) -> Result<()> {
    let file = File::open(path)?;
    let map = unsafe { Mmap::map(&file)? };
    let table = Arc::new(GapTable {
        backing: Backing::Mapped(map),
    });
    let mut guard = PRIME_GAPS.write().expect("prime gap table lock poisoned");
    *guard = Some(table);
    Ok(())
}

/// The process-wide gap table, generating one up to `fallback_limit` when
/// nothing has been loaded.
pub fn prime_gaps(fallback_limit: u64) -> Arc<GapTable> {
    if let Some(table) = PRIME_GAPS
        .read()
        .expect("prime gap table lock poisoned")
        .as_ref()
    {
        return Arc::clone(table);
    }
    let mut guard = PRIME_GAPS.write().expect("prime gap table lock poisoned");
    if let Some(table) = guard.as_ref() {
        return Arc::clone(table);
    }
    log::debug!("no gap file loaded, generating primes up to {fallback_limit}");
    let bytes = generate_prime_gaps(&BigUint::from(fallback_limit), false);
    let table = Arc::new(GapTable::from_bytes(bytes));
    *guard = Some(Arc::clone(&table));
    table
}

/// The process-wide gap table with the default fallback bound.
pub fn default_prime_gaps() -> Arc<GapTable> {
    prime_gaps(DEFAULT_GAP_LIMIT)
}

/// Compute an encoded gap stream from scratch: up to the `limit`-th prime
/// when `is_count`, otherwise up to value <= `limit`.
pub fn generate_prime_gaps(limit: &BigUint, is_count: bool) -> Vec<u8> {
    let mut gaps = Vec::new();
    if *limit < BigUint::from(3u32) {
        return gaps;
    }

    let mut next = BigUint::from(2u32);
    let mut previous = BigUint::zero();
    let mut count = BigUint::zero();
    loop {
        let in_range = if is_count {
            count < *limit
        } else {
            next <= *limit
        };
        if !in_range {
            break;
        }
        let gap = &next - &previous;
        encode_gap(gap.to_u64().unwrap_or(0), &mut gaps);
        previous = next.clone();
        next = next_prime(&next);
        count += 1u32;
    }
    gaps
}

/// The `n`-th prime, 0-indexed. Walks the table and continues with a
/// probabilistic next-prime search when the index lies beyond it.
pub fn get_nth_prime(n: usize) -> BigUint {
    let table = default_prime_gaps();
    let mut count = 0usize;
    let mut last = 0u64;
    for prime in table.primes() {
        if count == n {
            return BigUint::from(prime);
        }
        last = prime;
        count += 1;
    }

    let mut prime = BigUint::from(last);
    while count <= n {
        prime = next_prime(&prime);
        count += 1;
    }
    prime
}

/// The 0-based index of `prime` in the sequence of primes; the same
/// table-then-fallback walk as [`get_nth_prime`].
pub fn get_prime_index(prime: &BigUint) -> usize {
    let table = default_prime_gaps();
    let mut index = 0usize;
    let mut current = BigUint::from(2u32);
    let mut iter = table.primes();
    iter.next();
    while current < *prime {
        match iter.next() {
            Some(p) => {
                current = BigUint::from(p);
                index += 1;
            }
            None => break,
        }
    }
    while current < *prime {
        current = next_prime(&current);
        index += 1;
    }
    index
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode_roundtrip() {
        let mut buf = Vec::new();
        let values = [0u64, 1, 2, 127, 128, 129, 255, 16384, u64::from(u32::MAX), u64::MAX];
        for v in values {
            encode_gap(v, &mut buf);
        }
        let mut pos = 0;
        for v in values {
            assert_eq!(decode_gap(&buf, &mut pos), Some(v));
        }
        assert_eq!(decode_gap(&buf, &mut pos), None);
    }

    #[test]
    fn test_generate_prime_gaps() {
        let gaps = generate_prime_gaps(&BigUint::from(100u32), false);
        assert!(!gaps.is_empty());
        // 2, 3, 5, 7, 11, 13 give gaps 2, 1, 2, 2, 4, 2
        assert_eq!(&gaps[..6], &[2, 1, 2, 2, 4, 2]);

        let primes: Vec<u64> = GapTable::from_bytes(gaps).primes().collect();
        assert_eq!(primes.len(), 25, "there are 25 primes below 100");
        assert_eq!(primes.first(), Some(&2));
        assert_eq!(primes.last(), Some(&97));
    }

    #[test]
    fn test_generate_by_count() {
        let gaps = generate_prime_gaps(&BigUint::from(10u32), true);
        let primes: Vec<u64> = GapTable::from_bytes(gaps).primes().collect();
        assert_eq!(primes, vec![2, 3, 5, 7, 11, 13, 17, 19, 23, 29]);
    }

    #[test]
    fn test_generate_below_three_is_empty() {
        assert!(generate_prime_gaps(&BigUint::from(2u32), false).is_empty());
        assert!(generate_prime_gaps(&BigUint::from(0u32), true).is_empty());
    }

    #[test]
    fn test_prime_iter_is_strictly_increasing() {
        let gaps = generate_prime_gaps(&BigUint::from(1000u32), false);
        let table = GapTable::from_bytes(gaps);
        let mut last = 0u64;
        for p in table.primes() {
            assert!(p > last, "prime walk must be strictly increasing");
            last = p;
        }
        assert_eq!(last, 997);
    }

    #[test]
    fn test_get_nth_prime_small() {
        let expected = [2u32, 3, 5, 7, 11, 13, 17, 19, 23, 29];
        for (i, p) in expected.iter().enumerate() {
            assert_eq!(get_nth_prime(i), BigUint::from(*p));
        }
    }

    #[test]
    fn test_get_prime_index_small() {
        let primes = [2u32, 3, 5, 7, 11, 13, 17, 19, 23, 29];
        for (i, p) in primes.iter().enumerate() {
            assert_eq!(get_prime_index(&BigUint::from(*p)), i);
        }
    }

    #[test]
    fn test_nth_prime_index_inverse() {
        for i in [0usize, 1, 10, 100, 1000] {
            let p = get_nth_prime(i);
            assert_eq!(
                get_prime_index(&p),
                i,
                "get_prime_index(get_nth_prime({})) must round-trip",
                i
            );
        }
    }

}
