//! Wheel factorization tables: for each supported primorial modulus, the
//! gaps between consecutive residues coprime to it, packed 6 bits per gap
//! into 64-bit words. One revolution starts at residue 1 and the gaps sum
//! to the modulus, landing on residue 1 of the next block.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

use crate::error::{Error, Result};

/// Bits per packed wheel gap.
pub const BITS_PER_WHEEL_GAP: u32 = 6;
/// Packed gaps per 64-bit word; unused trailing slots are zero.
pub const GAPS_PER_WORD: usize = 10;
/// Mask extracting one packed gap.
pub const GAP_MASK: u64 = (1 << BITS_PER_WHEEL_GAP) - 1;

/// The wheel-30 gap ring 6,4,2,4,2,4,6,2 packed 4 bits per gap. Rotating
/// right by [`WHEEL30_BITS_PER_GAP`] after consuming the low nibble walks
/// the ring indefinitely.
pub const WHEEL30: u32 = 0x2642_4246;
pub const WHEEL30_MASK: u32 = 0xF;
pub const WHEEL30_BITS_PER_GAP: u32 = 4;

/// Moduli with precomputable wheels: the primorials of 5 through 23.
pub const SUPPORTED_MODULI: [u64; 7] =
    [30, 210, 2310, 30030, 510510, 9699690, 223092870];

const WHEEL_PRIMES: [u64; 10] = [2, 3, 5, 7, 11, 13, 17, 19, 23, 29];

/// A packed residue-gap ring for one modulus.
pub struct Wheel {
    modulus: u64,
    words: Vec<u64>,
}

impl Wheel {
    pub fn modulus(&self) -> u64 {
        self.modulus
    }

    /// The packed gap words.
    pub fn words(&self) -> &[u64] {
        &self.words
    }

    /// Unpacked gap sequence, including the zero padding in the final word.
    pub fn gaps(&self) -> impl Iterator<Item = u64> + '_ {
        self.words.iter().flat_map(|&word| {
            (0..GAPS_PER_WORD as u32)
                .map(move |slot| (word >> (slot * BITS_PER_WHEEL_GAP)) & GAP_MASK)
        })
    }
}

/// The prefix of {2, 3, 5, ...} whose product is `modulus`.
pub fn small_primes_for(modulus: u64) -> Result<&'static [u64]> {
    if SUPPORTED_MODULI.contains(&modulus) {
        let mut product = 1u64;
        for (i, &p) in WHEEL_PRIMES.iter().enumerate() {
            product *= p;
            if product == modulus {
                return Ok(&WHEEL_PRIMES[..=i]);
            }
        }
    }
    Err(Error::Config(format!(
        "unsupported wheel modulus {modulus}"
    )))
}

static WHEELS: OnceLock<Mutex<HashMap<u64, Arc<Wheel>>>> = OnceLock::new();

/// The wheel for `modulus`, computed on first use and cached process-wide.
pub fn wheel(modulus: u64) -> Result<Arc<Wheel>> {
    let small_primes = small_primes_for(modulus)?;
    let cache = WHEELS.get_or_init(|| Mutex::new(HashMap::new()));
    let mut guard = cache.lock().expect("wheel cache lock poisoned");
    if let Some(wheel) = guard.get(&modulus) {
        return Ok(Arc::clone(wheel));
    }
    log::debug!("building wheel for modulus {modulus}");
    let words = build_wheel(modulus, small_primes)?;
    let wheel = Arc::new(Wheel { modulus, words });
    guard.insert(modulus, Arc::clone(&wheel));
    Ok(wheel)
}

struct GapPacker {
    words: Vec<u64>,
    word: u64,
    slot: u32,
}

impl GapPacker {
    fn new() -> Self {
        GapPacker {
            words: Vec::new(),
            word: 0,
            slot: 0,
        }
    }

    fn push(&mut self, gap: u64, modulus: u64) -> Result<()> {
        if gap > GAP_MASK {
            return Err(Error::Config(format!(
                "wheel gap {gap} for modulus {modulus} does not fit in {BITS_PER_WHEEL_GAP} bits"
            )));
        }
        self.word |= gap << (self.slot * BITS_PER_WHEEL_GAP);
        self.slot += 1;
        if self.slot == GAPS_PER_WORD as u32 {
            self.words.push(self.word);
            self.word = 0;
            self.slot = 0;
        }
        Ok(())
    }

    fn finish(mut self) -> Vec<u64> {
        if self.slot > 0 {
            self.words.push(self.word);
        }
        self.words
    }
}

fn build_wheel(modulus: u64, small_primes: &[u64]) -> Result<Vec<u64>> {
    let mut packer = GapPacker::new();
    let mut last = 1u64;
    for residue in (3..modulus).step_by(2) {
        if small_primes.iter().all(|&p| residue % p != 0) {
            packer.push(residue - last, modulus)?;
            last = residue;
        }
    }
    // Close the revolution: land on residue 1 of the next block
    packer.push(modulus + 1 - last, modulus)?;
    Ok(packer.finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_primes_for() {
        assert_eq!(small_primes_for(30).unwrap(), &[2, 3, 5]);
        assert_eq!(small_primes_for(210).unwrap(), &[2, 3, 5, 7]);
        assert_eq!(
            small_primes_for(223092870).unwrap(),
            &[2, 3, 5, 7, 11, 13, 17, 19, 23]
        );
        assert!(small_primes_for(60).is_err());
        assert!(small_primes_for(0).is_err());
        assert!(small_primes_for(6469693230).is_err());
    }

    #[test]
    fn test_wheel30_ring_constant() {
        // Walking the packed u32 ring from residue 1 covers one turn of 30
        let mut ring = WHEEL30;
        let mut value = 1u64;
        let mut residues = Vec::new();
        for _ in 0..8 {
            residues.push(value);
            value += u64::from(ring & WHEEL30_MASK);
            ring = ring.rotate_right(WHEEL30_BITS_PER_GAP);
        }
        assert_eq!(residues, vec![1, 7, 11, 13, 17, 19, 23, 29]);
        assert_eq!(value, 31, "ring must land on residue 1 of the next turn");
        assert_eq!(ring, WHEEL30, "eight rotations return the ring to start");
    }

    fn walk_revolution(modulus: u64) -> u64 {
        let wheel = wheel(modulus).unwrap();
        let mut current = 1u64;
        for gap in wheel.gaps() {
            current += gap;
        }
        current
    }

    #[test]
    fn test_wheel_revolution_sums() {
        for modulus in [30u64, 210, 2310, 30030, 510510] {
            assert_eq!(
                walk_revolution(modulus),
                modulus + 1,
                "one revolution of wheel({}) must land on {}",
                modulus,
                modulus + 1
            );
        }
    }

    #[test]
    fn test_wheel_revolution_sum_9699690() {
        assert_eq!(walk_revolution(9699690), 9699691);
    }

    #[test]
    #[ignore = "builds the 36M-gap wheel; run with --ignored"]
    fn test_wheel_revolution_sum_223092870() {
        assert_eq!(walk_revolution(223092870), 223092871);
    }

    #[test]
    fn test_wheel_residues_are_coprime() {
        let wheel = wheel(210).unwrap();
        let mut residue = 1u64;
        let mut count = 0usize;
        for gap in wheel.gaps().filter(|&g| g != 0) {
            for &p in &[2u64, 3, 5, 7] {
                assert_ne!(residue % p, 0, "residue {} shares a factor with 210", residue);
            }
            residue += gap;
            count += 1;
        }
        // phi(210) = 48 residues per revolution
        assert_eq!(count, 48);
    }

    #[test]
    fn test_unsupported_modulus() {
        assert!(matches!(wheel(31), Err(Error::Config(_))));
        assert!(matches!(wheel(60), Err(Error::Config(_))));
    }
}
