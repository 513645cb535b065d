//! Concurrent Bloom filter with a stable binary format
//!
//! The filter is sized from an expected element count and a target false
//! positive probability, hashes keys with MurmurHash3 x64/128, and stores its
//! bits in atomics so a single instance can be shared across worker threads
//! behind an `Arc` without locking.
//!
//! Serialized layout, all integers big-endian:
//!
//! ```text
//! u8   strategy ordinal (0 = Murmur128Mitz32, 1 = Murmur128Mitz64)
//! u8   number of hash functions
//! i32  number of 64-bit words
//! i64  words...
//! ```
//!
//! This is the layout used by the signature databases the scanner consumes,
//! so filters written here can be read by the tools that build them and
//! vice versa.

mod bits;
pub mod murmur;

use crate::error::FilterError;
use bits::AtomicBitArray;
use murmur::murmur3_x64_128;
use std::io::Write;

const HEADER_LEN: usize = 6;

/// How the two 64-bit hash halves are turned into bit positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Legacy 32-bit combination. Supported for reading old databases.
    Murmur128Mitz32,
    /// 64-bit combination over the full 128-bit hash. Used for new filters.
    Murmur128Mitz64,
}

impl Strategy {
    pub fn ordinal(self) -> u8 {
        match self {
            Strategy::Murmur128Mitz32 => 0,
            Strategy::Murmur128Mitz64 => 1,
        }
    }

    pub fn from_ordinal(ordinal: u8) -> Option<Self> {
        match ordinal {
            0 => Some(Strategy::Murmur128Mitz32),
            1 => Some(Strategy::Murmur128Mitz64),
            _ => None,
        }
    }
}

/// Approximate set membership over byte strings.
///
/// No false negatives: once [`insert`](Self::insert) returns, every later
/// [`might_contain`](Self::might_contain) for that key on any thread returns
/// `true`. Keys that were never inserted test present with roughly the
/// configured probability.
#[derive(Debug)]
pub struct BloomFilter {
    bits: AtomicBitArray,
    num_hash_functions: u8,
    strategy: Strategy,
}

impl BloomFilter {
    /// Create an empty filter sized for `expected_insertions` at `fpp`.
    pub fn with_capacity(expected_insertions: u64, fpp: f64) -> Result<Self, FilterError> {
        if !(fpp > 0.0 && fpp < 1.0) {
            return Err(FilterError::InvalidParameters(format!(
                "false positive probability must be in (0, 1), got {}",
                fpp
            )));
        }

        let n = expected_insertions.max(1);
        let num_bits = optimal_num_of_bits(n, fpp);
        let num_hash_functions = optimal_num_of_hash_functions(n, num_bits);
        let num_words = num_bits.div_ceil(64);

        if num_words == 0 || num_words > i32::MAX as u64 {
            return Err(FilterError::InvalidParameters(format!(
                "cannot size a filter of {} bits",
                num_bits
            )));
        }
        let num_hash_functions = u8::try_from(num_hash_functions).map_err(|_| {
            FilterError::InvalidParameters(format!(
                "{} hash functions exceeds the format limit",
                num_hash_functions
            ))
        })?;

        Ok(Self {
            bits: AtomicBitArray::with_words(num_words as usize),
            num_hash_functions,
            strategy: Strategy::Murmur128Mitz64,
        })
    }

    /// Parse a serialized filter.
    ///
    /// Bytes after the last word are ignored.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, FilterError> {
        if bytes.len() < HEADER_LEN {
            return Err(FilterError::Truncated {
                expected: HEADER_LEN,
                actual: bytes.len(),
            });
        }

        let strategy =
            Strategy::from_ordinal(bytes[0]).ok_or(FilterError::UnknownStrategy(bytes[0]))?;
        let num_hash_functions = bytes[1];
        if num_hash_functions == 0 {
            return Err(FilterError::InvalidParameters(
                "number of hash functions is zero".to_string(),
            ));
        }
        let word_count = i32::from_be_bytes([bytes[2], bytes[3], bytes[4], bytes[5]]);
        if word_count <= 0 {
            return Err(FilterError::InvalidParameters(format!(
                "word count must be positive, got {}",
                word_count
            )));
        }

        let word_count = word_count as usize;
        let expected = HEADER_LEN + word_count * 8;
        if bytes.len() < expected {
            return Err(FilterError::Truncated {
                expected,
                actual: bytes.len(),
            });
        }

        let words = bytes[HEADER_LEN..expected]
            .chunks_exact(8)
            .map(|chunk| {
                let mut word = [0u8; 8];
                word.copy_from_slice(chunk);
                u64::from_be_bytes(word)
            })
            .collect();

        Ok(Self {
            bits: AtomicBitArray::from_words(words),
            num_hash_functions,
            strategy,
        })
    }

    /// Record `key`. Returns `true` if any bit changed, i.e. the key was
    /// definitely not present before this call.
    pub fn insert(&self, key: impl AsRef<[u8]>) -> bool {
        let mut changed = false;
        self.for_each_index(key.as_ref(), |idx| {
            changed |= self.bits.set(idx);
            true
        });
        changed
    }

    pub fn might_contain(&self, key: impl AsRef<[u8]>) -> bool {
        self.for_each_index(key.as_ref(), |idx| self.bits.get(idx))
    }

    /// Estimate of the number of distinct keys inserted, derived from the
    /// fraction of set bits.
    pub fn approximate_element_count(&self) -> u64 {
        let bit_size = self.bits.bit_size() as f64;
        let fraction_set = self.bits.count_ones() as f64 / bit_size;
        let estimate = -(-fraction_set).ln_1p() * bit_size / f64::from(self.num_hash_functions);
        // Saturates to u64::MAX when every bit is set.
        (estimate + 0.5).floor() as u64
    }

    pub fn num_hash_functions(&self) -> u8 {
        self.num_hash_functions
    }

    pub fn bit_size(&self) -> u64 {
        self.bits.bit_size()
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    /// Serialize into `writer`. Concurrent inserts during the write may or
    /// may not be captured.
    pub fn write_to<W: Write>(&self, mut writer: W) -> std::io::Result<()> {
        writer.write_all(&[self.strategy.ordinal(), self.num_hash_functions])?;
        writer.write_all(&(self.bits.word_count() as i32).to_be_bytes())?;
        for word in self.bits.snapshot() {
            writer.write_all(&word.to_be_bytes())?;
        }
        writer.flush()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + self.bits.word_count() * 8);
        // Writing to a Vec cannot fail.
        let _ = self.write_to(&mut out);
        out
    }

    /// Visit each bit index for `key`, stopping early if `visit` returns false.
    /// Returns whether every visit returned true.
    fn for_each_index(&self, key: &[u8], mut visit: impl FnMut(u64) -> bool) -> bool {
        let bit_size = self.bits.bit_size();
        let (h1, h2) = murmur3_x64_128(key, 0);

        match self.strategy {
            Strategy::Murmur128Mitz64 => {
                let mut combined = h1;
                for _ in 0..self.num_hash_functions {
                    if !visit((combined & i64::MAX as u64) % bit_size) {
                        return false;
                    }
                    combined = combined.wrapping_add(h2);
                }
            }
            Strategy::Murmur128Mitz32 => {
                let hash1 = h1 as i32;
                let hash2 = (h1 >> 32) as i32;
                for i in 1..=i32::from(self.num_hash_functions) {
                    let mut combined = hash1.wrapping_add(i.wrapping_mul(hash2));
                    if combined < 0 {
                        combined = !combined;
                    }
                    if !visit(combined as u64 % bit_size) {
                        return false;
                    }
                }
            }
        }
        true
    }
}

fn optimal_num_of_bits(n: u64, fpp: f64) -> u64 {
    let ln2 = std::f64::consts::LN_2;
    (-(n as f64) * fpp.ln() / (ln2 * ln2)) as u64
}

fn optimal_num_of_hash_functions(n: u64, num_bits: u64) -> u64 {
    let k = (num_bits as f64 / n as f64 * std::f64::consts::LN_2 + 0.5).floor();
    (k as u64).max(1)
}
