//! Lock-free bit array backing [`BloomFilter`](super::BloomFilter).
//!
//! Words are `AtomicU64` and every operation uses `Relaxed` ordering:
//! `fetch_or` is enough for a set-only structure, and no other data is
//! published through these bits.

use std::sync::atomic::{AtomicU64, Ordering};

pub struct AtomicBitArray {
    words: Vec<AtomicU64>,
}

impl AtomicBitArray {
    /// Zeroed array with `num_words * 64` bits.
    pub fn with_words(num_words: usize) -> Self {
        Self::from_words(vec![0; num_words])
    }

    pub fn from_words(words: Vec<u64>) -> Self {
        Self {
            words: words.into_iter().map(AtomicU64::new).collect(),
        }
    }

    #[inline]
    pub fn bit_size(&self) -> u64 {
        self.words.len() as u64 * 64
    }

    #[inline]
    pub fn word_count(&self) -> usize {
        self.words.len()
    }

    /// Sets bit `idx`, returning `true` if it was previously clear.
    #[inline]
    pub fn set(&self, idx: u64) -> bool {
        let mask = 1u64 << (idx % 64);
        let prev = self.words[(idx / 64) as usize].fetch_or(mask, Ordering::Relaxed);
        prev & mask == 0
    }

    #[inline]
    pub fn get(&self, idx: u64) -> bool {
        let mask = 1u64 << (idx % 64);
        self.words[(idx / 64) as usize].load(Ordering::Relaxed) & mask != 0
    }

    /// Number of set bits. A snapshot when inserts are in flight.
    pub fn count_ones(&self) -> u64 {
        self.words
            .iter()
            .map(|w| u64::from(w.load(Ordering::Relaxed).count_ones()))
            .sum()
    }

    /// Point-in-time copy of the words.
    pub fn snapshot(&self) -> Vec<u64> {
        self.words.iter().map(|w| w.load(Ordering::Relaxed)).collect()
    }
}

impl std::fmt::Debug for AtomicBitArray {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AtomicBitArray")
            .field("words", &self.words.len())
            .finish()
    }
}
