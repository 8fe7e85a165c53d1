//! Dense bitset stored as packed u64 words.
//!
//! Used for per-column missing-value masks and for dense membership sets.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DenseBitset {
    len: usize,
    words: Vec<u64>,
}

impl DenseBitset {
    /// All-zero bitset of `len` bits.
    pub fn new(len: usize) -> Self {
        DenseBitset {
            len,
            words: vec![0; len.div_ceil(64)],
        }
    }

    /// Number of bits in the bitset.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Get bit at the given index. Returns false for out-of-range indices.
    pub fn get(&self, index: usize) -> bool {
        if index >= self.len {
            return false;
        }
        (self.words[index / 64] >> (index % 64)) & 1 == 1
    }

    /// Set or clear a bit, growing the bitset if needed.
    pub fn set(&mut self, index: usize, value: bool) {
        if index >= self.len {
            self.len = index + 1;
            self.words.resize(self.len.div_ceil(64), 0);
        }
        let mask = 1u64 << (index % 64);
        if value {
            self.words[index / 64] |= mask;
        } else {
            self.words[index / 64] &= !mask;
        }
    }

    /// Append one bit at the end.
    pub fn push(&mut self, value: bool) {
        let index = self.len;
        self.set(index, value);
    }

    pub fn count_ones(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Indices of set bits in increasing order.
    pub fn iter_ones(&self) -> impl Iterator<Item = usize> + '_ {
        self.words.iter().enumerate().flat_map(|(wi, &word)| {
            let mut w = word;
            std::iter::from_fn(move || {
                if w == 0 {
                    return None;
                }
                let bit = w.trailing_zeros() as usize;
                w &= w - 1;
                Some(wi * 64 + bit)
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_bitset() {
        let bs = DenseBitset::new(0);
        assert_eq!(bs.len(), 0);
        assert!(bs.is_empty());
        assert!(!bs.get(0));
    }

    #[test]
    fn test_set_get_multi_word() {
        let mut bs = DenseBitset::new(128);
        bs.set(0, true);
        bs.set(64, true);
        bs.set(127, true);
        assert!(bs.get(0));
        assert!(!bs.get(63));
        assert!(bs.get(64));
        assert!(bs.get(127));
        assert_eq!(bs.count_ones(), 3);
        bs.set(64, false);
        assert!(!bs.get(64));
        assert!(!bs.get(1000));
    }

    #[test]
    fn test_push_and_iter_ones() {
        let mut bs = DenseBitset::default();
        for i in 0..130 {
            bs.push(i % 3 == 0);
        }
        assert_eq!(bs.len(), 130);
        let ones: Vec<usize> = bs.iter_ones().collect();
        assert_eq!(ones, (0..130).filter(|i| i % 3 == 0).collect::<Vec<_>>());
    }
}
