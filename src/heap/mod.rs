//! Bit-addressable heap storage
//!
//! The tree lives in a flat array of `u64` words viewed as a single
//! little-endian bit string: bit `i` is bit `i % 64` of word `i / 64`.
//! Fields of any width up to 64 bits may straddle two adjacent words;
//! the low part of the value lives in the lower word.
//!
//! The same layout is read by GPU-side routines, so the raw words are
//! exposed as a byte view for upload.

mod layout;

pub use layout::{
    bitfield_bit_offset, heap_bit_size, heap_byte_size, heap_word_count, node_bit_offset,
    node_bit_width,
};

use std::ops::Range;

use bitvec::prelude::*;

use crate::tree::TreeError;

/// Width of one storage word in bits.
pub const WORD_BITS: u64 = u64::BITS as u64;

/// Packed bit heap backed by `u64` words.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitHeap {
    bits: BitVec<u64, Lsb0>,
}

impl BitHeap {
    /// Allocate `word_count` zeroed words.
    ///
    /// Allocation failure is reported instead of aborting the process.
    pub fn zeroed(word_count: usize) -> Result<Self, TreeError> {
        let mut words: Vec<u64> = Vec::new();
        words
            .try_reserve_exact(word_count)
            .map_err(|_| TreeError::HeapAllocation {
                bytes: word_count.saturating_mul(std::mem::size_of::<u64>()),
            })?;
        words.resize(word_count, 0);
        Ok(Self::from_words(words))
    }

    /// Wrap existing words (e.g. a device readback).
    pub fn from_words(words: Vec<u64>) -> Self {
        Self {
            bits: BitVec::from_vec(words),
        }
    }

    /// Capacity in bits.
    #[inline]
    pub fn bit_len(&self) -> u64 {
        self.bits.len() as u64
    }

    /// Read `bit_count` bits starting at `first_bit`.
    ///
    /// # Panics
    /// Panics if `bit_count` is not in `1..=64` or the range exceeds the heap.
    #[inline]
    pub fn get(&self, first_bit: u64, bit_count: u32) -> u64 {
        let range = self.checked_range(first_bit, bit_count);
        self.bits[range].load_le::<u64>()
    }

    /// Write the low `bit_count` bits of `value` starting at `first_bit`.
    ///
    /// Bits outside the range are left untouched.
    ///
    /// # Panics
    /// Panics if `bit_count` is not in `1..=64` or the range exceeds the heap.
    #[inline]
    pub fn set(&mut self, first_bit: u64, bit_count: u32, value: u64) {
        let range = self.checked_range(first_bit, bit_count);
        self.bits[range].store_le::<u64>(value & low_mask(bit_count));
    }

    /// Read a single bit.
    #[inline]
    pub fn bit(&self, index: u64) -> bool {
        assert!(
            index < self.bit_len(),
            "bit {} outside heap of {} bits",
            index,
            self.bit_len()
        );
        self.bits[index as usize]
    }

    /// Write a single bit, returning whether it changed.
    #[inline]
    pub fn set_bit(&mut self, index: u64, value: bool) -> bool {
        assert!(
            index < self.bit_len(),
            "bit {} outside heap of {} bits",
            index,
            self.bit_len()
        );
        let previous = self.bits.replace(index as usize, value);
        previous != value
    }

    /// Zero `bit_count` bits starting at `first_bit`.
    pub fn clear_range(&mut self, first_bit: u64, bit_count: u64) {
        let end = first_bit + bit_count;
        assert!(
            end <= self.bit_len(),
            "clear range {}..{} exceeds heap of {} bits",
            first_bit,
            end,
            self.bit_len()
        );
        self.bits[first_bit as usize..end as usize].fill(false);
    }

    /// Underlying storage words.
    #[inline]
    pub fn words(&self) -> &[u64] {
        self.bits.as_raw_slice()
    }

    /// Mutable access to the storage words.
    #[inline]
    pub fn words_mut(&mut self) -> &mut [u64] {
        self.bits.as_raw_mut_slice()
    }

    /// Byte view of the storage words, ready for upload.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(self.words())
    }

    fn checked_range(&self, first_bit: u64, bit_count: u32) -> Range<usize> {
        assert!(
            (1..=u64::BITS).contains(&bit_count),
            "bit count {} outside 1..=64",
            bit_count
        );
        let end = first_bit + u64::from(bit_count);
        assert!(
            end <= self.bit_len(),
            "bit range {}..{} exceeds heap of {} bits",
            first_bit,
            end,
            self.bit_len()
        );
        first_bit as usize..end as usize
    }
}

#[inline]
fn low_mask(bit_count: u32) -> u64 {
    if bit_count >= u64::BITS {
        u64::MAX
    } else {
        (1u64 << bit_count) - 1
    }
}
