//! Heap layout arithmetic
//!
//! For a tree of max depth `D`, the node `(id, depth)` owns
//! `D - depth + 1` bits starting at `2^(depth+1) + id * (D - depth + 1)`.
//! Levels are stored back to back; depth `D` is the one-bit leaf
//! bitfield. The whole heap spans `2^(D+2)` bits.

use crate::tree::Node;

use super::WORD_BITS;

/// Number of bits a node at `node.depth` occupies.
#[inline]
pub fn node_bit_width(node: Node, max_depth: u32) -> u32 {
    debug_assert!(node.depth <= max_depth);
    max_depth - node.depth + 1
}

/// First heap bit of `node`.
#[inline]
pub fn node_bit_offset(node: Node, max_depth: u32) -> u64 {
    (2u64 << node.depth) + node.id * u64::from(node_bit_width(node, max_depth))
}

/// First heap bit of the leaf bitfield.
#[inline]
pub fn bitfield_bit_offset(max_depth: u32) -> u64 {
    node_bit_offset(Node::new(1u64 << max_depth, max_depth), max_depth)
}

/// Total heap size in bits.
#[inline]
pub fn heap_bit_size(max_depth: u32) -> u64 {
    4u64 << max_depth
}

/// Number of `u64` words backing a heap.
#[inline]
pub fn heap_word_count(max_depth: u32) -> usize {
    (heap_bit_size(max_depth) / WORD_BITS).max(1) as usize
}

/// Size in bytes of the heap for `max_depth`.
#[inline]
pub fn heap_byte_size(max_depth: u32) -> usize {
    heap_word_count(max_depth) * std::mem::size_of::<u64>()
}
