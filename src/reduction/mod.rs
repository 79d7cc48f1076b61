//! Sum-reduction engine
//!
//! Every node above the leaf bitfield stores the number of set bitfield
//! bits in its subtree, so the root holds the leaf count and
//! `sum(n) == sum(left(n)) + sum(right(n))` everywhere.
//!
//! Three ways to restore the invariant:
//! - [`compute_sum_reduction`]: full bottom-up rebuild, O(2^D)
//! - [`update_sum_reduction`]: one bitfield bit changed, O(D)
//! - [`ReductionSchedule`]: the full rebuild cut into bounded passes,
//!   each pass evaluated in parallel (compute-dispatch style)

mod schedule;

pub use schedule::{execute_schedule, PassKind, ReductionPass, ReductionSchedule};

use tracing::trace;

use crate::heap::{bitfield_bit_offset, node_bit_offset, node_bit_width, BitHeap, WORD_BITS};
use crate::tree::Node;

/// Levels derived directly from one 64-bit bitfield word.
pub const PREPASS_LEVELS: u32 = WORD_BITS.trailing_zeros();

/// Read the value stored at `node`.
#[inline]
pub(crate) fn read_node(heap: &BitHeap, max_depth: u32, node: Node) -> u64 {
    heap.get(
        node_bit_offset(node, max_depth),
        node_bit_width(node, max_depth),
    )
}

/// Store `value` at `node`.
#[inline]
pub(crate) fn write_node(heap: &mut BitHeap, max_depth: u32, node: Node, value: u64) {
    heap.set(
        node_bit_offset(node, max_depth),
        node_bit_width(node, max_depth),
        value,
    );
}

#[inline]
fn fold_node(heap: &mut BitHeap, max_depth: u32, node: Node) {
    let sum = read_node(heap, max_depth, node.left_child())
        + read_node(heap, max_depth, node.right_child());
    write_node(heap, max_depth, node, sum);
}

/// Rebuild every internal sum from the leaf bitfield.
pub fn compute_sum_reduction(heap: &mut BitHeap, max_depth: u32) {
    let mut depth = max_depth;

    if max_depth >= PREPASS_LEVELS {
        sum_reduce_prepass(heap, max_depth);
        depth = max_depth - PREPASS_LEVELS;
    }

    while depth > 0 {
        depth -= 1;
        for id in (1u64 << depth)..(2u64 << depth) {
            fold_node(heap, max_depth, Node::new(id, depth));
        }
    }

    trace!(max_depth, "full sum reduction");
}

/// Fill the [`PREPASS_LEVELS`] levels above the bitfield with popcounts.
///
/// Requires `max_depth >= PREPASS_LEVELS` so bitfield words are aligned.
pub fn sum_reduce_prepass(heap: &mut BitHeap, max_depth: u32) {
    assert!(
        max_depth >= PREPASS_LEVELS,
        "prepass needs max depth >= {}",
        PREPASS_LEVELS
    );
    let first_word = (bitfield_bit_offset(max_depth) / WORD_BITS) as usize;
    let word_count = 1usize << (max_depth - PREPASS_LEVELS);

    for word_index in 0..word_count {
        let word = heap.words()[first_word + word_index];
        let first_leaf = (1u64 << max_depth) + (word_index as u64) * WORD_BITS;
        for (node, sum) in word_sums(word, first_leaf, max_depth) {
            write_node(heap, max_depth, node, sum);
        }
    }
}

/// Sums for the nodes whose subtrees lie inside one bitfield word.
///
/// `first_leaf` is the heap id of the leaf stored in bit 0 of `word`.
pub(crate) fn word_sums(
    word: u64,
    first_leaf: u64,
    max_depth: u32,
) -> impl Iterator<Item = (Node, u64)> {
    (1..=PREPASS_LEVELS).flat_map(move |level| {
        let span = 1u32 << level;
        let mask = if span >= u64::BITS {
            u64::MAX
        } else {
            (1u64 << span) - 1
        };
        let depth = max_depth - level;
        let first_id = first_leaf >> level;
        (0..(u64::BITS / span)).map(move |i| {
            let sum = u64::from(((word >> (i * span)) & mask).count_ones());
            (Node::new(first_id + u64::from(i), depth), sum)
        })
    })
}

/// Refresh the sums on the path from one bitfield node to the root.
pub fn update_sum_reduction(heap: &mut BitHeap, max_depth: u32, ceil_node: Node) {
    debug_assert_eq!(ceil_node.depth, max_depth, "expected a bitfield node");
    let mut node = ceil_node;
    while !node.is_root() {
        node = node.parent();
        fold_node(heap, max_depth, node);
    }
}

/// Restore the invariant after the given bitfield nodes changed.
///
/// Walks each dirty path when that is cheaper than a full rebuild.
pub fn refresh_sums(heap: &mut BitHeap, max_depth: u32, dirty: &[Node]) {
    if dirty.is_empty() {
        return;
    }
    let incremental_cost = (dirty.len() as u64).saturating_mul(u64::from(max_depth));
    if incremental_cost < (1u64 << max_depth) {
        for &ceil_node in dirty {
            update_sum_reduction(heap, max_depth, ceil_node);
        }
        trace!(dirty = dirty.len(), "incremental sum reduction");
    } else {
        compute_sum_reduction(heap, max_depth);
    }
}
