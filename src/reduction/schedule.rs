//! Partitioned sum reduction
//!
//! Cuts the full rebuild into passes of bounded size, the way a compute
//! backend splits it into dispatches. Passes on the same level only read
//! the level below, so they are independent; levels run in order with an
//! implicit barrier between them.

use rayon::prelude::*;
use tracing::trace;

use super::{read_node, word_sums, write_node, PREPASS_LEVELS};
use crate::heap::{bitfield_bit_offset, BitHeap, WORD_BITS};
use crate::tree::Node;

/// What a pass computes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassKind {
    /// Popcount bitfield words into the levels right above them
    Prepass,
    /// Add pairs of children into one level
    Fold,
}

/// One dispatch of the reduction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReductionPass {
    /// Pass type
    pub kind: PassKind,
    /// Depth of the nodes read (prepass) or written (fold)
    pub depth: u32,
    /// First node id covered
    pub first_id: u64,
    /// Number of nodes covered
    pub count: u64,
}

/// Ordered list of reduction passes for one tree depth.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReductionSchedule {
    max_depth: u32,
    pass_size: u64,
    passes: Vec<ReductionPass>,
}

impl ReductionSchedule {
    /// Build a schedule covering at most `pass_size` nodes per pass.
    ///
    /// Prepass passes are rounded up to whole bitfield words.
    pub fn new(max_depth: u32, pass_size: u64) -> Self {
        assert!(pass_size > 0, "pass size must be greater than zero");
        let mut passes = Vec::new();
        let mut depth = max_depth;

        if max_depth >= PREPASS_LEVELS {
            let chunk = pass_size.div_ceil(WORD_BITS) * WORD_BITS;
            push_chunks(&mut passes, PassKind::Prepass, max_depth, chunk);
            depth = max_depth - PREPASS_LEVELS;
        }

        while depth > 0 {
            depth -= 1;
            push_chunks(&mut passes, PassKind::Fold, depth, pass_size);
        }

        Self {
            max_depth,
            pass_size,
            passes,
        }
    }

    /// Tree depth this schedule was built for.
    pub fn max_depth(&self) -> u32 {
        self.max_depth
    }

    /// Maximum nodes per pass.
    pub fn pass_size(&self) -> u64 {
        self.pass_size
    }

    /// Passes in execution order.
    pub fn passes(&self) -> &[ReductionPass] {
        &self.passes
    }

    /// Number of passes (dispatches).
    pub fn len(&self) -> usize {
        self.passes.len()
    }

    /// True when the tree needs no reduction passes.
    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }
}

fn push_chunks(passes: &mut Vec<ReductionPass>, kind: PassKind, depth: u32, chunk: u64) {
    let level_start = 1u64 << depth;
    let level_end = 2u64 << depth;
    let mut first_id = level_start;
    while first_id < level_end {
        let count = chunk.min(level_end - first_id);
        passes.push(ReductionPass {
            kind,
            depth,
            first_id,
            count,
        });
        first_id += count;
    }
}

/// Run every pass of `schedule` against `heap`.
///
/// Each pass evaluates its node sums in parallel, then writes them back.
#[tracing::instrument(level = "debug", skip_all, fields(passes = schedule.len()))]
pub fn execute_schedule(heap: &mut BitHeap, schedule: &ReductionSchedule) {
    let max_depth = schedule.max_depth;
    for pass in &schedule.passes {
        match pass.kind {
            PassKind::Prepass => run_prepass(heap, max_depth, pass),
            PassKind::Fold => run_fold(heap, max_depth, pass),
        }
        trace!(
            kind = ?pass.kind,
            depth = pass.depth,
            first_id = pass.first_id,
            count = pass.count,
            "reduction pass"
        );
    }
}

fn run_prepass(heap: &mut BitHeap, max_depth: u32, pass: &ReductionPass) {
    let bitfield_word = bitfield_bit_offset(max_depth) / WORD_BITS;
    let leaf_base = 1u64 << max_depth;
    let first_word = pass.first_id - leaf_base;
    let word_count = (pass.count / WORD_BITS) as usize;

    let words = heap.words();
    let sums: Vec<Vec<(Node, u64)>> = (0..word_count)
        .into_par_iter()
        .map(|i| {
            let leaf_offset = first_word + (i as u64) * WORD_BITS;
            let word = words[(bitfield_word + leaf_offset / WORD_BITS) as usize];
            word_sums(word, leaf_base + leaf_offset, max_depth).collect()
        })
        .collect();

    for (node, sum) in sums.into_iter().flatten() {
        write_node(heap, max_depth, node, sum);
    }
}

fn run_fold(heap: &mut BitHeap, max_depth: u32, pass: &ReductionPass) {
    let depth = pass.depth;
    let shared: &BitHeap = heap;
    let sums: Vec<u64> = (0..pass.count as usize)
        .into_par_iter()
        .map(|i| {
            let node = Node::new(pass.first_id + i as u64, depth);
            read_node(shared, max_depth, node.left_child())
                + read_node(shared, max_depth, node.right_child())
        })
        .collect();

    for (i, sum) in sums.into_iter().enumerate() {
        write_node(heap, max_depth, Node::new(pass.first_id + i as u64, depth), sum);
    }
}
