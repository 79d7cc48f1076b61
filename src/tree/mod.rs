//! Concurrent binary tree
//!
//! One bit-packed heap holds both the leaf bitfield (depth `max_depth`)
//! and, above it, the number of allocated leaves below every node.
//! A leaf at any depth is stored as the bitfield bit of its leftmost
//! descendant, so splitting and merging flip exactly one bit and the
//! sums above it.
//!
//! Leaves are addressed two ways:
//! - by [`Node`] (heap id + depth), stable while the leaf exists
//! - by handle, the leaf's rank among all allocated leaves (`0..node_count`)
//!
//! [`Tree::decode_node`] and [`Tree::encode_node`] convert between the two
//! in O(depth) by walking the sums.

mod node;
mod traversal;
mod update;

pub use node::Node;
pub use traversal::Leaves;
pub use update::{Mutation, PassReport, UpdatePlan, Updater};

use std::collections::HashSet;

use thiserror::Error;
use tracing::debug;

use crate::config::TreeConfig;
use crate::heap::{bitfield_bit_offset, heap_word_count, node_bit_offset, BitHeap};
use crate::reduction::{compute_sum_reduction, read_node, refresh_sums, update_sum_reduction};

/// Deepest tree the heap layout can address.
pub const MAX_SUPPORTED_DEPTH: u32 = 58;

/// Errors reported by the tree façade.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TreeError {
    /// Max depth outside `1..=MAX_SUPPORTED_DEPTH`.
    #[error("max depth {max_depth} out of range (supported 1..={limit})")]
    MaxDepthOutOfRange {
        /// Requested max depth.
        max_depth: u32,
        /// Deepest supported tree.
        limit: u32,
    },

    /// Initial subdivision deeper than the tree.
    #[error("init depth {init_depth} exceeds max depth {max_depth}")]
    InitDepthExceedsMaxDepth {
        /// Requested init depth.
        init_depth: u32,
        /// Max depth of the tree.
        max_depth: u32,
    },

    /// Reset depth deeper than the tree.
    #[error("depth {depth} out of range (max depth {max_depth})")]
    DepthOutOfRange {
        /// Requested depth.
        depth: u32,
        /// Max depth of the tree.
        max_depth: u32,
    },

    /// Heap storage could not be allocated.
    #[error("failed to allocate {bytes} bytes of heap storage")]
    HeapAllocation {
        /// Requested allocation size.
        bytes: usize,
    },

    /// Node id and depth disagree or the node lies below max depth.
    #[error("node {0} is not addressable in this tree")]
    NodeOutOfRange(Node),

    /// Split requested at max depth.
    #[error("node {0} is at max depth and cannot be split")]
    SplitAtMaxDepth(Node),

    /// Node is not a current leaf.
    #[error("node {0} is not a leaf")]
    NotALeaf(Node),

    /// The root has no sibling to merge with.
    #[error("the root cannot be merged")]
    MergeRoot,

    /// Node or its sibling is not a leaf.
    #[error("node {0} and its sibling are not both leaves")]
    NotMergeable(Node),

    /// Leaf handle past the last allocated leaf.
    #[error("handle {handle} out of range (node count {node_count})")]
    HandleOutOfRange {
        /// Requested handle.
        handle: u64,
        /// Allocated leaves.
        node_count: u64,
    },

    /// Raw heap words do not describe a valid tree.
    #[error("corrupt heap: {0}")]
    CorruptHeap(String),
}

/// Concurrent binary tree over a packed bit heap.
///
/// `Clone` is a deep copy of the heap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tree {
    heap: BitHeap,
    max_depth: u32,
}

impl Tree {
    /// Create a tree of depth `max_depth` subdivided uniformly to `init_depth`.
    pub fn new(max_depth: u32, init_depth: u32) -> Result<Self, TreeError> {
        check_max_depth(max_depth)?;
        if init_depth > max_depth {
            return Err(TreeError::InitDepthExceedsMaxDepth {
                init_depth,
                max_depth,
            });
        }

        let mut tree = Self {
            heap: BitHeap::zeroed(heap_word_count(max_depth))?,
            max_depth,
        };
        tree.fill_uniform(init_depth);
        debug!(
            max_depth,
            init_depth,
            bytes = tree.heap_bytes().len(),
            "created tree"
        );
        Ok(tree)
    }

    /// Create a tree from a validated configuration.
    pub fn from_config(config: &TreeConfig) -> Result<Self, TreeError> {
        Self::new(config.max_depth, config.init_depth)
    }

    /// Rebuild a tree from raw heap words, e.g. a device readback.
    ///
    /// The max depth is recovered from the marker in the first word.
    pub fn from_heap_words(words: Vec<u64>) -> Result<Self, TreeError> {
        let first = *words
            .first()
            .ok_or_else(|| TreeError::CorruptHeap("empty heap".to_string()))?;
        if first == 0 {
            return Err(TreeError::CorruptHeap("missing depth marker".to_string()));
        }
        let max_depth = first.trailing_zeros();
        check_max_depth(max_depth)
            .map_err(|_| TreeError::CorruptHeap(format!("depth marker {}", max_depth)))?;

        let expected = heap_word_count(max_depth);
        if words.len() != expected {
            return Err(TreeError::CorruptHeap(format!(
                "{} words for max depth {} (expected {})",
                words.len(),
                max_depth,
                expected
            )));
        }

        let tree = Self {
            heap: BitHeap::from_words(words),
            max_depth,
        };
        tree.check_invariants()?;
        Ok(tree)
    }

    /// Collapse to the root leaf.
    pub fn reset_to_root(&mut self) {
        self.fill_uniform(0);
    }

    /// Allocate every leaf at max depth.
    pub fn reset_to_ceil(&mut self) {
        self.fill_uniform(self.max_depth);
    }

    /// Subdivide uniformly to `depth`.
    pub fn reset_to_depth(&mut self, depth: u32) -> Result<(), TreeError> {
        if depth > self.max_depth {
            return Err(TreeError::DepthOutOfRange {
                depth,
                max_depth: self.max_depth,
            });
        }
        self.fill_uniform(depth);
        Ok(())
    }

    fn fill_uniform(&mut self, depth: u32) {
        let max_depth = self.max_depth;
        let words = self.heap.words_mut();
        words.fill(0);
        words[0] = 1u64 << max_depth;

        let stride = 1u64 << (max_depth - depth);
        let first = bitfield_bit_offset(max_depth);
        for leaf in 0..(1u64 << depth) {
            self.heap.set_bit(first + leaf * stride, true);
        }
        compute_sum_reduction(&mut self.heap, max_depth);
        debug!(depth, node_count = self.node_count(), "uniform reset");
    }

    /// Split a leaf into its two children.
    pub fn split(&mut self, node: Node) -> Result<(), TreeError> {
        self.check_node(node)?;
        if node.is_ceil(self.max_depth) {
            return Err(TreeError::SplitAtMaxDepth(node));
        }
        if !self.is_leaf(node) {
            return Err(TreeError::NotALeaf(node));
        }
        let ceil = node.right_child().ceil(self.max_depth);
        self.set_leaf_bit(ceil, true);
        update_sum_reduction(&mut self.heap, self.max_depth, ceil);
        Ok(())
    }

    /// Collapse a leaf and its sibling into their parent.
    pub fn merge(&mut self, node: Node) -> Result<(), TreeError> {
        self.check_node(node)?;
        if node.is_root() {
            return Err(TreeError::MergeRoot);
        }
        if !self.is_mergeable(node) {
            return Err(TreeError::NotMergeable(node));
        }
        let ceil = node.right_sibling().ceil(self.max_depth);
        self.set_leaf_bit(ceil, false);
        update_sum_reduction(&mut self.heap, self.max_depth, ceil);
        Ok(())
    }

    /// Run one update pass.
    ///
    /// `callback` sees every allocated leaf in handle order against the
    /// tree as it was when the pass began. Requests go through the
    /// [`Updater`] and are applied after the traversal, followed by one
    /// sum refresh.
    pub fn update<F>(&mut self, callback: F) -> PassReport
    where
        F: FnMut(&mut Updater<'_>, Node),
    {
        let plan = self.plan_update(callback);
        self.write_mutations(&plan.mutations);
        let report = PassReport {
            visited: plan.visited,
            mutations: plan.mutations.len(),
            node_count: self.node_count(),
        };
        debug!(
            visited = report.visited,
            mutations = report.mutations,
            node_count = report.node_count,
            "update pass"
        );
        report
    }

    /// Traverse the leaves and collect the callback's requests without
    /// applying them.
    ///
    /// The plan only holds requests that survive [`Tree::resolve`].
    pub fn plan_update<F>(&self, mut callback: F) -> UpdatePlan
    where
        F: FnMut(&mut Updater<'_>, Node),
    {
        let mut updater = Updater::new(self);
        let mut visited = 0;
        for node in self.leaves() {
            callback(&mut updater, node);
            visited += 1;
        }
        let requested = updater.into_mutations();
        let mutations = self.resolve(&requested);
        if mutations.len() != requested.len() {
            debug!(
                requested = requested.len(),
                kept = mutations.len(),
                "dropped conflicting requests"
            );
        }
        UpdatePlan { visited, mutations }
    }

    /// Keep the requests that can be applied together to this tree.
    ///
    /// A split is kept if the node exists, or if its parent's split is
    /// kept too. A merge is kept if the node and its sibling are leaves
    /// and no kept split lands under their parent. Order is preserved.
    pub fn resolve(&self, mutations: &[Mutation]) -> Vec<Mutation> {
        let mut requested: Vec<Node> = mutations
            .iter()
            .filter_map(|mutation| match *mutation {
                Mutation::Split(node) if self.check_node(node).is_ok() => Some(node),
                _ => None,
            })
            .filter(|node| !node.is_ceil(self.max_depth))
            .collect();
        requested.sort_unstable_by_key(|node| node.depth);

        let mut splits = HashSet::new();
        for node in requested {
            if self.exists(node) || splits.contains(&node.parent()) {
                splits.insert(node);
            }
        }

        // every node with a kept split at or below it
        let mut split_below = HashSet::new();
        if mutations.iter().any(|m| matches!(m, Mutation::Merge(_))) {
            for &node in &splits {
                let mut node = node;
                while split_below.insert(node) && !node.is_root() {
                    node = node.parent();
                }
            }
        }

        mutations
            .iter()
            .copied()
            .filter(|mutation| match *mutation {
                Mutation::Split(node) => splits.contains(&node),
                Mutation::Merge(node) => {
                    self.is_mergeable(node) && !split_below.contains(&node.parent())
                }
            })
            .collect()
    }

    /// Apply a batch of mutations, then refresh the sums.
    ///
    /// The batch is filtered through [`Tree::resolve`] first, so requests
    /// that would break the tree are dropped. Returns the number of
    /// bitfield bits that changed.
    pub fn apply(&mut self, mutations: &[Mutation]) -> usize {
        let mutations = self.resolve(mutations);
        self.write_mutations(&mutations)
    }

    fn write_mutations(&mut self, mutations: &[Mutation]) -> usize {
        let max_depth = self.max_depth;
        let mut dirty = Vec::new();
        for (ceil, value) in mutations.iter().filter_map(|m| m.leaf_bit(max_depth)) {
            if self.set_leaf_bit(ceil, value) {
                dirty.push(ceil);
            }
        }
        refresh_sums(&mut self.heap, max_depth, &dirty);
        dirty.len()
    }

    /// Number of allocated leaves.
    #[inline]
    pub fn node_count(&self) -> u64 {
        self.heap_read(Node::root())
    }

    /// Max depth of the tree.
    #[inline]
    pub fn max_depth(&self) -> u32 {
        self.max_depth
    }

    /// Sum (or bitfield bit at max depth) stored at `node`.
    ///
    /// # Panics
    /// Panics if the node lies below max depth.
    #[inline]
    pub fn heap_read(&self, node: Node) -> u64 {
        read_node(&self.heap, self.max_depth, node)
    }

    /// Check if `node` is a current leaf.
    pub fn is_leaf(&self, node: Node) -> bool {
        if !node.is_valid() || node.depth > self.max_depth {
            return false;
        }
        self.heap_read(node) == 1 && (node.is_root() || self.heap_read(node.parent()) >= 2)
    }

    /// Check if `node` and its sibling are both leaves.
    pub fn is_mergeable(&self, node: Node) -> bool {
        !node.is_root() && self.is_leaf(node) && self.is_leaf(node.sibling())
    }

    /// Check if `node` is a leaf or an internal node of the tree.
    fn exists(&self, node: Node) -> bool {
        node.is_root() || self.heap_read(node.parent()) >= 2
    }

    /// Allocated leaves in handle order.
    pub fn leaves(&self) -> Leaves<'_> {
        Leaves::new(self)
    }

    /// Leaf with rank `handle`.
    pub fn decode_node(&self, handle: u64) -> Result<Node, TreeError> {
        let node_count = self.node_count();
        if handle >= node_count {
            return Err(TreeError::HandleOutOfRange { handle, node_count });
        }

        let mut node = Node::root();
        let mut handle = handle;
        while self.heap_read(node) > 1 {
            let left = node.left_child();
            let left_sum = self.heap_read(left);
            if handle < left_sum {
                node = left;
            } else {
                handle -= left_sum;
                node = node.right_child();
            }
        }
        Ok(node)
    }

    /// Rank of `node` among the allocated leaves.
    ///
    /// For a node that is not a leaf this is the handle of the first leaf
    /// at or after its position.
    pub fn encode_node(&self, node: Node) -> Result<u64, TreeError> {
        self.check_node(node)?;
        let mut handle = 0;
        let mut node = node;
        while !node.is_root() {
            if !node.is_left_child() {
                handle += self.heap_read(node.sibling());
            }
            node = node.parent();
        }
        Ok(handle)
    }

    /// Raw heap as bytes, ready for upload.
    #[inline]
    pub fn heap_bytes(&self) -> &[u8] {
        self.heap.as_bytes()
    }

    /// Raw heap words.
    #[inline]
    pub fn heap_words(&self) -> &[u64] {
        self.heap.words()
    }

    /// Verify the depth marker, every internal sum, that split nodes have
    /// no empty half, and every leaf's bit.
    pub fn check_invariants(&self) -> Result<(), TreeError> {
        let max_depth = self.max_depth;
        let marker = self.heap.words()[0] & ((1u64 << (max_depth + 3)) - 1);
        if marker != 1u64 << max_depth {
            return Err(TreeError::CorruptHeap(format!(
                "depth marker {:#x} for max depth {}",
                marker, max_depth
            )));
        }

        for depth in 0..max_depth {
            for id in (1u64 << depth)..(2u64 << depth) {
                let node = Node::new(id, depth);
                let sum = self.heap_read(node);
                let left = self.heap_read(node.left_child());
                let right = self.heap_read(node.right_child());
                if sum != left + right {
                    return Err(TreeError::CorruptHeap(format!(
                        "sum {} at {} but children hold {}",
                        sum,
                        node,
                        left + right
                    )));
                }
                if sum >= 2 && (left == 0 || right == 0) {
                    return Err(TreeError::CorruptHeap(format!(
                        "split node {} has an empty half",
                        node
                    )));
                }
            }
        }

        for leaf in self.leaves() {
            let ceil = leaf.ceil(max_depth);
            if !self.heap.bit(node_bit_offset(ceil, max_depth)) {
                return Err(TreeError::CorruptHeap(format!(
                    "leaf {} without bitfield bit",
                    leaf
                )));
            }
        }
        Ok(())
    }

    /// Write one bitfield bit without touching the sums.
    ///
    /// Returns whether the bit changed.
    pub(crate) fn set_leaf_bit(&mut self, ceil: Node, value: bool) -> bool {
        debug_assert!(ceil.is_ceil(self.max_depth));
        self.heap.set_bit(node_bit_offset(ceil, self.max_depth), value)
    }

    pub(crate) fn heap_mut(&mut self) -> &mut BitHeap {
        &mut self.heap
    }

    fn check_node(&self, node: Node) -> Result<(), TreeError> {
        if node.is_valid() && node.depth <= self.max_depth {
            Ok(())
        } else {
            Err(TreeError::NodeOutOfRange(node))
        }
    }
}

fn check_max_depth(max_depth: u32) -> Result<(), TreeError> {
    if (1..=MAX_SUPPORTED_DEPTH).contains(&max_depth) {
        Ok(())
    } else {
        Err(TreeError::MaxDepthOutOfRange {
            max_depth,
            limit: MAX_SUPPORTED_DEPTH,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_construction_errors() {
        assert_eq!(
            Tree::new(4, 5),
            Err(TreeError::InitDepthExceedsMaxDepth {
                init_depth: 5,
                max_depth: 4
            })
        );
        assert!(matches!(
            Tree::new(0, 0),
            Err(TreeError::MaxDepthOutOfRange { .. })
        ));
        assert!(matches!(
            Tree::new(MAX_SUPPORTED_DEPTH + 1, 0),
            Err(TreeError::MaxDepthOutOfRange { .. })
        ));
    }

    #[test]
    fn test_uniform_counts() {
        let mut tree = Tree::new(6, 2).unwrap();
        assert_eq!(tree.node_count(), 4);
        tree.reset_to_ceil();
        assert_eq!(tree.node_count(), 64);
        tree.reset_to_root();
        assert_eq!(tree.node_count(), 1);
        assert!(tree.reset_to_depth(7).is_err());
        tree.check_invariants().unwrap();
    }

    #[test]
    fn test_split_merge_checks() {
        let mut tree = Tree::new(3, 1).unwrap();
        assert_eq!(tree.merge(Node::root()), Err(TreeError::MergeRoot));
        assert_eq!(
            tree.split(Node::root()),
            Err(TreeError::NotALeaf(Node::root()))
        );
        assert_eq!(
            tree.split(Node::new(3, 2)),
            Err(TreeError::NodeOutOfRange(Node::new(3, 2)))
        );

        tree.split(Node::new(3, 1)).unwrap();
        assert_eq!(
            tree.merge(Node::new(2, 1)),
            Err(TreeError::NotMergeable(Node::new(2, 1)))
        );
        tree.split(Node::new(7, 2)).unwrap();
        assert_eq!(
            tree.split(Node::new(15, 3)),
            Err(TreeError::SplitAtMaxDepth(Node::new(15, 3)))
        );
        assert_eq!(tree.node_count(), 4);
    }

    #[test]
    fn test_split_then_merge_restores_heap() {
        let mut tree = Tree::new(7, 3).unwrap();
        let before = tree.clone();
        let node = tree.decode_node(5).unwrap();
        tree.split(node).unwrap();
        assert_eq!(tree.node_count(), 9);
        tree.merge(node.right_child()).unwrap();
        assert_eq!(tree, before);
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        let mut tree = Tree::new(5, 2).unwrap();
        tree.split(Node::new(5, 2)).unwrap();
        tree.split(Node::new(11, 3)).unwrap();
        for handle in 0..tree.node_count() {
            let node = tree.decode_node(handle).unwrap();
            assert!(tree.is_leaf(node));
            assert_eq!(tree.encode_node(node).unwrap(), handle);
        }
        assert_eq!(
            tree.decode_node(tree.node_count()),
            Err(TreeError::HandleOutOfRange {
                handle: 6,
                node_count: 6
            })
        );
    }

    #[test]
    fn test_clone_is_independent() {
        let tree = Tree::new(4, 1).unwrap();
        let mut copy = tree.clone();
        copy.split(Node::new(2, 1)).unwrap();
        assert_eq!(tree.node_count(), 2);
        assert_eq!(copy.node_count(), 3);
    }

    #[test]
    fn test_from_heap_words() {
        let mut tree = Tree::new(8, 3).unwrap();
        tree.split(Node::new(12, 3)).unwrap();
        let restored = Tree::from_heap_words(tree.heap_words().to_vec()).unwrap();
        assert_eq!(restored, tree);

        let mut words = tree.heap_words().to_vec();
        words.pop();
        assert!(matches!(
            Tree::from_heap_words(words),
            Err(TreeError::CorruptHeap(_))
        ));

        let mut words = tree.heap_words().to_vec();
        let last = words.len() - 1;
        words[last] ^= 1 << 63;
        assert!(matches!(
            Tree::from_heap_words(words),
            Err(TreeError::CorruptHeap(_))
        ));
    }

    #[test]
    fn test_empty_half_is_corrupt() {
        let mut tree = Tree::new(3, 0).unwrap();
        let stray = Node::new(11, 3);
        tree.set_leaf_bit(stray, true);
        refresh_sums(&mut tree.heap, 3, &[stray]);
        assert_eq!(tree.node_count(), 2);
        assert!(matches!(
            tree.check_invariants(),
            Err(TreeError::CorruptHeap(_))
        ));
        assert!(Tree::from_heap_words(tree.heap_words().to_vec()).is_err());
    }

    #[test]
    fn test_resolve_drops_conflicts() {
        let tree = Tree::new(4, 1).unwrap();
        let requested = [
            Mutation::Split(Node::new(2, 1)),
            Mutation::Merge(Node::new(3, 1)),
            Mutation::Split(Node::new(13, 3)),
            Mutation::Split(Node::new(5, 2)),
            Mutation::Split(Node::new(16, 4)),
        ];
        assert_eq!(
            tree.resolve(&requested),
            [
                Mutation::Split(Node::new(2, 1)),
                Mutation::Split(Node::new(5, 2)),
            ]
        );
    }

    #[test]
    fn test_apply_reports_changed_bits() {
        let mut tree = Tree::new(4, 0).unwrap();
        let changed = tree.apply(&[
            Mutation::Split(Node::root()),
            Mutation::Split(Node::root()),
            Mutation::Split(Node::new(2, 1)),
        ]);
        assert_eq!(changed, 2);
        assert_eq!(tree.node_count(), 3);
        tree.check_invariants().unwrap();
    }
}
