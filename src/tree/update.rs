//! Update passes
//!
//! A pass visits every allocated leaf against a frozen snapshot of the
//! tree. The callback decides through an [`Updater`], which only records
//! split/merge requests; they are applied once the traversal is over.
//! Mutations therefore show up in the next pass, never in the current one.

use super::{Node, Tree};

/// A split or merge request recorded during a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mutation {
    /// Turn a leaf into its two children
    Split(Node),
    /// Collapse a leaf and its sibling into their parent
    Merge(Node),
}

impl Mutation {
    /// Node the request was issued for.
    pub fn node(self) -> Node {
        match self {
            Mutation::Split(node) | Mutation::Merge(node) => node,
        }
    }

    /// Bitfield node written by this mutation and the value written.
    ///
    /// Split sets the ceil bit of the right child; merge clears the ceil
    /// bit of the right sibling. `None` for a split at `max_depth` or a
    /// merge of the root.
    pub fn leaf_bit(self, max_depth: u32) -> Option<(Node, bool)> {
        match self {
            Mutation::Split(node) if !node.is_ceil(max_depth) => {
                Some((node.right_child().ceil(max_depth), true))
            }
            Mutation::Merge(node) if !node.is_root() && node.depth <= max_depth => {
                Some((node.right_sibling().ceil(max_depth), false))
            }
            _ => None,
        }
    }
}

/// Decisions collected over one traversal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdatePlan {
    /// Leaves visited
    pub visited: u64,
    /// Requests in the order they were issued
    pub mutations: Vec<Mutation>,
}

/// Summary of an executed pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassReport {
    /// Leaves visited
    pub visited: u64,
    /// Requests issued by the callback
    pub mutations: usize,
    /// Leaf count after the pass
    pub node_count: u64,
}

/// Handle given to update callbacks.
///
/// Reads go to the snapshot the pass started from. Requests are checked
/// against that snapshot:
/// - `split` is refused at `max_depth`. Splitting an already split node
///   is a no-op, and a node below a leaf is only split if its parent is
///   split in the same pass.
/// - `merge` is refused unless the node and its sibling are both leaves.
///   A merge loses to any split landing under the same parent.
///
/// Whatever mix of requests a callback makes, the tree stays valid.
#[derive(Debug)]
pub struct Updater<'a> {
    tree: &'a Tree,
    mutations: Vec<Mutation>,
}

impl<'a> Updater<'a> {
    pub(super) fn new(tree: &'a Tree) -> Self {
        Self {
            tree,
            mutations: Vec::new(),
        }
    }

    /// Snapshot the pass is running against.
    pub fn tree(&self) -> &'a Tree {
        self.tree
    }

    /// Value stored at `node` in the snapshot.
    pub fn heap_read(&self, node: Node) -> u64 {
        self.tree.heap_read(node)
    }

    /// Max depth of the tree.
    pub fn max_depth(&self) -> u32 {
        self.tree.max_depth()
    }

    /// Request a split. Returns `false` if the node is at `max_depth`.
    pub fn split(&mut self, node: Node) -> bool {
        debug_assert!(node.is_valid(), "invalid node {}", node);
        if node.is_ceil(self.tree.max_depth()) {
            return false;
        }
        self.mutations.push(Mutation::Split(node));
        true
    }

    /// Request a merge. Returns `false` unless `node` and its sibling are
    /// leaves of the snapshot.
    pub fn merge(&mut self, node: Node) -> bool {
        debug_assert!(node.is_valid(), "invalid node {}", node);
        if !self.tree.is_mergeable(node) {
            return false;
        }
        self.mutations.push(Mutation::Merge(node));
        true
    }

    /// Requests recorded so far.
    pub fn pending(&self) -> &[Mutation] {
        &self.mutations
    }

    pub(super) fn into_mutations(self) -> Vec<Mutation> {
        self.mutations
    }
}
