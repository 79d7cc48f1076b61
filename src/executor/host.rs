//! Host executor
//!
//! The host heap is the source of truth. Split and merge requests are
//! held until the next recomputation, which checks them against the tree,
//! flips their bitfield bits and refreshes the sums along the dirty
//! paths, or rebuilds them when that is cheaper.

use std::mem;

use tracing::debug;

use super::{Backend, TreeExecutor};
use crate::tree::{Mutation, Node, Tree, TreeError};

/// Executor mutating a host-resident tree in place.
#[derive(Debug, Clone)]
pub struct HostExecutor {
    tree: Tree,
    pending: Vec<Mutation>,
}

impl HostExecutor {
    /// Wrap `tree`.
    pub fn new(tree: Tree) -> Self {
        Self {
            tree,
            pending: Vec::new(),
        }
    }

    /// Requests waiting for the next recomputation.
    pub fn pending(&self) -> &[Mutation] {
        &self.pending
    }

    /// Unwrap the tree, applying pending requests first.
    pub fn into_tree(mut self) -> Tree {
        self.recompute_sums();
        self.tree
    }
}

impl TreeExecutor for HostExecutor {
    fn backend(&self) -> Backend {
        Backend::Host
    }

    fn tree(&self) -> &Tree {
        &self.tree
    }

    fn split(&mut self, node: Node) {
        self.pending.push(Mutation::Split(node));
    }

    fn merge(&mut self, node: Node) {
        self.pending.push(Mutation::Merge(node));
    }

    fn recompute_sums(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let pending = mem::take(&mut self.pending);
        let changed = self.tree.apply(&pending);
        debug!(
            requests = pending.len(),
            changed,
            node_count = self.tree.node_count(),
            "host sums refreshed"
        );
    }

    fn reset_to_depth(&mut self, depth: u32) -> Result<(), TreeError> {
        self.tree.reset_to_depth(depth)?;
        self.pending.clear();
        Ok(())
    }
}
