//! Depth-first leaf traversal
//!
//! Walks the allocated leaves in handle order using the subtree sums:
//! a node with sum 1 is a leaf, a node with a larger sum is split.
//! Stack depth: O(D). Total work: O(node count).

use super::{Node, Tree};

/// Iterator over the allocated leaves of a [`Tree`].
#[derive(Debug)]
pub struct Leaves<'a> {
    tree: &'a Tree,

    /// Nodes still to visit; the top is the next in handle order
    stack: Vec<Node>,

    /// Leaves not yet yielded
    remaining: u64,
}

impl<'a> Leaves<'a> {
    pub(super) fn new(tree: &'a Tree) -> Self {
        let mut stack = Vec::with_capacity(tree.max_depth() as usize + 1);
        stack.push(Node::root());
        Self {
            tree,
            stack,
            remaining: tree.node_count(),
        }
    }
}

impl Iterator for Leaves<'_> {
    type Item = Node;

    fn next(&mut self) -> Option<Node> {
        while let Some(node) = self.stack.pop() {
            match self.tree.heap_read(node) {
                0 => continue,
                1 => {
                    self.remaining -= 1;
                    return Some(node);
                }
                _ => {
                    self.stack.push(node.right_child());
                    self.stack.push(node.left_child());
                }
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.remaining as usize;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Leaves<'_> {}
