//! Node addressing
//!
//! Node = implicit heap id + depth.
//! The root is `1@0`; children of `id` are `2*id` and `2*id + 1`.
//! Below the leading one, the bits of `id` spell the root-to-node path
//! (most significant first): bit `depth - 1` is the first turn.
//!
//! All functions here are pure bit arithmetic; no heap access.

use std::fmt;

/// Position of a node in the implicit binary tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Node {
    /// Heap id (`2^depth <= id < 2^(depth+1)`)
    pub id: u64,

    /// Distance from the root
    pub depth: u32,
}

impl Node {
    /// Create node from id and depth
    #[inline]
    pub const fn new(id: u64, depth: u32) -> Self {
        Self { id, depth }
    }

    /// The root node `1@0`
    #[inline]
    pub const fn root() -> Self {
        Self { id: 1, depth: 0 }
    }

    /// Create node from a heap id, deriving its depth
    ///
    /// # Panics
    /// Panics if `id` is zero.
    #[inline]
    pub fn from_id(id: u64) -> Self {
        Self {
            id,
            depth: id.ilog2(),
        }
    }

    /// Check that id and depth agree
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.id != 0 && self.id.ilog2() == self.depth
    }

    /// Check if root
    #[inline]
    pub fn is_root(&self) -> bool {
        self.id == 1
    }

    /// Check if this node is the left child of its parent
    #[inline]
    pub fn is_left_child(&self) -> bool {
        self.id & 1 == 0
    }

    /// Parent node
    #[inline]
    pub fn parent(&self) -> Node {
        debug_assert!(!self.is_root(), "Root has no parent");
        Node::new(self.id >> 1, self.depth - 1)
    }

    /// Left child
    #[inline]
    pub fn left_child(&self) -> Node {
        Node::new(self.id << 1, self.depth + 1)
    }

    /// Right child
    #[inline]
    pub fn right_child(&self) -> Node {
        Node::new(self.id << 1 | 1, self.depth + 1)
    }

    /// Left node of the sibling pair (may be `self`)
    #[inline]
    pub fn left_sibling(&self) -> Node {
        Node::new(self.id & !1, self.depth)
    }

    /// Right node of the sibling pair (may be `self`)
    #[inline]
    pub fn right_sibling(&self) -> Node {
        Node::new(self.id | 1, self.depth)
    }

    /// The other node of the sibling pair
    #[inline]
    pub fn sibling(&self) -> Node {
        Node::new(self.id ^ 1, self.depth)
    }

    /// Path bit at `bit` (bit `depth - 1` is taken at the root)
    #[inline]
    pub fn path_bit(&self, bit: u32) -> u64 {
        (self.id >> bit) & 1
    }

    /// Leftmost descendant at `max_depth`
    ///
    /// A leaf is stored as the bitfield bit of its ceil node.
    #[inline]
    pub fn ceil(&self, max_depth: u32) -> Node {
        debug_assert!(self.depth <= max_depth);
        Node::new(self.id << (max_depth - self.depth), max_depth)
    }

    /// Check if the node sits at `max_depth`
    #[inline]
    pub fn is_ceil(&self, max_depth: u32) -> bool {
        self.depth >= max_depth
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.id, self.depth)
    }
}
