//! Longest-edge bisection
//!
//! Every tree node stands for a right isosceles triangle; splitting a
//! node bisects its longest edge. The triangle sharing that edge (the
//! *edge neighbour*) must be bisected too or the mesh gets a T-junction.
//!
//! Neighbour ids at the node's own depth are recovered from the path
//! bits alone, one bisection at a time. An id of 0 means the edge lies on
//! the boundary of the root face.
//!
//! Two families of functions:
//! - [`Mode::Triangle`]: the root is one triangle
//! - [`Mode::Square`]: the root is a square cut along its diagonal into
//!   the two depth-1 triangles, so depth 1 is the coarsest real face

mod attributes;

pub use attributes::{decode_node_attributes, decode_node_attributes_square};

use crate::tree::{Node, Updater};

/// Subdivision scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Mode {
    /// One root triangle
    #[default]
    Triangle,
    /// Two root triangles forming a square
    Square,
}

impl Mode {
    /// Depth of the coarsest faces.
    #[inline]
    pub fn base_depth(self) -> u32 {
        match self {
            Mode::Triangle => 0,
            Mode::Square => 1,
        }
    }

    /// Same-depth neighbours of `node` under this scheme.
    pub fn same_depth_neighbors(self, node: Node) -> SameDepthNeighbors {
        match self {
            Mode::Triangle => decode_same_depth_neighbors(node),
            Mode::Square => decode_same_depth_neighbors_square(node),
        }
    }

    /// Diamond parent of `node` under this scheme.
    pub fn diamond_parent(self, node: Node) -> DiamondParent {
        match self {
            Mode::Triangle => decode_diamond_parent(node),
            Mode::Square => decode_diamond_parent_square(node),
        }
    }
}

/// Ids of the nodes sharing an edge with a node, all at the node's depth.
///
/// `0` marks a boundary edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SameDepthNeighbors {
    /// Across the edge leaving the first vertex
    pub left: u64,
    /// Across the edge leaving the last vertex
    pub right: u64,
    /// Across the longest edge
    pub edge: u64,
    /// The node itself
    pub node: u64,
}

impl SameDepthNeighbors {
    const fn new(left: u64, right: u64, edge: u64, node: u64) -> Self {
        Self {
            left,
            right,
            edge,
            node,
        }
    }

    /// Neighbour ids after bisecting towards `bit`.
    fn split(self, bit: u64) -> Self {
        let Self {
            left,
            right,
            edge,
            node,
        } = self;
        let b2 = u64::from(right != 0);
        let b3 = u64::from(edge != 0);

        if bit == 0 {
            Self::new(node << 1 | 1, edge << 1 | b3, right << 1 | b2, node << 1)
        } else {
            Self::new(edge << 1, node << 1, left << 1, node << 1 | 1)
        }
    }
}

/// Neighbour ids of `node` in a single root triangle.
pub fn decode_same_depth_neighbors(node: Node) -> SameDepthNeighbors {
    (0..node.depth)
        .rev()
        .fold(SameDepthNeighbors::new(0, 0, 0, 1), |ids, bit| {
            ids.split(node.path_bit(bit))
        })
}

/// Neighbour ids of `node` in a square made of two root triangles.
///
/// The two depth-1 triangles share their longest edge.
pub fn decode_same_depth_neighbors_square(node: Node) -> SameDepthNeighbors {
    if node.depth == 0 {
        return SameDepthNeighbors::new(0, 0, 0, 1);
    }
    let b = node.path_bit(node.depth - 1);
    (0..node.depth - 1)
        .rev()
        .fold(SameDepthNeighbors::new(0, 0, 3 - b, 2 + b), |ids, bit| {
            ids.split(node.path_bit(bit))
        })
}

/// Node across the longest edge, if it is not a boundary edge.
pub fn edge_neighbor(node: Node, mode: Mode) -> Option<Node> {
    if node.depth < mode.base_depth() {
        return None;
    }
    match mode.same_depth_neighbors(node).edge {
        0 => None,
        id => Some(Node::new(id, node.depth)),
    }
}

/// The two nodes a merge collapses into.
///
/// Merging the children of `base` only keeps the mesh conforming if the
/// children of `top` merge as well. On a boundary `top == base`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiamondParent {
    /// Parent of the merging node
    pub base: Node,
    /// Edge neighbour of `base`
    pub top: Node,
}

/// Diamond parent of `node` in a single root triangle.
pub fn decode_diamond_parent(node: Node) -> DiamondParent {
    let base = node.parent();
    let edge = decode_same_depth_neighbors(base).edge;
    DiamondParent {
        base,
        top: Node::new(if edge > 0 { edge } else { base.id }, base.depth),
    }
}

/// Diamond parent of `node` in a square of two root triangles.
///
/// Depth-1 triangles are their own base.
pub fn decode_diamond_parent_square(node: Node) -> DiamondParent {
    let base = if node.depth > 1 { node.parent() } else { node };
    let edge = decode_same_depth_neighbors_square(base).edge;
    DiamondParent {
        base,
        top: Node::new(if edge > 0 { edge } else { base.id }, base.depth),
    }
}

/// Split `node` and every node needed to keep the mesh conforming.
///
/// Walks edge neighbour, parent, edge neighbour, ... towards the coarse
/// levels; depth drops by one per step so the walk is bounded by the
/// node's depth. Nothing happens at max depth.
pub fn split_conforming(updater: &mut Updater<'_>, node: Node, mode: Mode) {
    if !updater.split(node) {
        return;
    }

    let base_depth = mode.base_depth();
    let mut next = edge_neighbor(node, mode);
    while let Some(neighbor) = next {
        updater.split(neighbor);
        if neighbor.depth <= base_depth {
            break;
        }
        let parent = neighbor.parent();
        if parent.is_root() {
            break;
        }
        updater.split(parent);
        next = edge_neighbor(parent, mode);
    }
}

/// Merge `node` with its sibling if the whole diamond can collapse.
///
/// Both diamond nodes must hold at most two leaves in the snapshot, i.e.
/// their children are leaves. Every leaf of the diamond makes the same
/// decision, so both halves merge in the same pass.
pub fn merge_diamond(updater: &mut Updater<'_>, node: Node, diamond: DiamondParent, mode: Mode) {
    if node.depth <= mode.base_depth() {
        return;
    }
    if updater.heap_read(diamond.base) <= 2 && updater.heap_read(diamond.top) <= 2 {
        updater.merge(node);
    }
}
