//! Face attribute decoding
//!
//! A node's face is its root face pushed through one 3x3 splitting
//! matrix per path bit. Each attribute is a [`Vec3`] holding one
//! component per vertex (e.g. all three x coordinates), so the same
//! matrix interpolates positions, texture coordinates or anything affine.
//!
//! Vertex order: the longest edge runs from vertex 0 to vertex 2,
//! vertex 1 is the apex.

use glam::{Mat3, Vec3};

use crate::tree::Node;

#[inline]
fn from_rows(r0: [f32; 3], r1: [f32; 3], r2: [f32; 3]) -> Mat3 {
    Mat3::from_cols_array_2d(&[r0, r1, r2]).transpose()
}

/// Bisection of the longest edge, keeping the half selected by `bit`.
fn splitting_matrix(bit: u64) -> Mat3 {
    let b = bit as f32;
    let c = 1.0 - b;
    from_rows([c, b, 0.0], [0.5, 0.0, 0.5], [0.0, c, b])
}

/// Half of the root square selected by `bit`.
///
/// Bit 0 keeps the root triangle, bit 1 the opposite triangle across
/// its longest edge (apex mirrored through the edge midpoint).
fn square_matrix(bit: u64) -> Mat3 {
    let b = bit as f32;
    let c = 1.0 - b;
    from_rows([c, 0.0, b], [b, c - b, b], [b, 0.0, c])
}

fn transformation_matrix(node: Node) -> Mat3 {
    (0..node.depth).rev().fold(Mat3::IDENTITY, |matrix, bit| {
        splitting_matrix(node.path_bit(bit)) * matrix
    })
}

fn transformation_matrix_square(node: Node) -> Mat3 {
    if node.depth == 0 {
        return Mat3::IDENTITY;
    }
    let first = square_matrix(node.path_bit(node.depth - 1));
    (0..node.depth - 1).rev().fold(first, |matrix, bit| {
        splitting_matrix(node.path_bit(bit)) * matrix
    })
}

/// Map root-face attributes to the face of `node`, in place.
pub fn decode_node_attributes(node: Node, attributes: &mut [Vec3]) {
    let matrix = transformation_matrix(node);
    for attribute in attributes.iter_mut() {
        *attribute = matrix * *attribute;
    }
}

/// Map root-triangle attributes of a square to the face of `node`.
///
/// The root square itself (depth 0) has no triangle and is returned
/// unchanged.
pub fn decode_node_attributes_square(node: Node, attributes: &mut [Vec3]) {
    let matrix = transformation_matrix_square(node);
    for attribute in attributes.iter_mut() {
        *attribute = matrix * *attribute;
    }
}
