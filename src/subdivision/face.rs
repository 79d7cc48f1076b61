//! Triangle faces and the point-in-face predicate

use glam::{Vec2, Vec3};

use crate::leb::{decode_node_attributes, decode_node_attributes_square, Mode};
use crate::tree::Node;

/// Vertex coordinates of the root triangle: `(0, 1)`, `(0, 0)`, `(1, 0)`.
pub const ROOT_X: [f32; 3] = [0.0, 0.0, 1.0];
/// See [`ROOT_X`].
pub const ROOT_Y: [f32; 3] = [1.0, 0.0, 0.0];

/// A triangle in the unit square.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Face {
    /// Vertices; the longest edge runs from `vertices[0]` to `vertices[2]`
    pub vertices: [Vec2; 3],
}

impl Face {
    /// Build a face from its three vertices.
    pub fn new(v0: Vec2, v1: Vec2, v2: Vec2) -> Self {
        Self {
            vertices: [v0, v1, v2],
        }
    }

    /// Face of `node` under `mode`, starting from the root triangle.
    pub fn of_node(node: Node, mode: Mode) -> Self {
        let mut attributes = [Vec3::from_array(ROOT_X), Vec3::from_array(ROOT_Y)];
        match mode {
            Mode::Triangle => decode_node_attributes(node, &mut attributes),
            Mode::Square => decode_node_attributes_square(node, &mut attributes),
        }
        let [x, y] = attributes;
        Self::new(
            Vec2::new(x.x, y.x),
            Vec2::new(x.y, y.y),
            Vec2::new(x.z, y.z),
        )
    }

    /// Signed doubled area; the sign flips with the winding.
    #[inline]
    pub fn signed_area2(&self) -> f32 {
        let [v0, v1, v2] = self.vertices;
        (v1 - v0).perp_dot(v2 - v0)
    }

    /// Check if `point` lies inside or on the boundary.
    ///
    /// Each edge wedge is compared against the face winding, which
    /// alternates between bisection levels.
    pub fn contains(&self, point: Vec2) -> bool {
        let orientation = self.signed_area2().signum();
        let [v0, v1, v2] = self.vertices;
        [(v0, v1), (v1, v2), (v2, v0)]
            .into_iter()
            .all(|(a, b)| orientation * wedge(a, b, point) >= 0.0)
    }
}

#[inline]
fn wedge(a: Vec2, b: Vec2, point: Vec2) -> f32 {
    (b - a).perp_dot(point - a)
}
