//! Triangle soup records

use glam::Vec3;
use serde::{Deserialize, Serialize};

use nxs_core::{Aabb, Patch};

/// One vertex with every optional channel
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vertex {
    pub position: Vec3,
    /// Zero when the source has no normal
    pub normal: Vec3,
    /// RGBA, opaque white when the source has no color
    pub color: [u8; 4],
    pub uv: [f32; 2],
}

impl Vertex {
    /// Vertex carrying only a position
    pub fn at(position: Vec3) -> Self {
        Self {
            position,
            normal: Vec3::ZERO,
            color: [255; 4],
            uv: [0.0; 2],
        }
    }
}

/// Soup element. Point clouds store each point as a degenerate triangle
/// with three identical corners.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Triangle {
    pub vertices: [Vertex; 3],
    /// Texture index, [`Patch::NO_TEXTURE`] when untextured
    pub texture: u32,
}

impl Triangle {
    pub fn new(vertices: [Vertex; 3], texture: u32) -> Self {
        Self { vertices, texture }
    }

    /// Degenerate triangle standing for a single point
    pub fn point(vertex: Vertex) -> Self {
        Self {
            vertices: [vertex; 3],
            texture: Patch::NO_TEXTURE,
        }
    }

    pub fn is_point(&self) -> bool {
        let [a, b, c] = &self.vertices;
        a.position == b.position && b.position == c.position
    }

    pub fn is_textured(&self) -> bool {
        self.texture != Patch::NO_TEXTURE
    }

    pub fn centroid(&self) -> Vec3 {
        let [a, b, c] = &self.vertices;
        (a.position + b.position + c.position) / 3.0
    }

    /// Unit face normal, zero for degenerate triangles
    pub fn face_normal(&self) -> Vec3 {
        let [a, b, c] = &self.vertices;
        (b.position - a.position)
            .cross(c.position - a.position)
            .normalize_or_zero()
    }

    pub fn longest_edge(&self) -> f32 {
        let [a, b, c] = &self.vertices;
        let ab = a.position.distance(b.position);
        let bc = b.position.distance(c.position);
        let ca = c.position.distance(a.position);
        ab.max(bc).max(ca)
    }

    pub fn bounds(&self) -> Aabb {
        Aabb::from_points(self.vertices.iter().map(|v| v.position))
    }
}

/// Bounds of a set of triangles
pub fn soup_bounds<'a>(triangles: impl IntoIterator<Item = &'a Triangle>) -> Aabb {
    triangles
        .into_iter()
        .fold(Aabb::EMPTY, |bounds, triangle| bounds.merge(&triangle.bounds()))
}

/// Geometric error of a set of triangles: the mean longest edge, or for
/// point clouds the mean point spacing estimated from the bounds.
pub fn soup_error(triangles: &[Triangle]) -> f32 {
    if triangles.is_empty() {
        return 0.0;
    }
    if triangles.iter().all(Triangle::is_point) {
        let diagonal = soup_bounds(triangles).diagonal();
        return diagonal / (triangles.len() as f32).sqrt();
    }
    let total: f32 = triangles.iter().map(Triangle::longest_edge).sum();
    total / triangles.len() as f32
}
