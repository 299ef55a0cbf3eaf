//! Hierarchy tables
//!
//! The node and patch records shared by the builder, the container reader
//! and the codec. Node 0 is the root; the last node is the sink, an empty
//! terminator every leaf patch points to.

use serde::{Deserialize, Serialize};

use crate::math::Sphere;
use crate::signature::Signature;

/// Magic number at the start of every container ("Nxs ")
pub const CONTAINER_MAGIC: u32 = 0x4E78_7320;

/// Container layout version
pub const CONTAINER_VERSION: u32 = 2;

/// One level-of-detail cell
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Node {
    /// Index of the first patch of this node
    pub first_patch: u32,
    /// Geometric error of the node
    pub error: f32,
    /// Bounds of the node geometry
    pub sphere: Sphere,
    /// Vertex count
    pub nvert: u32,
    /// Face count (primitive count for point clouds)
    pub nface: u32,
}

/// A piece of a node's geometry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Patch {
    /// Node this patch merges into
    pub node: u32,
    /// One past the last triangle of the patch within its node
    pub triangle_offset: u32,
    /// Texture index, `u32::MAX` when untextured
    pub texture: u32,
}

impl Patch {
    /// Texture index meaning "no texture"
    pub const NO_TEXTURE: u32 = u32::MAX;
}

/// Container header
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Header {
    pub magic: u32,
    pub version: u32,
    pub signature: Signature,
    pub n_vert: u64,
    pub n_face: u64,
    pub n_nodes: u32,
    pub n_patches: u32,
    pub n_textures: u32,
    /// Bounds of the whole model
    pub sphere: Sphere,
}

impl Header {
    /// Create an empty header for the given signature
    pub fn new(signature: Signature) -> Self {
        Self {
            magic: CONTAINER_MAGIC,
            version: CONTAINER_VERSION,
            signature,
            n_vert: 0,
            n_face: 0,
            n_nodes: 0,
            n_patches: 0,
            n_textures: 0,
            sphere: Sphere::default(),
        }
    }

    /// Index of the sink node
    pub fn sink(&self) -> u32 {
        self.n_nodes.saturating_sub(1)
    }
}

/// Range of patch indices owned by `node`
pub fn patch_range(nodes: &[Node], n_patches: usize, node: usize) -> std::ops::Range<usize> {
    let start = nodes[node].first_patch as usize;
    let end = nodes
        .get(node + 1)
        .map(|next| next.first_patch as usize)
        .unwrap_or(n_patches);
    start..end.max(start)
}
