//! Build Options
//!
//! Every knob the build and compression stages read, grouped the way the
//! stages consume them. All fields default to the values the command-line
//! tool ships with, so a JSON option file only needs the fields it changes.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::signature::Codec;
use crate::{CoreError, CoreResult};

const MIB: u64 = 1 << 20;

/// Geometry and hierarchy construction knobs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HierarchyOptions {
    /// Target number of faces per leaf node (also the kd-tree block weight)
    pub node_faces: u32,
    /// Number of faces in the top (root) node
    pub top_node_faces: u32,
    /// Optional position quantization applied while loading (0 = off)
    pub vertex_quantization: f32,
    /// Simplification ratio between levels
    pub scaling: f32,
    /// Number of levels built without simplification
    pub skip_levels: u32,
    /// Kd-tree split position blend (0 = median, 1 = midpoint)
    pub adaptive: f32,
    /// Memory budget in MiB
    pub ram_buffer_mb: u64,
    /// Worker threads for the builder (0 = one per hardware thread)
    pub n_threads: usize,
    /// Relative weight of texels against triangles when splitting
    pub texel_weight: f32,
    /// JPEG quality for node textures
    pub texture_quality: u32,
    /// Material library to use instead of the one referenced by the model
    pub material_library: Option<PathBuf>,
    /// Directory for cache files (working directory when unset)
    pub cache_dir: Option<PathBuf>,
}

impl Default for HierarchyOptions {
    fn default() -> Self {
        Self {
            node_faces: 1 << 15,
            top_node_faces: 4096,
            vertex_quantization: 0.0,
            scaling: 0.5,
            skip_levels: 0,
            adaptive: 0.333,
            ram_buffer_mb: 2000,
            n_threads: 0,
            texel_weight: 0.1,
            texture_quality: 95,
            material_library: None,
            cache_dir: None,
        }
    }
}

impl HierarchyOptions {
    /// Memory budget handed to the ingestion store and the builder.
    ///
    /// A quarter of the RAM buffer: the split is an estimate, the stream
    /// and the builder both keep a working set of about that size.
    pub fn stream_memory_bytes(&self) -> u64 {
        MIB * self.ram_buffer_mb / 4
    }

    /// Memory budget handed to the spatial partition
    pub fn tree_memory_bytes(&self) -> u64 {
        MIB * self.ram_buffer_mb / 2
    }

    /// Worker thread count given the hardware hint, never zero
    pub fn thread_count(&self, hardware_threads: usize) -> usize {
        if self.n_threads > 0 {
            self.n_threads
        } else {
            hardware_threads.max(1)
        }
    }
}

/// Which per-vertex attributes to keep
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AttributeOptions {
    /// Build a point cloud (no faces)
    pub point_cloud: bool,
    /// Keep normals even when the source has none
    pub force_normals: bool,
    /// Drop normals
    pub disable_normals: bool,
    /// Keep colors even when the source has none
    pub force_colors: bool,
    /// Drop colors
    pub disable_colors: bool,
    /// Drop texture coordinates (and textures)
    pub disable_texcoords: bool,
    /// Reference the source textures instead of per-node textures
    pub use_original_textures: bool,
    /// Resize node textures to power-of-two sizes
    pub create_pow_two_textures: bool,
    /// Mark the output as a deepzoom layout
    pub deepzoom: bool,
}

/// Lossy compression knobs for `.nxz` output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionOptions {
    /// Compress when the output has the `.nxz` extension
    pub enable_compression: bool,
    /// Codec name, `"corto"` or `"meco"`
    pub compress_lib: String,
    /// Explicit coordinate quantization step (0 = derive)
    pub coord_step: f32,
    /// Bits of position precision relative to the bounding sphere (0 = derive)
    pub position_bits: u32,
    /// Quantization as a fraction of the node error (0 = off)
    pub error_q: f32,
    /// Luma bits
    pub luma_bits: u8,
    /// Chroma bits, used for both chroma channels
    pub chroma_bits: u8,
    /// Alpha bits
    pub alpha_bits: u8,
    /// Normal bits
    pub normal_bits: u8,
    /// Texture coordinate step in texels
    pub tex_step: f32,
}

impl Default for CompressionOptions {
    fn default() -> Self {
        Self {
            enable_compression: true,
            compress_lib: String::from("corto"),
            coord_step: 0.0,
            position_bits: 0,
            error_q: 0.1,
            luma_bits: 6,
            chroma_bits: 6,
            alpha_bits: 5,
            normal_bits: 10,
            tex_step: 0.25,
        }
    }
}

impl CompressionOptions {
    /// Parse the configured codec name
    pub fn codec(&self) -> CoreResult<Codec> {
        self.compress_lib.parse()
    }
}

/// Complete option set for one build
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildOptions {
    pub hierarchy: HierarchyOptions,
    pub attributes: AttributeOptions,
    pub compression: CompressionOptions,
}

impl BuildOptions {
    /// Parse options from JSON; missing fields keep their defaults
    pub fn from_json_str(json: &str) -> CoreResult<Self> {
        serde_json::from_str(json).map_err(CoreError::from)
    }

    /// Read options from a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> CoreResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Serialize to pretty JSON
    pub fn to_json(&self) -> CoreResult<String> {
        serde_json::to_string_pretty(self).map_err(CoreError::from)
    }
}
