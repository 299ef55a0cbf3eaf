//! Engine Contracts
//!
//! The collaborators the build pipeline drives without knowing how they
//! work: an out-of-core ingestion store, a spatial partition, the
//! multiresolution builder, a container reader and the compression codec.
//! An [`Engine`] bundles one implementation of each.

use std::path::{Path, PathBuf};

use indexmap::IndexSet;
use thiserror::Error;

use nxs_core::{AttributeMask, BuildOptions, Header, Node, Patch, QuantizationPlan, Signature};

/// Faults raised by engine collaborators
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Encoding error: {0}")]
    Encoding(#[from] bincode::Error),

    #[error("Parse error in {path}:{line}: {message}")]
    Parse {
        path: String,
        line: usize,
        message: String,
    },

    #[error("Invalid container: {0}")]
    InvalidContainer(String),

    #[error("{0}")]
    Failed(String),
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Ordered, de-duplicated set of texture image paths
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextureSet {
    textures: IndexSet<PathBuf>,
}

impl TextureSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a texture, returning its index (existing index if already present)
    pub fn insert(&mut self, path: impl Into<PathBuf>) -> u32 {
        let (index, _) = self.textures.insert_full(path.into());
        index as u32
    }

    /// Texture at `index`
    pub fn get(&self, index: u32) -> Option<&Path> {
        self.textures.get_index(index as usize).map(PathBuf::as_path)
    }

    /// Number of textures
    pub fn len(&self) -> usize {
        self.textures.len()
    }

    /// Whether the set is empty
    pub fn is_empty(&self) -> bool {
        self.textures.is_empty()
    }

    /// Drop every texture
    pub fn clear(&mut self) {
        self.textures.clear();
        self.textures.shrink_to_fit();
    }

    /// Iterate textures in index order
    pub fn iter(&self) -> impl Iterator<Item = &Path> {
        self.textures.iter().map(PathBuf::as_path)
    }
}

/// Hierarchy builder configuration
#[derive(Debug, Clone, PartialEq)]
pub struct BuilderSettings {
    /// Worker threads
    pub n_threads: usize,
    /// Simplification ratio between levels
    pub scaling: f32,
    /// Levels built without simplification
    pub skip_levels: u32,
    /// Memory budget in bytes
    pub max_memory: u64,
    /// Generate per-node textures (false: reference the originals)
    pub use_node_textures: bool,
    /// Resize node textures to powers of two
    pub create_pow_two_textures: bool,
    /// Flag the output as deepzoom
    pub deepzoom: bool,
    /// JPEG quality of node textures
    pub texture_quality: u32,
}

impl BuilderSettings {
    /// Settings derived from a build's options
    pub fn from_options(options: &BuildOptions, hardware_threads: usize) -> Self {
        let hierarchy = &options.hierarchy;
        let attributes = &options.attributes;
        Self {
            n_threads: hierarchy.thread_count(hardware_threads),
            scaling: hierarchy.scaling,
            skip_levels: hierarchy.skip_levels,
            max_memory: hierarchy.stream_memory_bytes(),
            use_node_textures: !attributes.use_original_textures,
            create_pow_two_textures: attributes.create_pow_two_textures,
            deepzoom: attributes.deepzoom,
            texture_quality: hierarchy.texture_quality,
        }
    }
}

impl Default for BuilderSettings {
    fn default() -> Self {
        Self::from_options(&BuildOptions::default(), 1)
    }
}

/// Out-of-core store the source model is loaded into
pub trait IngestionStore {
    /// Snap positions to a grid of this step while loading (0 = off)
    fn set_vertex_quantization(&mut self, step: f32);

    /// Memory the store may keep resident
    fn set_max_memory(&mut self, bytes: u64);

    /// Load source files, optionally with an explicit material library
    fn load(&mut self, paths: &[PathBuf], material_library: Option<&Path>) -> EngineResult<()>;

    fn has_normals(&self) -> bool;
    fn has_colors(&self) -> bool;
    fn has_textures(&self) -> bool;

    /// Textures referenced by the loaded model
    fn textures(&self) -> &TextureSet;

    /// Mutable texture set, so unneeded textures can be released
    fn textures_mut(&mut self) -> &mut TextureSet;
}

/// Spatial partition feeding the builder its leaf blocks
pub trait PartitionTree {
    fn set_max_memory(&mut self, bytes: u64);

    /// Maximum weight of a block
    fn set_max_weight(&mut self, weight: u32);

    fn set_triangles_per_block(&mut self, triangles: u32);

    /// Weight of texels relative to triangles
    fn set_texel_weight(&mut self, weight: f32);
}

/// Builds and saves the multiresolution hierarchy
pub trait HierarchyBuilder {
    type Store: IngestionStore;
    type Tree: PartitionTree;

    fn configure(&mut self, settings: &BuilderSettings);

    /// Prepare texture packing; `false` when the textures are unusable
    fn init_atlas(&mut self, textures: &TextureSet) -> bool;

    /// Build the hierarchy top-down
    fn create(
        &mut self,
        tree: &mut Self::Tree,
        store: &mut Self::Store,
        top_node_size: u32,
    ) -> EngineResult<()>;

    /// Write the uncompressed container. Either the whole file appears at
    /// `path` or nothing does.
    fn save(&mut self, path: &Path) -> EngineResult<()>;
}

/// Read access to a saved container
pub trait CompressedContainer {
    fn header(&self) -> &Header;
    fn nodes(&self) -> &[Node];
    fn patches(&self) -> &[Patch];
}

/// Re-encodes an open container with the lossy codec
pub trait CodecExtractor {
    /// Quantization parameters to encode with
    fn configure(&mut self, plan: &QuantizationPlan);

    /// Write the compressed container with the given signature
    fn save(&mut self, path: &Path, signature: Signature) -> EngineResult<()>;
}

/// Factory for one family of collaborators
pub trait Engine {
    type Store: IngestionStore;
    type Tree: PartitionTree;
    type Builder: HierarchyBuilder<Store = Self::Store, Tree = Self::Tree>;
    type Container: CompressedContainer;
    type Extractor<'a>: CodecExtractor
    where
        Self: 'a;

    /// Ingestion store whose cache files start with `cache_base`
    fn create_store(&self, cache_base: &Path) -> EngineResult<Self::Store>;

    /// Partition whose cache files start with `cache_base`
    fn create_tree(&self, cache_base: &Path, adaptive: f32) -> EngineResult<Self::Tree>;

    /// Builder storing the given channels
    fn create_builder(&self, components: AttributeMask) -> Self::Builder;

    /// Open a saved container read-only
    fn open_container(&self, path: &Path) -> EngineResult<Self::Container>;

    /// Codec bound to an open container
    fn create_extractor<'a>(&'a self, container: &'a Self::Container) -> Self::Extractor<'a>;
}
