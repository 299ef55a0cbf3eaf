//! Reference Engine
//!
//! A self-contained [`Engine`]: Wavefront OBJ ingestion into a spilling
//! triangle soup, a KD-tree partition, a merge-and-decimate hierarchy
//! builder, and a quantizing codec writing `.nxz` containers.

pub mod builder;
pub mod container;
pub mod extractor;
pub mod kdtree;
pub mod mesh;
pub mod obj;
pub mod stream;

pub use builder::ReferenceBuilder;
pub use container::{CompressedDocument, NexusDocument, NexusFile, NodeGeometry, PackedNode};
pub use extractor::ReferenceExtractor;
pub use kdtree::KdTreeSoup;
pub use stream::SoupStream;

use std::path::Path;

use nxs_core::AttributeMask;

use crate::engine::{Engine, EngineResult};

/// Engine built from the reference collaborators
#[derive(Debug, Clone, Copy, Default)]
pub struct ReferenceEngine;

impl Engine for ReferenceEngine {
    type Store = SoupStream;
    type Tree = KdTreeSoup;
    type Builder = ReferenceBuilder;
    type Container = NexusFile;
    type Extractor<'a> = ReferenceExtractor<'a>;

    fn create_store(&self, cache_base: &Path) -> EngineResult<SoupStream> {
        Ok(SoupStream::new(cache_base))
    }

    fn create_tree(&self, cache_base: &Path, adaptive: f32) -> EngineResult<KdTreeSoup> {
        Ok(KdTreeSoup::new(cache_base, adaptive))
    }

    fn create_builder(&self, components: AttributeMask) -> ReferenceBuilder {
        ReferenceBuilder::new(components)
    }

    fn open_container(&self, path: &Path) -> EngineResult<NexusFile> {
        NexusFile::open(path)
    }

    fn create_extractor<'a>(&'a self, container: &'a NexusFile) -> ReferenceExtractor<'a> {
        ReferenceExtractor::new(container)
    }
}
