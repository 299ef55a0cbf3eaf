//! Container files
//!
//! `.nxs` holds the hierarchy tables followed by the full precision geometry
//! of every node, bincode encoded with fixed-width integers. `.nxz` holds the
//! same tables with quantized geometry, varint encoded.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use bincode::Options;
use glam::Vec3;
use serde::{Deserialize, Serialize};

use nxs_core::hierarchy::{CONTAINER_MAGIC, CONTAINER_VERSION};
use nxs_core::{Header, Node, Patch, QuantizationPlan};
use nxs_platform::write_atomically;

use crate::engine::{CompressedContainer, EngineError, EngineResult};

/// Full precision geometry of one node. Channels absent from the
/// signature are left empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeGeometry {
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub colors: Vec<[u8; 4]>,
    pub uvs: Vec<[f32; 2]>,
    /// Empty for point clouds
    pub faces: Vec<[u32; 3]>,
}

/// Contents of an uncompressed container
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NexusDocument {
    pub header: Header,
    pub nodes: Vec<Node>,
    pub patches: Vec<Patch>,
    pub textures: Vec<PathBuf>,
    /// One entry per node, the sink included
    pub geometry: Vec<NodeGeometry>,
}

/// Check the header fields shared by both container kinds
fn check_tables(
    header: &Header,
    nodes: usize,
    patches: usize,
    textures: usize,
    geometry: usize,
) -> EngineResult<()> {
    if header.magic != CONTAINER_MAGIC {
        return Err(EngineError::InvalidContainer(format!("bad magic {:#010x}", header.magic)));
    }
    if header.version != CONTAINER_VERSION {
        return Err(EngineError::InvalidContainer(format!(
            "unsupported version {}",
            header.version
        )));
    }
    if header.n_nodes as usize != nodes
        || header.n_patches as usize != patches
        || header.n_textures as usize != textures
        || geometry != nodes
    {
        return Err(EngineError::InvalidContainer(String::from(
            "table sizes disagree with the header",
        )));
    }
    Ok(())
}

impl NexusDocument {
    pub fn validate(&self) -> EngineResult<()> {
        check_tables(
            &self.header,
            self.nodes.len(),
            self.patches.len(),
            self.textures.len(),
            self.geometry.len(),
        )
    }

    /// Write atomically to `path`
    pub fn write(&self, path: &Path) -> EngineResult<()> {
        write_atomically(path, |writer| {
            bincode::serialize_into(writer, self).map_err(EngineError::from)
        })
    }

    pub fn read(path: &Path) -> EngineResult<Self> {
        let reader = BufReader::new(File::open(path)?);
        let document: Self = bincode::deserialize_from(reader)
            .map_err(|e| EngineError::InvalidContainer(format!("{}: {}", path.display(), e)))?;
        document.validate()?;
        Ok(document)
    }
}

/// An uncompressed container opened for reading
#[derive(Debug)]
pub struct NexusFile {
    path: PathBuf,
    document: NexusDocument,
}

impl NexusFile {
    pub fn open(path: &Path) -> EngineResult<Self> {
        let document = NexusDocument::read(path)?;
        log::debug!(
            "Opened {} ({} nodes, {} patches)",
            path.display(),
            document.nodes.len(),
            document.patches.len()
        );
        Ok(Self {
            path: path.to_path_buf(),
            document,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn document(&self) -> &NexusDocument {
        &self.document
    }

    pub fn geometry(&self) -> &[NodeGeometry] {
        &self.document.geometry
    }

    pub fn textures(&self) -> &[PathBuf] {
        &self.document.textures
    }
}

impl CompressedContainer for NexusFile {
    fn header(&self) -> &Header {
        &self.document.header
    }

    fn nodes(&self) -> &[Node] {
        &self.document.nodes
    }

    fn patches(&self) -> &[Patch] {
        &self.document.patches
    }
}

/// Quantized geometry of one node
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PackedNode {
    /// Positions are multiples of `2^coord_q`
    pub coord_q: i32,
    pub positions: Vec<[i32; 3]>,
    pub normals: Vec<[i32; 3]>,
    pub colors: Vec<[u8; 4]>,
    pub uvs: Vec<[i32; 2]>,
    pub faces: Vec<[u32; 3]>,
}

impl PackedNode {
    /// Size of the position grid
    pub fn coord_step(&self) -> f32 {
        (self.coord_q as f32).exp2()
    }

    /// Positions back in model space
    pub fn dequantized_positions(&self) -> impl Iterator<Item = Vec3> + '_ {
        let step = self.coord_step();
        self.positions
            .iter()
            .map(move |p| Vec3::new(p[0] as f32, p[1] as f32, p[2] as f32) * step)
    }
}

/// Contents of a compressed container
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompressedDocument {
    pub header: Header,
    pub nodes: Vec<Node>,
    pub patches: Vec<Patch>,
    pub textures: Vec<PathBuf>,
    /// Parameters the geometry was quantized with
    pub plan: QuantizationPlan,
    pub geometry: Vec<PackedNode>,
}

fn compressed_options() -> impl Options {
    bincode::DefaultOptions::new().with_varint_encoding()
}

impl CompressedDocument {
    pub fn validate(&self) -> EngineResult<()> {
        check_tables(
            &self.header,
            self.nodes.len(),
            self.patches.len(),
            self.textures.len(),
            self.geometry.len(),
        )?;
        if !self.header.signature.is_compressed() {
            return Err(EngineError::InvalidContainer(String::from(
                "signature names no codec",
            )));
        }
        Ok(())
    }

    /// Write atomically to `path`
    pub fn write(&self, path: &Path) -> EngineResult<()> {
        write_atomically(path, |writer| {
            compressed_options()
                .serialize_into(writer, self)
                .map_err(EngineError::from)
        })
    }

    pub fn read(path: &Path) -> EngineResult<Self> {
        let reader = BufReader::new(File::open(path)?);
        let document: Self = compressed_options()
            .deserialize_from(reader)
            .map_err(|e| EngineError::InvalidContainer(format!("{}: {}", path.display(), e)))?;
        document.validate()?;
        Ok(document)
    }
}
