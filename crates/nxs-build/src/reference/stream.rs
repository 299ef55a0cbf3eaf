//! Out-of-core triangle soup
//!
//! Loads source models into one soup. When the soup outgrows the memory
//! budget it is spilled to a bincode cache file next to the cache base and
//! read back on demand. The cache file is removed when the store drops.

use std::borrow::Cow;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use nxs_core::{Aabb, Patch};
use nxs_platform::filesystem::{remove_if_exists, with_suffix};
use nxs_platform::locale;

use super::mesh::Triangle;
use super::obj;
use crate::engine::{EngineResult, IngestionStore, TextureSet};

/// Soup store backed by `<cache base>_stream`
#[derive(Debug)]
pub struct SoupStream {
    cache_path: PathBuf,
    vertex_quantization: f32,
    max_memory: u64,
    triangles: Vec<Triangle>,
    len: usize,
    spilled: bool,
    bounds: Aabb,
    has_normals: bool,
    has_colors: bool,
    has_texcoords: bool,
    point_cloud: bool,
    textures: TextureSet,
}

impl SoupStream {
    pub fn new(cache_base: &Path) -> Self {
        Self {
            cache_path: with_suffix(cache_base, "_stream"),
            vertex_quantization: 0.0,
            max_memory: u64::MAX,
            triangles: Vec::new(),
            len: 0,
            spilled: false,
            bounds: Aabb::EMPTY,
            has_normals: false,
            has_colors: false,
            has_texcoords: false,
            point_cloud: false,
            textures: TextureSet::new(),
        }
    }

    /// Path of the spill file
    pub fn cache_path(&self) -> &Path {
        &self.cache_path
    }

    /// Number of loaded triangles (points for point clouds)
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether the soup lives on disk
    pub fn is_spilled(&self) -> bool {
        self.spilled
    }

    pub fn is_point_cloud(&self) -> bool {
        self.point_cloud
    }

    pub fn bounds(&self) -> Aabb {
        self.bounds
    }

    /// The whole soup, read back from the cache when spilled
    pub fn triangles(&self) -> EngineResult<Cow<'_, [Triangle]>> {
        if !self.spilled {
            return Ok(Cow::Borrowed(&self.triangles));
        }
        let reader = BufReader::new(File::open(&self.cache_path)?);
        let triangles: Vec<Triangle> = bincode::deserialize_from(reader)?;
        Ok(Cow::Owned(triangles))
    }

    fn memory_estimate(&self) -> u64 {
        (self.triangles.len() * std::mem::size_of::<Triangle>()) as u64
    }

    fn quantize(&self, triangle: &mut Triangle) {
        let step = self.vertex_quantization;
        if step > 0.0 {
            for vertex in &mut triangle.vertices {
                vertex.position = (vertex.position / step).round() * step;
            }
        }
    }

    fn spill(&mut self) -> EngineResult<()> {
        let mut writer = BufWriter::new(File::create(&self.cache_path)?);
        bincode::serialize_into(&mut writer, &self.triangles)?;
        writer.flush()?;
        log::debug!(
            "Spilled {} triangles to {}",
            self.triangles.len(),
            self.cache_path.display()
        );
        self.triangles = Vec::new();
        self.spilled = true;
        Ok(())
    }
}

impl IngestionStore for SoupStream {
    fn set_vertex_quantization(&mut self, step: f32) {
        self.vertex_quantization = step;
    }

    fn set_max_memory(&mut self, bytes: u64) {
        self.max_memory = bytes;
    }

    fn load(&mut self, paths: &[PathBuf], material_library: Option<&Path>) -> EngineResult<()> {
        let separator = locale::decimal_separator();
        let mut point_cloud = true;

        for path in paths {
            log::info!("Loading {}", path.display());
            let model = obj::load(path, material_library, separator)?;
            point_cloud &= model.is_point_cloud();
            self.has_normals |= model.has_normals;
            self.has_colors |= model.has_colors;
            self.has_texcoords |= model.has_texcoords;

            // texture indices are per file; remap into the shared set
            let remap: Vec<u32> = model
                .textures
                .iter()
                .map(|texture| self.textures.insert(texture))
                .collect();

            for mut triangle in model.triangles {
                self.quantize(&mut triangle);
                if triangle.texture != Patch::NO_TEXTURE {
                    triangle.texture = remap
                        .get(triangle.texture as usize)
                        .copied()
                        .unwrap_or(Patch::NO_TEXTURE);
                }
                self.bounds = self.bounds.merge(&triangle.bounds());
                self.triangles.push(triangle);
            }
        }

        self.len = self.triangles.len();
        self.point_cloud = point_cloud && self.len > 0;
        if self.memory_estimate() > self.max_memory {
            self.spill()?;
        }
        log::info!(
            "Loaded {} {} ({} textures)",
            self.len,
            if self.point_cloud { "points" } else { "triangles" },
            self.textures.len()
        );
        Ok(())
    }

    fn has_normals(&self) -> bool {
        self.has_normals
    }

    fn has_colors(&self) -> bool {
        self.has_colors
    }

    fn has_textures(&self) -> bool {
        self.has_texcoords && !self.textures.is_empty()
    }

    fn textures(&self) -> &TextureSet {
        &self.textures
    }

    fn textures_mut(&mut self) -> &mut TextureSet {
        &mut self.textures
    }
}

impl Drop for SoupStream {
    fn drop(&mut self) {
        if let Err(e) = remove_if_exists(&self.cache_path) {
            log::warn!("Could not remove {}: {}", self.cache_path.display(), e);
        }
    }
}
