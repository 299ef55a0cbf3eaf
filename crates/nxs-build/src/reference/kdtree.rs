//! KD-tree partition of the soup into leaf blocks
//!
//! Splits recursively on the longest axis of the centroid bounds. The split
//! plane blends the median (balanced blocks) toward the spatial midpoint
//! (compact blocks) by the adaptive factor.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use nxs_core::math::lerp;
use nxs_core::Aabb;
use nxs_platform::filesystem::{remove_if_exists, with_suffix};

use super::mesh::Triangle;
use crate::engine::{EngineResult, PartitionTree};

/// A leaf of the partition
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Block {
    /// Indices into the soup
    pub triangles: Vec<u32>,
    pub bounds: Aabb,
}

/// Partition backed by `<cache base>_tree`
#[derive(Debug)]
pub struct KdTreeSoup {
    cache_path: PathBuf,
    adaptive: f32,
    max_memory: u64,
    max_weight: u32,
    triangles_per_block: u32,
    texel_weight: f32,
    blocks: Vec<Block>,
}

impl KdTreeSoup {
    pub fn new(cache_base: &Path, adaptive: f32) -> Self {
        Self {
            cache_path: with_suffix(cache_base, "_tree"),
            adaptive: adaptive.clamp(0.0, 1.0),
            max_memory: u64::MAX,
            max_weight: 32768,
            triangles_per_block: 32768,
            texel_weight: 0.0,
            blocks: Vec::new(),
        }
    }

    pub fn cache_path(&self) -> &Path {
        &self.cache_path
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn max_memory(&self) -> u64 {
        self.max_memory
    }

    /// Weight of one triangle: 1, plus the texel weight when textured
    fn weight(&self, triangle: &Triangle) -> f32 {
        if triangle.is_textured() {
            1.0 + self.texel_weight
        } else {
            1.0
        }
    }

    /// Partition `triangles` into blocks and record them in the cache file
    pub fn build(&mut self, triangles: &[Triangle]) -> EngineResult<()> {
        self.blocks.clear();
        if !triangles.is_empty() {
            let indices: Vec<u32> = (0..triangles.len() as u32).collect();
            self.split(indices, triangles);
        }

        let mut writer = BufWriter::new(File::create(&self.cache_path)?);
        bincode::serialize_into(&mut writer, &self.blocks)?;
        writer.flush()?;

        log::debug!(
            "Partitioned {} triangles into {} blocks",
            triangles.len(),
            self.blocks.len()
        );
        Ok(())
    }

    fn split(&mut self, mut indices: Vec<u32>, triangles: &[Triangle]) {
        let weight: f32 = indices
            .iter()
            .map(|&i| self.weight(&triangles[i as usize]))
            .sum();
        let max_triangles = self.triangles_per_block.max(1) as usize;
        let max_weight = self.max_weight.max(1) as f32;

        if indices.len() <= 1 || (indices.len() <= max_triangles && weight <= max_weight) {
            let bounds = indices
                .iter()
                .fold(Aabb::EMPTY, |b, &i| b.merge(&triangles[i as usize].bounds()));
            self.blocks.push(Block {
                triangles: indices,
                bounds,
            });
            return;
        }

        let centroid_bounds =
            Aabb::from_points(indices.iter().map(|&i| triangles[i as usize].centroid()));
        let axis = centroid_bounds.longest_axis();
        let key = |i: &u32| triangles[*i as usize].centroid()[axis];
        indices.sort_by(|a, b| key(a).total_cmp(&key(b)));

        let mid = indices.len() / 2;
        let median = key(&indices[mid]);
        let midpoint = centroid_bounds.center()[axis];
        let plane = lerp(median, midpoint, self.adaptive);

        // all centroids on one side of the plane: fall back to the median
        let at = match indices.partition_point(|i| key(i) < plane) {
            0 => mid,
            n if n == indices.len() => mid,
            n => n,
        };

        let right = indices.split_off(at);
        self.split(indices, triangles);
        self.split(right, triangles);
    }
}

impl PartitionTree for KdTreeSoup {
    fn set_max_memory(&mut self, bytes: u64) {
        self.max_memory = bytes;
    }

    fn set_max_weight(&mut self, weight: u32) {
        self.max_weight = weight;
    }

    fn set_triangles_per_block(&mut self, triangles: u32) {
        self.triangles_per_block = triangles;
    }

    fn set_texel_weight(&mut self, weight: f32) {
        self.texel_weight = weight;
    }
}

impl Drop for KdTreeSoup {
    fn drop(&mut self) {
        if let Err(e) = remove_if_exists(&self.cache_path) {
            log::warn!("Could not remove {}: {}", self.cache_path.display(), e);
        }
    }
}
