//! Multiresolution hierarchy builder
//!
//! Every partition block becomes a leaf. Levels are then merged four cells at
//! a time, simplifying the merged geometry by the scaling factor, until a
//! single cell no larger than the top node size remains. Nodes are stored
//! root first; the sink closes the table.

use std::path::{Path, PathBuf};

use ahash::AHashMap;
use rayon::prelude::*;

use nxs_core::{Aabb, AttributeMask, Header, Node, Patch, Signature, SignatureFlags, Sphere};

use super::container::{NexusDocument, NodeGeometry};
use super::kdtree::KdTreeSoup;
use super::mesh::{soup_bounds, soup_error, Triangle, Vertex};
use super::stream::SoupStream;
use crate::engine::{BuilderSettings, EngineError, EngineResult, HierarchyBuilder, TextureSet};

/// Cells merged into one parent
const FAN_IN: usize = 4;

#[derive(Debug, Clone)]
struct Cell {
    triangles: Vec<Triangle>,
    children: Vec<usize>,
    bounds: Aabb,
    error: f32,
}

impl Cell {
    fn leaf(triangles: Vec<Triangle>) -> Self {
        Self {
            bounds: soup_bounds(&triangles),
            error: soup_error(&triangles),
            triangles,
            children: Vec::new(),
        }
    }

    fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// Keep an evenly spread `scaling` fraction of the triangles, at least one
fn decimate(triangles: Vec<Triangle>, scaling: f32) -> Vec<Triangle> {
    let n = triangles.len();
    let keep = ((n as f32 * scaling).floor() as usize).clamp(1, n.max(1));
    if keep >= n {
        return triangles;
    }
    (0..keep).map(|i| triangles[i * n / keep]).collect()
}

fn merge(cells: &[Cell], group: &[usize], simplify: bool, scaling: f32) -> Cell {
    let triangles: Vec<Triangle> = group
        .iter()
        .flat_map(|&c| cells[c].triangles.iter().copied())
        .collect();
    let bounds = group
        .iter()
        .fold(Aabb::EMPTY, |b, &c| b.merge(&cells[c].bounds));
    let child_error = group.iter().map(|&c| cells[c].error).fold(0.0, f32::max);

    let (triangles, error) = if simplify {
        (decimate(triangles, scaling), child_error / scaling.sqrt())
    } else {
        (triangles, child_error)
    };
    Cell {
        triangles,
        children: group.to_vec(),
        bounds,
        error,
    }
}

/// Appends soup triangles to a node's geometry, sharing identical vertices
struct GeometryWriter {
    components: AttributeMask,
    geometry: NodeGeometry,
    index: AHashMap<[u32; 9], u32>,
}

impl GeometryWriter {
    fn new(components: AttributeMask) -> Self {
        Self {
            components,
            geometry: NodeGeometry::default(),
            index: AHashMap::new(),
        }
    }

    /// Faces for meshes, points otherwise
    fn primitives(&self) -> u32 {
        if self.components.contains(AttributeMask::FACES) {
            self.geometry.faces.len() as u32
        } else {
            self.geometry.positions.len() as u32
        }
    }

    fn vertex(&mut self, vertex: &Vertex, face_normal: glam::Vec3, share: bool) -> u32 {
        let normal = if vertex.normal == glam::Vec3::ZERO {
            face_normal
        } else {
            vertex.normal
        };
        let with_normals = self.components.contains(AttributeMask::NORMALS);
        let with_colors = self.components.contains(AttributeMask::COLORS);
        let with_uvs = self.components.contains(AttributeMask::TEXTURES);

        let key = [
            vertex.position.x.to_bits(),
            vertex.position.y.to_bits(),
            vertex.position.z.to_bits(),
            if with_normals { normal.x.to_bits() } else { 0 },
            if with_normals { normal.y.to_bits() } else { 0 },
            if with_normals { normal.z.to_bits() } else { 0 },
            if with_colors { u32::from_le_bytes(vertex.color) } else { 0 },
            if with_uvs { vertex.uv[0].to_bits() } else { 0 },
            if with_uvs { vertex.uv[1].to_bits() } else { 0 },
        ];
        if share && let Some(&index) = self.index.get(&key) {
            return index;
        }

        let geometry = &mut self.geometry;
        let index = geometry.positions.len() as u32;
        geometry.positions.push(vertex.position);
        if with_normals {
            geometry.normals.push(normal);
        }
        if with_colors {
            geometry.colors.push(vertex.color);
        }
        if with_uvs {
            geometry.uvs.push(vertex.uv);
        }
        if share {
            self.index.insert(key, index);
        }
        index
    }

    fn push(&mut self, triangle: &Triangle) {
        let face_normal = triangle.face_normal();
        if self.components.contains(AttributeMask::FACES) {
            let [a, b, c] = &triangle.vertices;
            let face = [
                self.vertex(a, face_normal, true),
                self.vertex(b, face_normal, true),
                self.vertex(c, face_normal, true),
            ];
            self.geometry.faces.push(face);
        } else if triangle.is_point() {
            self.vertex(&triangle.vertices[0], face_normal, false);
        } else {
            for vertex in &triangle.vertices {
                self.vertex(vertex, face_normal, false);
            }
        }
    }
}

/// Builder producing [`NexusDocument`]s
#[derive(Debug)]
pub struct ReferenceBuilder {
    components: AttributeMask,
    settings: BuilderSettings,
    textures: Vec<PathBuf>,
    document: Option<NexusDocument>,
}

impl ReferenceBuilder {
    pub fn new(components: AttributeMask) -> Self {
        Self {
            components,
            settings: BuilderSettings::default(),
            textures: Vec::new(),
            document: None,
        }
    }

    pub fn components(&self) -> AttributeMask {
        self.components
    }

    pub fn settings(&self) -> &BuilderSettings {
        &self.settings
    }

    /// The built hierarchy, once [`HierarchyBuilder::create`] succeeded
    pub fn document(&self) -> Option<&NexusDocument> {
        self.document.as_ref()
    }

    fn signature(&self) -> Signature {
        let mut signature = Signature::new(self.components);
        if self.components.contains(AttributeMask::TEXTURES) && self.settings.use_node_textures {
            signature.flags |= SignatureFlags::PTEXTURE;
        }
        if self.settings.deepzoom {
            signature.flags |= SignatureFlags::DEEPZOOM;
        }
        signature
    }

    fn patch_texture(&self, triangle: &Triangle) -> u32 {
        if self.components.contains(AttributeMask::TEXTURES)
            && (triangle.texture as usize) < self.textures.len()
        {
            triangle.texture
        } else {
            Patch::NO_TEXTURE
        }
    }

    /// Build every level above the leaves; returns the root cell
    fn build_levels(&self, cells: &mut Vec<Cell>, top_node_size: u32) -> EngineResult<usize> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.settings.n_threads.max(1))
            .build()
            .map_err(|e| EngineError::Failed(format!("Could not start worker threads: {}", e)))?;

        let top = top_node_size.max(1) as usize;
        let scaling = self.settings.scaling;
        let mut current: Vec<usize> = (0..cells.len()).collect();
        let mut level = 0u32;

        loop {
            let total: usize = current.iter().map(|&c| cells[c].triangles.len()).sum();
            if current.len() == 1 && total <= top {
                break;
            }
            let simplify = level >= self.settings.skip_levels || current.len() == 1;

            let groups: Vec<&[usize]> = current.chunks(FAN_IN).collect();
            let merged: Vec<Cell> = {
                let cells: &[Cell] = cells;
                pool.install(|| {
                    groups
                        .par_iter()
                        .map(|group| merge(cells, group, simplify, scaling))
                        .collect()
                })
            };

            let first = cells.len();
            cells.extend(merged);
            current = (first..cells.len()).collect();
            level += 1;
            log::debug!(
                "Level {}: {} nodes{}",
                level,
                current.len(),
                if simplify { "" } else { " (not simplified)" }
            );
        }
        Ok(current[0])
    }

    /// Lay the cells out as node, patch and geometry tables
    fn assemble(&self, cells: &[Cell], root: usize) -> NexusDocument {
        let mut order = vec![root];
        let mut cursor = 0;
        while cursor < order.len() {
            order.extend(cells[order[cursor]].children.iter().copied());
            cursor += 1;
        }
        let mut node_of = vec![u32::MAX; cells.len()];
        for (node, &cell) in order.iter().enumerate() {
            node_of[cell] = node as u32;
        }
        let sink = order.len() as u32;

        let mut nodes = Vec::with_capacity(order.len() + 1);
        let mut patches = Vec::new();
        let mut geometry = Vec::with_capacity(order.len() + 1);

        for &cell_id in &order {
            let cell = &cells[cell_id];
            let targets: Vec<u32> = if cell.is_leaf() {
                vec![sink]
            } else {
                cell.children.iter().map(|&c| node_of[c]).collect()
            };

            // leaf triangles all go to the sink; inner triangles to the nearest child
            let mut keyed: Vec<(usize, u32, Triangle)> = cell
                .triangles
                .iter()
                .map(|t| {
                    let target = if cell.is_leaf() {
                        0
                    } else {
                        nearest_child(cells, &cell.children, t)
                    };
                    (target, self.patch_texture(t), *t)
                })
                .collect();
            keyed.sort_by_key(|(target, texture, _)| (*target, *texture));

            let first_patch = patches.len() as u32;
            let mut writer = GeometryWriter::new(self.components);
            let mut rest = keyed.as_slice();
            for (slot, &target) in targets.iter().enumerate() {
                let count = rest.iter().take_while(|(t, _, _)| *t == slot).count();
                let (bucket, tail) = rest.split_at(count);
                rest = tail;

                if bucket.is_empty() {
                    patches.push(Patch {
                        node: target,
                        triangle_offset: writer.primitives(),
                        texture: Patch::NO_TEXTURE,
                    });
                    continue;
                }
                for run in bucket.chunk_by(|a, b| a.1 == b.1) {
                    for (_, _, triangle) in run {
                        writer.push(triangle);
                    }
                    patches.push(Patch {
                        node: target,
                        triangle_offset: writer.primitives(),
                        texture: run[0].1,
                    });
                }
            }

            let node_geometry = writer.geometry;
            nodes.push(Node {
                first_patch,
                error: cell.error,
                sphere: cell.bounds.bounding_sphere(),
                nvert: node_geometry.positions.len() as u32,
                nface: if self.components.contains(AttributeMask::FACES) {
                    node_geometry.faces.len() as u32
                } else {
                    node_geometry.positions.len() as u32
                },
            });
            geometry.push(node_geometry);
        }

        nodes.push(Node {
            first_patch: patches.len() as u32,
            error: 0.0,
            sphere: Sphere::default(),
            nvert: 0,
            nface: 0,
        });
        geometry.push(NodeGeometry::default());

        let textures = if self.components.contains(AttributeMask::TEXTURES) {
            self.textures.clone()
        } else {
            Vec::new()
        };

        let mut header = Header::new(self.signature());
        header.n_nodes = nodes.len() as u32;
        header.n_patches = patches.len() as u32;
        header.n_textures = textures.len() as u32;
        header.n_vert = nodes.iter().map(|n| n.nvert as u64).sum();
        header.n_face = nodes.iter().map(|n| n.nface as u64).sum();
        header.sphere = cells[root].bounds.bounding_sphere();

        NexusDocument {
            header,
            nodes,
            patches,
            textures,
            geometry,
        }
    }
}

fn nearest_child(cells: &[Cell], children: &[usize], triangle: &Triangle) -> usize {
    let centroid = triangle.centroid();
    children
        .iter()
        .enumerate()
        .map(|(slot, &c)| (slot, cells[c].bounds.center().distance_squared(centroid)))
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(slot, _)| slot)
        .unwrap_or(0)
}

impl HierarchyBuilder for ReferenceBuilder {
    type Store = SoupStream;
    type Tree = KdTreeSoup;

    fn configure(&mut self, settings: &BuilderSettings) {
        let mut settings = settings.clone();
        if !(0.01..=0.99).contains(&settings.scaling) {
            log::warn!("Scaling {} out of range, clamping", settings.scaling);
            settings.scaling = settings.scaling.clamp(0.01, 0.99);
        }
        self.settings = settings;
    }

    fn init_atlas(&mut self, textures: &TextureSet) -> bool {
        self.textures.clear();
        if !self.components.contains(AttributeMask::TEXTURES) {
            return true;
        }

        let environment = nxs_platform::ensure_initialized();
        for texture in textures.iter() {
            if !texture.is_file() {
                log::error!("Missing texture {}", texture.display());
                return false;
            }
            if !environment.supports_image(texture) {
                log::error!("Unsupported texture format: {}", texture.display());
                return false;
            }
        }
        self.textures = textures.iter().map(Path::to_path_buf).collect();
        log::debug!("Texture atlas holds {} textures", self.textures.len());
        true
    }

    fn create(
        &mut self,
        tree: &mut KdTreeSoup,
        store: &mut SoupStream,
        top_node_size: u32,
    ) -> EngineResult<()> {
        let triangles = store.triangles()?;
        if triangles.is_empty() {
            return Err(EngineError::Failed(String::from("Source contains no geometry")));
        }
        tree.build(&triangles)?;

        let mut cells: Vec<Cell> = tree
            .blocks()
            .par_iter()
            .map(|block| {
                Cell::leaf(
                    block
                        .triangles
                        .iter()
                        .map(|&i| triangles[i as usize])
                        .collect(),
                )
            })
            .collect();
        log::info!("Building hierarchy over {} leaf blocks", cells.len());

        let root = self.build_levels(&mut cells, top_node_size)?;
        let document = self.assemble(&cells, root);
        log::info!(
            "Hierarchy: {} nodes, {} patches, {} vertices, {} faces",
            document.header.n_nodes,
            document.header.n_patches,
            document.header.n_vert,
            document.header.n_face
        );
        self.document = Some(document);
        Ok(())
    }

    fn save(&mut self, path: &Path) -> EngineResult<()> {
        let document = self
            .document
            .as_ref()
            .ok_or_else(|| EngineError::Failed(String::from("Hierarchy has not been created")))?;
        document.write(path)?;
        log::info!("Saved {}", path.display());
        Ok(())
    }
}
