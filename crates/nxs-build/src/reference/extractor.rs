//! Lossy geometry codec
//!
//! Re-encodes an opened `.nxs` container: positions snap to a power of two
//! grid (per node when adaptive quantization is on), normals and colors are
//! reduced to their bit budgets and texture coordinates to a texel fraction.

use std::path::Path;

use glam::Vec3;

use nxs_core::{AttributeMask, Node, QuantizationPlan, Signature};

use super::container::{CompressedDocument, NexusFile, NodeGeometry, PackedNode};
use crate::engine::{CodecExtractor, CompressedContainer, EngineError, EngineResult};

/// Texture size the texture step is expressed against
const REFERENCE_TEXTURE_SIZE: f32 = 1024.0;

/// Grid exponent for one node: the global one, coarsened to the node error
/// when adaptive quantization is on.
pub fn node_coord_q(plan: &QuantizationPlan, node: &Node) -> i32 {
    if plan.error_factor > 0.0 && node.error > 0.0 {
        let adaptive = (plan.error_factor * node.error / 2.0).log2().floor() as i32;
        adaptive.max(plan.coord_q)
    } else {
        plan.coord_q
    }
}

fn quantize(value: f32, step: f32) -> i32 {
    (value / step).round().clamp(i32::MIN as f32, i32::MAX as f32) as i32
}

fn quantize_normal(normal: Vec3, bits: u8) -> [i32; 3] {
    let scale = ((1i64 << (bits.clamp(2, 16) - 1)) - 1) as f32;
    let n = normal.normalize_or_zero() * scale;
    [n.x.round() as i32, n.y.round() as i32, n.z.round() as i32]
}

fn quantize_color(color: [u8; 4], bits: [u8; 4]) -> [u8; 4] {
    let mut packed = [0u8; 4];
    for ((out, channel), bits) in packed.iter_mut().zip(color).zip(bits) {
        *out = match bits.min(8) {
            0 => 0,
            b => channel >> (8 - b),
        };
    }
    packed
}

/// Quantize one node's geometry
pub fn pack_node(
    geometry: &NodeGeometry,
    node: &Node,
    plan: &QuantizationPlan,
    components: AttributeMask,
) -> PackedNode {
    let coord_q = node_coord_q(plan, node);
    let step = (coord_q as f32).exp2();
    let uv_step = if plan.tex_step > 0.0 {
        plan.tex_step / REFERENCE_TEXTURE_SIZE
    } else {
        1.0 / REFERENCE_TEXTURE_SIZE
    };

    let mut packed = PackedNode {
        coord_q,
        positions: geometry
            .positions
            .iter()
            .map(|p| [quantize(p.x, step), quantize(p.y, step), quantize(p.z, step)])
            .collect(),
        ..Default::default()
    };
    if components.contains(AttributeMask::NORMALS) {
        packed.normals = geometry
            .normals
            .iter()
            .map(|n| quantize_normal(*n, plan.norm_bits))
            .collect();
    }
    if components.contains(AttributeMask::COLORS) {
        packed.colors = geometry
            .colors
            .iter()
            .map(|c| quantize_color(*c, plan.color_bits))
            .collect();
    }
    if components.contains(AttributeMask::TEXTURES) {
        packed.uvs = geometry
            .uvs
            .iter()
            .map(|uv| [quantize(uv[0], uv_step), quantize(uv[1], uv_step)])
            .collect();
    }
    if components.contains(AttributeMask::FACES) {
        packed.faces = geometry.faces.clone();
    }
    packed
}

/// Codec bound to one open container
#[derive(Debug)]
pub struct ReferenceExtractor<'a> {
    container: &'a NexusFile,
    plan: Option<QuantizationPlan>,
}

impl<'a> ReferenceExtractor<'a> {
    pub fn new(container: &'a NexusFile) -> Self {
        Self {
            container,
            plan: None,
        }
    }

    pub fn plan(&self) -> Option<&QuantizationPlan> {
        self.plan.as_ref()
    }
}

impl CodecExtractor for ReferenceExtractor<'_> {
    fn configure(&mut self, plan: &QuantizationPlan) {
        self.plan = Some(*plan);
    }

    fn save(&mut self, path: &Path, signature: Signature) -> EngineResult<()> {
        let plan = self
            .plan
            .ok_or_else(|| EngineError::Failed(String::from("Codec has not been configured")))?;
        if !signature.is_compressed() {
            return Err(EngineError::Failed(String::from("Signature names no codec")));
        }

        let source = self.container.document();
        let geometry = source
            .geometry
            .iter()
            .zip(&source.nodes)
            .map(|(geometry, node)| pack_node(geometry, node, &plan, signature.components))
            .collect();

        let mut header = *self.container.header();
        header.signature = signature;
        let document = CompressedDocument {
            header,
            nodes: source.nodes.clone(),
            patches: source.patches.clone(),
            textures: source.textures.clone(),
            plan,
            geometry,
        };
        document.write(path)?;

        log::info!(
            "Compressed {} nodes with {} (step {})",
            document.nodes.len(),
            signature.codec().map(|c| c.name()).unwrap_or("none"),
            plan.coord_step
        );
        Ok(())
    }
}
