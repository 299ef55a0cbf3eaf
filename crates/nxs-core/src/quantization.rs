//! Quantization parameter resolution
//!
//! Derives the coordinate quantization step for the codec from, in priority
//! order, an explicit step, a position bit budget, or the per-node error of
//! the built hierarchy. Exactly one source decides; they are never mixed.

use serde::{Deserialize, Serialize};

use crate::hierarchy::{Node, Patch};
use crate::options::CompressionOptions;

/// Which rule produced the coordinate step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuantizationMode {
    /// `coord_step` given explicitly
    Explicit,
    /// Sphere radius divided by `2^position_bits`
    PositionBits,
    /// Fraction of the finest node error
    ErrorQuantile,
    /// Nothing usable; unit step
    Fallback,
}

/// Everything the codec needs to quantize a container
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuantizationPlan {
    /// Rule that decided `coord_step`
    pub mode: QuantizationMode,
    /// Coordinate quantization step, always > 0
    pub coord_step: f32,
    /// Per-node error scaling for adaptive quantization (0 = uniform)
    pub error_factor: f32,
    /// `floor(log2(coord_step))`
    pub coord_q: i32,
    /// Normal bits
    pub norm_bits: u8,
    /// Luma, chroma, chroma, alpha bits
    pub color_bits: [u8; 4],
    /// Texture coordinate step in texels
    pub tex_step: f32,
}

/// Resolve the quantization plan for a built hierarchy.
///
/// `nodes` and `patches` are the container tables and `sink` the index of
/// the terminator node. They are only read when the error quantile rule is
/// reached.
pub fn resolve(
    options: &CompressionOptions,
    radius: f32,
    nodes: &[Node],
    patches: &[Patch],
    sink: u32,
) -> QuantizationPlan {
    let mut coord_step = options.coord_step;
    let mut error_factor = 0.0;
    let mut mode = QuantizationMode::Explicit;

    if coord_step > 0.0 {
        // explicit step wins
    } else if options.position_bits > 0 {
        coord_step = radius / 2.0f32.powi(options.position_bits.min(i32::MAX as u32) as i32);
        mode = QuantizationMode::PositionBits;
    } else if options.error_q > 0.0 {
        coord_step = finest_sink_error_step(options.error_q, nodes, patches, sink);
        error_factor = options.error_q;
        mode = QuantizationMode::ErrorQuantile;
    }

    // NaN falls back too
    if !(coord_step > 0.0) {
        coord_step = 1.0;
        error_factor = 0.0;
        mode = QuantizationMode::Fallback;
    }

    QuantizationPlan {
        mode,
        coord_step,
        error_factor,
        coord_q: coord_step.log2().floor() as i32,
        norm_bits: options.normal_bits,
        color_bits: [
            options.luma_bits,
            options.chroma_bits,
            options.chroma_bits,
            options.alpha_bits,
        ],
        tex_step: options.tex_step,
    }
}

/// Smallest positive `error_q * error / 2` among the nodes whose first patch
/// feeds the sink, seeded with the root node.
///
/// When no node feeds the sink the seed is returned unchanged.
fn finest_sink_error_step(error_q: f32, nodes: &[Node], patches: &[Patch], sink: u32) -> f32 {
    let mut step = error_q * nodes.first().map(|n| n.error).unwrap_or(0.0) / 2.0;

    for node in nodes.iter().take(sink as usize) {
        let Some(patch) = patches.get(node.first_patch as usize) else {
            continue;
        };
        if patch.node != sink {
            continue;
        }
        let candidate = error_q as f64 * node.error as f64 / 2.0;
        if candidate < step as f64 && candidate > 0.0 {
            step = candidate as f32;
        }
    }

    step
}
