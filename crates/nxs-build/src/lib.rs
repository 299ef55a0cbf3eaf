//! # nxs Build
//!
//! Turns a source mesh or point cloud into a multiresolution container.
//!
//! ## Features
//! - Staged build pipeline with scoped cleanup of every intermediate file
//! - Engine traits for ingestion, partitioning, hierarchy building and codecs
//! - Reference engine reading Wavefront OBJ and writing `.nxs` / `.nxz`
//! - Result codes for callers that cannot consume Rust errors

pub mod engine;
pub mod error;
pub mod pipeline;
pub mod reference;

pub use engine::{Engine, EngineError, EngineResult, TextureSet};
pub use error::{BuildError, BuildResult, BuildStatus};
pub use pipeline::{BuildOutcome, BuildPipeline, BuildReport, Stage};
pub use reference::ReferenceEngine;

use std::path::Path;

use nxs_core::BuildOptions;

/// Build with default options and the reference engine
pub fn build(input: impl AsRef<Path>, output: impl AsRef<Path>) -> BuildResult<BuildReport> {
    build_with_options(input, output, &BuildOptions::default())
}

/// Build with explicit options and the reference engine
pub fn build_with_options(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    options: &BuildOptions,
) -> BuildResult<BuildReport> {
    BuildPipeline::new(ReferenceEngine, options.clone()).run(input.as_ref(), output.as_ref())
}
