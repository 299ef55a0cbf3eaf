//! # nxs Core
//!
//! Data model and pure policy for building multiresolution mesh containers.
//!
//! This crate holds everything the build pipeline decides without touching
//! the engine:
//! - **Options**: the fully defaulted build/compression option set
//! - **Components**: attribute mask and the negotiation rules
//! - **Signature**: container format flags and codec selection
//! - **Hierarchy**: node, patch and header records read from containers
//! - **Quantization**: coordinate step resolution for compressed output

pub mod components;
pub mod hierarchy;
pub mod math;
pub mod options;
pub mod quantization;
pub mod signature;

pub use components::{negotiate, AttributeMask, SourceCapabilities};
pub use hierarchy::{Header, Node, Patch};
pub use math::{Aabb, Sphere, Vec3};
pub use options::{AttributeOptions, BuildOptions, CompressionOptions, HierarchyOptions};
pub use quantization::{resolve, QuantizationMode, QuantizationPlan};
pub use signature::{Codec, Signature, SignatureFlags};

use thiserror::Error;

/// Core errors
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Unknown compression method: {0}")]
    UnknownCodec(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid option file: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for core operations
pub type CoreResult<T> = Result<T, CoreError>;
