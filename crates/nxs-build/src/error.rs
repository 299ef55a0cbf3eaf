//! Build errors and result codes

use thiserror::Error;

use crate::engine::EngineError;

/// Result code reported to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuildStatus {
    /// The output was written
    Success = 0,
    /// Generic build failure (configuration or engine fault)
    Exception = 1,
    /// Missing or nonexistent paths; nothing was touched
    InvalidInput = 2,
}

/// Why a build stopped
#[derive(Error, Debug)]
pub enum BuildError {
    /// Bad paths, detected before any resource is acquired
    #[error("{0}")]
    InvalidInput(String),

    /// Unusable configuration discovered mid-build
    #[error("{0}")]
    Configuration(String),

    /// Fault raised by the engine, including panics
    #[error("{0}")]
    Engine(String),
}

impl BuildError {
    /// Result code for this error
    pub fn status(&self) -> BuildStatus {
        match self {
            Self::InvalidInput(_) => BuildStatus::InvalidInput,
            Self::Configuration(_) | Self::Engine(_) => BuildStatus::Exception,
        }
    }
}

impl From<EngineError> for BuildError {
    fn from(error: EngineError) -> Self {
        Self::Engine(error.to_string())
    }
}

/// Result type for builds
pub type BuildResult<T> = Result<T, BuildError>;
