//! # nxs Platform
//!
//! Process and filesystem services for the nxs build pipeline.
//!
//! This crate provides:
//! - **Environment**: one-time, thread-safe bootstrap of image codec plugins
//! - **Locale**: scoped, locale-independent numeric formatting
//! - **FileSystem**: temp/output file guards, cache names, atomic writes
//! - **Threading**: hardware concurrency hint

pub mod environment;
pub mod filesystem;
pub mod locale;
pub mod threading;

pub use environment::{ensure_initialized, Environment};
pub use filesystem::{cache_base_name, write_atomically, OutputGuard, TempFileGuard};
pub use locale::{with_numeric_locale, NumericLocaleGuard};
pub use threading::hardware_threads;

use thiserror::Error;

/// Platform-specific errors
#[derive(Error, Debug)]
pub enum PlatformError {
    #[error("File I/O error: {0}")]
    FileIO(#[from] std::io::Error),
}

/// Result type for platform operations
pub type PlatformResult<T> = Result<T, PlatformError>;

/// Platform identification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    Windows,
    Linux,
    MacOs,
    Unknown,
}

impl Platform {
    /// Get the current platform
    pub fn current() -> Self {
        #[cfg(target_os = "windows")]
        return Platform::Windows;

        #[cfg(target_os = "linux")]
        return Platform::Linux;

        #[cfg(target_os = "macos")]
        return Platform::MacOs;

        #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
        return Platform::Unknown;
    }

    /// Lowercase platform name
    pub fn name(&self) -> &'static str {
        match self {
            Platform::Windows => "windows",
            Platform::Linux => "linux",
            Platform::MacOs => "macos",
            Platform::Unknown => "unknown",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_detection() {
        let platform = Platform::current();
        assert!(matches!(
            platform,
            Platform::Windows | Platform::Linux | Platform::MacOs | Platform::Unknown
        ));
        assert!(!platform.name().is_empty());
    }
}
