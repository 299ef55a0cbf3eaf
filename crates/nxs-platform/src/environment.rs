//! Process Environment
//!
//! One-time bootstrap of the services the engine relies on, chiefly image
//! codec plugin discovery for texture loading. Safe to call from any number
//! of concurrent builds: the discovery runs exactly once per process.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::OnceLock;

use crate::Platform;

/// Search path variable listing extra plugin directories
pub const PLUGIN_PATH_VAR: &str = "NXS_PLUGIN_PATH";

/// Image formats decoded without any plugin
pub const BUILTIN_IMAGE_FORMATS: &[&str] = &["png", "jpg", "jpeg", "bmp", "tga", "tif", "tiff"];

static ENVIRONMENT: OnceLock<Environment> = OnceLock::new();
static INITIALIZATIONS: AtomicUsize = AtomicUsize::new(0);

/// Services discovered at bootstrap
#[derive(Debug, Clone)]
pub struct Environment {
    platform: Platform,
    plugin_paths: Vec<PathBuf>,
    image_formats: BTreeSet<String>,
}

impl Environment {
    /// Probe the executable directory and the plugin search path
    fn discover() -> Self {
        let mut plugin_paths = Vec::new();

        let exe_plugins = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(|dir| dir.join("plugins")));
        if let Some(dir) = exe_plugins {
            if dir.is_dir() {
                plugin_paths.push(dir);
            }
        }

        if let Some(search_path) = std::env::var_os(PLUGIN_PATH_VAR) {
            for dir in std::env::split_paths(&search_path) {
                if dir.is_dir() && !plugin_paths.contains(&dir) {
                    plugin_paths.push(dir);
                }
            }
        }

        Self::with_plugin_paths(plugin_paths)
    }

    /// Build an environment from explicit plugin directories.
    ///
    /// Each file under `<dir>/imageformats/` adds the format named by its
    /// stem (`libwebp.so` and `webp.dll` both add `webp`).
    pub fn with_plugin_paths(plugin_paths: Vec<PathBuf>) -> Self {
        let mut image_formats: BTreeSet<String> =
            BUILTIN_IMAGE_FORMATS.iter().map(|f| f.to_string()).collect();

        for dir in &plugin_paths {
            let Ok(entries) = std::fs::read_dir(dir.join("imageformats")) else {
                continue;
            };
            for entry in entries.flatten() {
                let path = entry.path();
                if !path.is_file() {
                    continue;
                }
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    let stem = stem.to_lowercase();
                    let format = stem.strip_prefix("lib").unwrap_or(&stem);
                    if !format.is_empty() {
                        image_formats.insert(format.to_string());
                    }
                }
            }
        }

        Self {
            platform: Platform::current(),
            plugin_paths,
            image_formats,
        }
    }

    /// Platform the process runs on
    pub fn platform(&self) -> Platform {
        self.platform
    }

    /// Plugin directories found at bootstrap
    pub fn plugin_paths(&self) -> &[PathBuf] {
        &self.plugin_paths
    }

    /// Supported image format extensions, sorted
    pub fn image_formats(&self) -> impl Iterator<Item = &str> {
        self.image_formats.iter().map(String::as_str)
    }

    /// Whether an image file can be decoded, judged by its extension
    pub fn supports_image(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| self.image_formats.contains(&ext.to_lowercase()))
            .unwrap_or(false)
    }
}

/// Bootstrap the process environment, once.
///
/// Every call returns the same instance; concurrent first calls block until
/// the single initialization finishes.
pub fn ensure_initialized() -> &'static Environment {
    ENVIRONMENT.get_or_init(|| {
        INITIALIZATIONS.fetch_add(1, Ordering::SeqCst);
        let environment = Environment::discover();
        log::debug!(
            "Environment initialized on {} ({} plugin dirs, formats: {})",
            environment.platform.name(),
            environment.plugin_paths.len(),
            environment.image_formats().collect::<Vec<_>>().join(" ")
        );
        environment
    })
}

/// How many times the bootstrap body has run in this process
pub fn initialization_count() -> usize {
    INITIALIZATIONS.load(Ordering::SeqCst)
}
