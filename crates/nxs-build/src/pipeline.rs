//! Build Pipeline
//!
//! Drives one build through its stages:
//!
//! Validate → InitEnvironment → LoadSource → Negotiate → InitAtlas →
//! BuildHierarchy → SaveUncompressed → [Compress] → Done
//!
//! Every resource a stage acquires (cache files, the temporary container,
//! the partially written output) is owned by a value that cleans it up when
//! dropped, so failures at any stage leave nothing behind. Panics raised by
//! the engine are converted into [`BuildError::Engine`].

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::time::Instant;

use nxs_core::{
    negotiate, quantization, AttributeMask, BuildOptions, Codec, QuantizationPlan,
    SourceCapabilities,
};
use nxs_platform::filesystem::{has_extension, with_suffix};
use nxs_platform::{
    cache_base_name, ensure_initialized, hardware_threads, NumericLocaleGuard, OutputGuard,
    TempFileGuard,
};

use crate::engine::{
    BuilderSettings, CodecExtractor, CompressedContainer, Engine, HierarchyBuilder,
    IngestionStore, PartitionTree,
};
use crate::error::{BuildError, BuildResult, BuildStatus};

/// Extension that requests compressed output
pub const COMPRESSED_EXTENSION: &str = "nxz";

/// Suffix of the uncompressed container written before compression
pub const TEMP_SUFFIX: &str = ".tmp.nxs";

/// Pipeline stages, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Validate,
    InitEnvironment,
    LoadSource,
    Negotiate,
    InitAtlas,
    BuildHierarchy,
    SaveUncompressed,
    Compress,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Validate => "validate",
            Stage::InitEnvironment => "init-environment",
            Stage::LoadSource => "load-source",
            Stage::Negotiate => "negotiate",
            Stage::InitAtlas => "init-atlas",
            Stage::BuildHierarchy => "build-hierarchy",
            Stage::SaveUncompressed => "save-uncompressed",
            Stage::Compress => "compress",
            Stage::Done => "done",
        };
        f.write_str(name)
    }
}

/// Summary of a successful build
#[derive(Debug, Clone, PartialEq)]
pub struct BuildReport {
    /// Final output path
    pub output: PathBuf,
    /// What the source provided
    pub source: SourceCapabilities,
    /// Channels stored in the output
    pub components: AttributeMask,
    /// Whether the output was compressed
    pub compressed: bool,
    /// Codec used, when compressed
    pub codec: Option<Codec>,
    /// Quantization parameters, when compressed
    pub quantization: Option<QuantizationPlan>,
    /// Wall clock duration
    pub elapsed_seconds: f64,
}

/// Result code plus optional error message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOutcome {
    pub status: BuildStatus,
    pub message: Option<String>,
}

impl BuildOutcome {
    pub fn is_success(&self) -> bool {
        self.status == BuildStatus::Success
    }
}

impl From<BuildResult<BuildReport>> for BuildOutcome {
    fn from(result: BuildResult<BuildReport>) -> Self {
        match result {
            Ok(_) => Self {
                status: BuildStatus::Success,
                message: None,
            },
            Err(e) => Self {
                status: e.status(),
                message: Some(e.to_string()),
            },
        }
    }
}

/// Reject empty paths and missing inputs
fn validate(input: &Path, output: &Path) -> BuildResult<()> {
    if input.as_os_str().is_empty() || output.as_os_str().is_empty() {
        return Err(BuildError::InvalidInput(String::from(
            "Input and output paths must not be empty",
        )));
    }
    if !input.exists() {
        return Err(BuildError::InvalidInput(format!(
            "Input file does not exist: {}",
            input.display()
        )));
    }
    Ok(())
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("Panic during build: {}", message)
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("Panic during build: {}", message)
    } else {
        String::from("Unknown panic during build")
    }
}

/// A build configured with options and bound to an engine
pub struct BuildPipeline<E: Engine> {
    engine: E,
    options: BuildOptions,
}

impl<E: Engine> BuildPipeline<E> {
    pub fn new(engine: E, options: BuildOptions) -> Self {
        Self { engine, options }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn options(&self) -> &BuildOptions {
        &self.options
    }

    /// Build `input` into `output`
    pub fn run(&self, input: &Path, output: &Path) -> BuildResult<BuildReport> {
        log::debug!("Stage: {}", Stage::Validate);
        validate(input, output)?;

        let started = Instant::now();
        let result = panic::catch_unwind(AssertUnwindSafe(|| self.run_stages(input, output)))
            .unwrap_or_else(|payload| Err(BuildError::Engine(panic_message(payload))));

        match result {
            Ok(mut report) => {
                report.elapsed_seconds = started.elapsed().as_secs_f64();
                log::info!(
                    "Built {} in {:.2}s",
                    report.output.display(),
                    report.elapsed_seconds
                );
                Ok(report)
            }
            Err(e) => {
                log::error!("Fatal error: {}", e);
                Err(e)
            }
        }
    }

    /// Build and report a result code instead of an error
    pub fn execute(&self, input: &Path, output: &Path) -> BuildOutcome {
        self.run(input, output).into()
    }

    fn run_stages(&self, input: &Path, output: &Path) -> BuildResult<BuildReport> {
        let hierarchy = &self.options.hierarchy;

        log::debug!("Stage: {}", Stage::InitEnvironment);
        let environment = ensure_initialized();
        let _locale = NumericLocaleGuard::acquire();
        log::debug!(
            "Image formats: {}",
            environment.image_formats().collect::<Vec<_>>().join(" ")
        );

        let compress = has_extension(output, COMPRESSED_EXTENSION)
            && self.options.compression.enable_compression;

        // scoped so the store and tree cache files go before compression
        let (source, components, temp) = {
            log::debug!("Stage: {}", Stage::LoadSource);
            let cache_base = cache_base_name(hierarchy.cache_dir.as_deref());
            let mut store = self.engine.create_store(&cache_base)?;
            store.set_vertex_quantization(hierarchy.vertex_quantization);
            store.set_max_memory(hierarchy.stream_memory_bytes());
            store.load(&[input.to_path_buf()], hierarchy.material_library.as_deref())?;

            let source = SourceCapabilities {
                has_normals: store.has_normals(),
                has_colors: store.has_colors(),
                has_textures: store.has_textures(),
            };
            log::info!(
                "Source: normals {}, colors {}, textures {}",
                source.has_normals,
                source.has_colors,
                source.has_textures
            );

            log::debug!("Stage: {}", Stage::Negotiate);
            let components = negotiate(&self.options.attributes, source);
            log::info!("Components: {}", components.describe());
            if !components.contains(AttributeMask::TEXTURES) {
                store.textures_mut().clear();
            }

            log::debug!("Stage: {}", Stage::InitAtlas);
            let mut builder = self.engine.create_builder(components);
            builder.configure(&BuilderSettings::from_options(&self.options, hardware_threads()));
            if !builder.init_atlas(store.textures()) {
                return Err(BuildError::Configuration(String::from(
                    "Failed to initialize texture atlas",
                )));
            }

            log::debug!("Stage: {}", Stage::BuildHierarchy);
            let mut tree = self.engine.create_tree(&cache_base, hierarchy.adaptive)?;
            tree.set_max_memory(hierarchy.tree_memory_bytes());
            tree.set_max_weight(hierarchy.node_faces);
            tree.set_texel_weight(hierarchy.texel_weight);
            tree.set_triangles_per_block(hierarchy.node_faces);
            builder.create(&mut tree, &mut store, hierarchy.top_node_faces)?;

            log::debug!("Stage: {}", Stage::SaveUncompressed);
            if compress {
                let temp = TempFileGuard::new(with_suffix(output, TEMP_SUFFIX));
                builder.save(temp.path())?;
                (source, components, Some(temp))
            } else {
                builder.save(output)?;
                (source, components, None)
            }
        };

        let mut report = BuildReport {
            output: output.to_path_buf(),
            source,
            components,
            compressed: false,
            codec: None,
            quantization: None,
            elapsed_seconds: 0.0,
        };

        if let Some(temp) = temp {
            log::debug!("Stage: {}", Stage::Compress);
            let (codec, plan) = self.compress(temp.path(), output)?;
            report.compressed = true;
            report.codec = Some(codec);
            report.quantization = Some(plan);
        }

        log::debug!("Stage: {}", Stage::Done);
        Ok(report)
    }

    /// Re-encode the temporary container at `temp` into `output`
    fn compress(&self, temp: &Path, output: &Path) -> BuildResult<(Codec, QuantizationPlan)> {
        let options = &self.options.compression;

        let container = self.engine.open_container(temp).map_err(|e| {
            BuildError::Engine(format!("Could not open file: {}: {}", temp.display(), e))
        })?;
        let codec: Codec = options
            .codec()
            .map_err(|e| BuildError::Configuration(e.to_string()))?;

        let header = container.header();
        let signature = header.signature.with_codec(codec);
        let plan = quantization::resolve(
            options,
            header.sphere.radius,
            container.nodes(),
            container.patches(),
            header.sink(),
        );
        log::info!(
            "Compressing with {}: step {} ({:?}), error factor {}",
            codec,
            plan.coord_step,
            plan.mode,
            plan.error_factor
        );

        let guard = OutputGuard::new(output);
        let mut extractor = self.engine.create_extractor(&container);
        extractor.configure(&plan);
        extractor.save(output, signature)?;
        drop(extractor);
        guard.commit();

        Ok((codec, plan))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("model.obj");
        std::fs::write(&input, "v 0 0 0\n").unwrap();

        assert!(validate(&input, &dir.path().join("out.nxs")).is_ok());
        assert!(matches!(
            validate(Path::new(""), Path::new("out.nxs")),
            Err(BuildError::InvalidInput(_))
        ));
        assert!(matches!(validate(&input, Path::new("")), Err(BuildError::InvalidInput(_))));
        assert!(matches!(
            validate(&dir.path().join("missing.obj"), Path::new("out.nxs")),
            Err(BuildError::InvalidInput(message)) if message.contains("missing.obj")
        ));
    }

    #[test]
    fn test_panic_message() {
        let payload = panic::catch_unwind(|| -> u32 { panic!("codec exploded") }).unwrap_err();
        assert_eq!(panic_message(payload), "Panic during build: codec exploded");

        let payload = panic::catch_unwind(|| -> u32 { panic::panic_any(42u32) }).unwrap_err();
        assert_eq!(panic_message(payload), "Unknown panic during build");
    }

    #[test]
    fn test_outcome_from_result() {
        let result: BuildResult<BuildReport> = Err(BuildError::Configuration(String::from("bad")));
        let failed = BuildOutcome::from(result);
        assert_eq!(failed.status, BuildStatus::Exception);
        assert_eq!(failed.message.as_deref(), Some("bad"));
        assert!(!failed.is_success());
    }

    #[test]
    fn test_stage_names() {
        assert_eq!(Stage::SaveUncompressed.to_string(), "save-uncompressed");
        assert_eq!(Stage::Done.to_string(), "done");
    }
}
