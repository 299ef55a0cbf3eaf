//! # nxsbuild
//!
//! Command-line front end for building multiresolution containers.
//!
//! Options are read from an optional JSON file first; flags given on the
//! command line override individual fields. An output ending in `.nxz` is
//! compressed unless `--no-compression` is passed.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::Parser;

use nxs_build::build_with_options;
use nxs_core::BuildOptions;

/// Build a multiresolution container from a mesh or point cloud
#[derive(Parser, Debug)]
#[command(name = "nxsbuild")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Source model (Wavefront OBJ)
    pub input: PathBuf,

    /// Output container (.nxs, or .nxz for compressed); defaults to the input name with .nxs
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// JSON option file applied before the flags below
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Print the effective options as JSON and exit
    #[arg(long)]
    pub print_config: bool,

    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Faces per leaf node
    #[arg(short = 'f', long)]
    pub node_faces: Option<u32>,

    /// Faces in the top node
    #[arg(short = 't', long)]
    pub top_node_faces: Option<u32>,

    /// Vertex quantization step while loading (0 = off)
    #[arg(short = 'q', long)]
    pub vertex_quantization: Option<f32>,

    /// Simplification ratio between levels
    #[arg(short = 's', long)]
    pub scaling: Option<f32>,

    /// Levels built without simplification
    #[arg(long)]
    pub skip_levels: Option<u32>,

    /// Split plane blend between median (0) and midpoint (1)
    #[arg(short = 'a', long)]
    pub adaptive: Option<f32>,

    /// Memory budget in MB
    #[arg(short = 'r', long)]
    pub ram: Option<u64>,

    /// Worker threads (0 = all cores)
    #[arg(short = 'j', long)]
    pub threads: Option<usize>,

    /// Texel weight relative to triangles when partitioning
    #[arg(long)]
    pub texel_weight: Option<f32>,

    /// JPEG quality of node textures
    #[arg(long)]
    pub texture_quality: Option<u32>,

    /// Material library replacing the one named by the model
    #[arg(short = 'm', long)]
    pub mtl: Option<PathBuf>,

    /// Directory for temporary cache files
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,

    /// Build a point cloud (drop faces)
    #[arg(short = 'p', long)]
    pub point_cloud: bool,

    /// Store normals even if the source has none
    #[arg(short = 'N', long)]
    pub normals: bool,

    /// Drop normals
    #[arg(short = 'n', long)]
    pub no_normals: bool,

    /// Store colors even if the source has none
    #[arg(short = 'C', long)]
    pub colors: bool,

    /// Drop colors
    #[arg(short = 'c', long)]
    pub no_colors: bool,

    /// Drop texture coordinates and textures
    #[arg(short = 'u', long)]
    pub no_texcoords: bool,

    /// Reference the source textures instead of building node textures
    #[arg(long)]
    pub original_textures: bool,

    /// Resize node textures to powers of two
    #[arg(long)]
    pub pow2_textures: bool,

    /// Mark the output as deepzoom
    #[arg(long)]
    pub deepzoom: bool,

    /// Write .nxz outputs uncompressed
    #[arg(long)]
    pub no_compression: bool,

    /// Compression codec (corto or meco)
    #[arg(long)]
    pub codec: Option<String>,

    /// Explicit coordinate quantization step
    #[arg(long)]
    pub coord_step: Option<f32>,

    /// Position bits relative to the model radius
    #[arg(long)]
    pub position_bits: Option<u32>,

    /// Fraction of the node error used as quantization step
    #[arg(short = 'e', long)]
    pub error_q: Option<f32>,

    #[arg(long)]
    pub luma_bits: Option<u8>,

    #[arg(long)]
    pub chroma_bits: Option<u8>,

    #[arg(long)]
    pub alpha_bits: Option<u8>,

    #[arg(long)]
    pub normal_bits: Option<u8>,

    /// Texture coordinate step in texels
    #[arg(long)]
    pub tex_step: Option<f32>,
}

fn set<T>(field: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *field = value;
    }
}

impl Cli {
    /// Output path, defaulting to the input with an `.nxs` extension
    pub fn output_path(&self) -> PathBuf {
        self.output
            .clone()
            .unwrap_or_else(|| self.input.with_extension("nxs"))
    }

    /// Options from the config file (or defaults) with flags applied
    pub fn build_options(&self) -> Result<BuildOptions> {
        let mut options = match &self.config {
            Some(path) => BuildOptions::from_json_file(path)
                .with_context(|| format!("Failed to read options from {}", path.display()))?,
            None => BuildOptions::default(),
        };
        self.apply(&mut options);
        Ok(options)
    }

    fn apply(&self, options: &mut BuildOptions) {
        let hierarchy = &mut options.hierarchy;
        set(&mut hierarchy.node_faces, self.node_faces);
        set(&mut hierarchy.top_node_faces, self.top_node_faces);
        set(&mut hierarchy.vertex_quantization, self.vertex_quantization);
        set(&mut hierarchy.scaling, self.scaling);
        set(&mut hierarchy.skip_levels, self.skip_levels);
        set(&mut hierarchy.adaptive, self.adaptive);
        set(&mut hierarchy.ram_buffer_mb, self.ram);
        set(&mut hierarchy.n_threads, self.threads);
        set(&mut hierarchy.texel_weight, self.texel_weight);
        set(&mut hierarchy.texture_quality, self.texture_quality);
        if self.mtl.is_some() {
            hierarchy.material_library = self.mtl.clone();
        }
        if self.cache_dir.is_some() {
            hierarchy.cache_dir = self.cache_dir.clone();
        }

        let attributes = &mut options.attributes;
        attributes.point_cloud |= self.point_cloud;
        attributes.force_normals |= self.normals;
        attributes.disable_normals |= self.no_normals;
        attributes.force_colors |= self.colors;
        attributes.disable_colors |= self.no_colors;
        attributes.disable_texcoords |= self.no_texcoords;
        attributes.use_original_textures |= self.original_textures;
        attributes.create_pow_two_textures |= self.pow2_textures;
        attributes.deepzoom |= self.deepzoom;

        let compression = &mut options.compression;
        if self.no_compression {
            compression.enable_compression = false;
        }
        set(&mut compression.compress_lib, self.codec.clone());
        set(&mut compression.coord_step, self.coord_step);
        set(&mut compression.position_bits, self.position_bits);
        set(&mut compression.error_q, self.error_q);
        set(&mut compression.luma_bits, self.luma_bits);
        set(&mut compression.chroma_bits, self.chroma_bits);
        set(&mut compression.alpha_bits, self.alpha_bits);
        set(&mut compression.normal_bits, self.normal_bits);
        set(&mut compression.tex_step, self.tex_step);
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose { "debug" } else { "info" };
    // a second init (tests) is harmless
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter))
        .try_init();
}

fn display(path: &Path) -> String {
    path.display().to_string()
}

/// Execute the CLI command
pub fn execute(cli: Cli) -> Result<()> {
    init_logging(cli.verbose);

    let options = cli.build_options()?;
    if cli.print_config {
        println!("{}", options.to_json()?);
        return Ok(());
    }

    let output = cli.output_path();
    log::info!("Building {} -> {}", display(&cli.input), display(&output));

    let report = match build_with_options(&cli.input, &output, &options) {
        Ok(report) => report,
        Err(e) => bail!("Build failed ({:?}): {}", e.status(), e),
    };

    log::info!("  Components: {}", report.components.describe());
    if let (Some(codec), Some(plan)) = (report.codec, report.quantization) {
        log::info!("  Codec: {} (coordinate step {})", codec, plan.coord_step);
    }
    log::info!("Build complete in {:.2}s", report.elapsed_seconds);
    Ok(())
}
