//! What the engine sees between stages

mod common;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use common::{grid_obj, Workspace};
use nxs_build::engine::{BuilderSettings, HierarchyBuilder, IngestionStore, TextureSet};
use nxs_build::pipeline::TEMP_SUFFIX;
use nxs_build::reference::{KdTreeSoup, NexusFile, ReferenceBuilder, ReferenceExtractor, SoupStream};
use nxs_build::{BuildPipeline, Engine, EngineResult, ReferenceEngine};
use nxs_core::{AttributeMask, BuildOptions};

#[derive(Debug, Default)]
struct Observed {
    atlas_textures: Option<usize>,
    store_textures: Option<usize>,
    opened: Option<(PathBuf, bool)>,
}

/// Reference engine that records what the pipeline hands it
#[derive(Default)]
struct RecordingEngine {
    inner: ReferenceEngine,
    observed: Arc<Mutex<Observed>>,
}

struct RecordingBuilder {
    inner: ReferenceBuilder,
    observed: Arc<Mutex<Observed>>,
}

impl HierarchyBuilder for RecordingBuilder {
    type Store = SoupStream;
    type Tree = KdTreeSoup;

    fn configure(&mut self, settings: &BuilderSettings) {
        self.inner.configure(settings);
    }

    fn init_atlas(&mut self, textures: &TextureSet) -> bool {
        self.observed.lock().unwrap().atlas_textures = Some(textures.len());
        self.inner.init_atlas(textures)
    }

    fn create(
        &mut self,
        tree: &mut KdTreeSoup,
        store: &mut SoupStream,
        top_node_size: u32,
    ) -> EngineResult<()> {
        self.observed.lock().unwrap().store_textures = Some(store.textures().len());
        self.inner.create(tree, store, top_node_size)
    }

    fn save(&mut self, path: &Path) -> EngineResult<()> {
        self.inner.save(path)
    }
}

impl Engine for RecordingEngine {
    type Store = SoupStream;
    type Tree = KdTreeSoup;
    type Builder = RecordingBuilder;
    type Container = NexusFile;
    type Extractor<'a> = ReferenceExtractor<'a>;

    fn create_store(&self, cache_base: &Path) -> EngineResult<SoupStream> {
        self.inner.create_store(cache_base)
    }

    fn create_tree(&self, cache_base: &Path, adaptive: f32) -> EngineResult<KdTreeSoup> {
        self.inner.create_tree(cache_base, adaptive)
    }

    fn create_builder(&self, components: AttributeMask) -> RecordingBuilder {
        RecordingBuilder {
            inner: self.inner.create_builder(components),
            observed: Arc::clone(&self.observed),
        }
    }

    fn open_container(&self, path: &Path) -> EngineResult<NexusFile> {
        self.observed.lock().unwrap().opened = Some((path.to_path_buf(), path.exists()));
        self.inner.open_container(path)
    }

    fn create_extractor<'a>(&'a self, container: &'a NexusFile) -> ReferenceExtractor<'a> {
        self.inner.create_extractor(container)
    }
}

fn textured_workspace() -> (Workspace, PathBuf) {
    let ws = Workspace::new();
    ws.write("grid.mtl", "newmtl checker\nmap_Kd checker.png\n");
    ws.write("checker.png", "not really a png");
    let input = ws.write("grid.obj", &grid_obj(8, Some("checker")));
    (ws, input)
}

fn run(options: BuildOptions, input: &Path, output: &Path) -> Observed {
    let engine = RecordingEngine::default();
    let observed = Arc::clone(&engine.observed);
    BuildPipeline::new(engine, options).run(input, output).unwrap();
    let mut observed = observed.lock().unwrap();
    std::mem::take(&mut *observed)
}

#[test]
fn test_store_textures_cleared_when_excluded() {
    let (ws, input) = textured_workspace();
    let mut options = ws.options();
    options.attributes.disable_texcoords = true;

    let observed = run(options, &input, &ws.output("plain.nxs"));
    assert_eq!(observed.atlas_textures, Some(0));
    assert_eq!(observed.store_textures, Some(0));
}

#[test]
fn test_store_textures_kept_when_included() {
    let (ws, input) = textured_workspace();

    let observed = run(ws.options(), &input, &ws.output("textured.nxs"));
    assert_eq!(observed.atlas_textures, Some(1));
    assert_eq!(observed.store_textures, Some(1));
}

#[test]
fn test_compression_reads_temp_container() {
    let ws = Workspace::new();
    let input = ws.write("grid.obj", &grid_obj(8, None));
    let output = ws.output("grid.nxz");

    let observed = run(ws.options(), &input, &output);
    let (opened, existed) = observed.opened.unwrap();
    assert!(opened.to_string_lossy().ends_with(TEMP_SUFFIX));
    assert!(existed);
    assert!(!opened.exists());
    assert_eq!(ws.entries(&ws.path("out")), vec![output]);
}

#[test]
fn test_uncompressed_build_opens_nothing() {
    let ws = Workspace::new();
    let input = ws.write("grid.obj", &grid_obj(4, None));

    let observed = run(ws.options(), &input, &ws.output("grid.nxs"));
    assert!(observed.opened.is_none());
}
