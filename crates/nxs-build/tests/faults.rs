//! Cleanup when the codec fails or panics

mod common;

use std::path::Path;

use common::{grid_obj, Workspace};
use nxs_build::engine::{CodecExtractor, Engine, EngineError, EngineResult};
use nxs_build::reference::{KdTreeSoup, NexusFile, ReferenceBuilder, ReferenceExtractor, SoupStream};
use nxs_build::{BuildError, BuildPipeline, BuildStatus, ReferenceEngine};
use nxs_core::{AttributeMask, QuantizationPlan, Signature};

#[derive(Debug, Clone, Copy)]
enum Fault {
    Panic,
    PartialWrite,
}

/// Reference engine whose codec misbehaves
struct FaultyEngine {
    inner: ReferenceEngine,
    fault: Fault,
}

struct FaultyExtractor<'a> {
    inner: ReferenceExtractor<'a>,
    fault: Fault,
}

impl CodecExtractor for FaultyExtractor<'_> {
    fn configure(&mut self, plan: &QuantizationPlan) {
        self.inner.configure(plan);
    }

    fn save(&mut self, path: &Path, _signature: Signature) -> EngineResult<()> {
        match self.fault {
            Fault::Panic => panic!("codec crashed"),
            Fault::PartialWrite => {
                std::fs::write(path, b"partial")?;
                Err(EngineError::Failed(String::from("disk full")))
            }
        }
    }
}

impl Engine for FaultyEngine {
    type Store = SoupStream;
    type Tree = KdTreeSoup;
    type Builder = ReferenceBuilder;
    type Container = NexusFile;
    type Extractor<'a> = FaultyExtractor<'a>;

    fn create_store(&self, cache_base: &Path) -> EngineResult<SoupStream> {
        self.inner.create_store(cache_base)
    }

    fn create_tree(&self, cache_base: &Path, adaptive: f32) -> EngineResult<KdTreeSoup> {
        self.inner.create_tree(cache_base, adaptive)
    }

    fn create_builder(&self, components: AttributeMask) -> ReferenceBuilder {
        self.inner.create_builder(components)
    }

    fn open_container(&self, path: &Path) -> EngineResult<NexusFile> {
        self.inner.open_container(path)
    }

    fn create_extractor<'a>(&'a self, container: &'a NexusFile) -> FaultyExtractor<'a> {
        FaultyExtractor {
            inner: self.inner.create_extractor(container),
            fault: self.fault,
        }
    }
}

fn run(fault: Fault) -> (Workspace, BuildError) {
    let ws = Workspace::new();
    let input = ws.write("grid.obj", &grid_obj(8, None));
    let pipeline = BuildPipeline::new(
        FaultyEngine {
            inner: ReferenceEngine,
            fault,
        },
        ws.options(),
    );
    let error = pipeline.run(&input, &ws.output("grid.nxz")).unwrap_err();
    (ws, error)
}

#[test]
fn test_codec_panic_cleans_up() {
    let (ws, error) = run(Fault::Panic);

    assert_eq!(error.status(), BuildStatus::Exception);
    assert!(matches!(&error, BuildError::Engine(m) if m.contains("codec crashed")));
    assert!(ws.entries(&ws.path("out")).is_empty());
    assert!(ws.cache_is_empty());
}

#[test]
fn test_codec_failure_removes_partial_output() {
    let (ws, error) = run(Fault::PartialWrite);

    assert!(matches!(&error, BuildError::Engine(m) if m == "disk full"));
    assert!(ws.entries(&ws.path("out")).is_empty());
    assert!(ws.cache_is_empty());
}

#[test]
fn test_uncompressed_build_unaffected() {
    let ws = Workspace::new();
    let input = ws.write("grid.obj", &grid_obj(4, None));
    let pipeline = BuildPipeline::new(
        FaultyEngine {
            inner: ReferenceEngine,
            fault: Fault::Panic,
        },
        ws.options(),
    );
    let outcome = pipeline.execute(&input, &ws.output("grid.nxs"));
    assert!(outcome.is_success());
}
