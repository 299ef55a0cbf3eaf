//! End-to-end builds through the reference engine

mod common;

use std::path::Path;

use common::{cloud_obj, grid_obj, Workspace};
use nxs_build::engine::CompressedContainer;
use nxs_build::reference::{CompressedDocument, NexusFile};
use nxs_build::{build_with_options, BuildError, BuildPipeline, BuildStatus, ReferenceEngine};
use nxs_core::{AttributeMask, Codec, QuantizationMode, SignatureFlags};

#[test]
fn test_build_uncompressed() {
    let ws = Workspace::new();
    let input = ws.write("grid.obj", &grid_obj(16, None));
    let output = ws.output("grid.nxs");

    let report = build_with_options(&input, &output, &ws.options()).unwrap();
    assert!(!report.compressed);
    assert_eq!(report.codec, None);
    assert_eq!(report.components, AttributeMask::FACES | AttributeMask::NORMALS);

    let file = NexusFile::open(&output).unwrap();
    assert!(file.header().n_nodes > 2);
    assert_eq!(file.header().n_face, file.nodes().iter().map(|n| n.nface as u64).sum::<u64>());
    assert!(!file.header().signature.is_compressed());
    assert!(ws.cache_is_empty());
}

#[test]
fn test_build_corto() {
    let ws = Workspace::new();
    let input = ws.write("grid.obj", &grid_obj(16, None));
    let output = ws.output("grid.nxz");

    let report = build_with_options(&input, &output, &ws.options()).unwrap();
    assert!(report.compressed);
    assert_eq!(report.codec, Some(Codec::Corto));
    let plan = report.quantization.unwrap();
    assert_eq!(plan.mode, QuantizationMode::ErrorQuantile);
    assert!(plan.coord_step > 0.0);

    let document = CompressedDocument::read(&output).unwrap();
    let flags = document.header.signature.flags;
    assert!(flags.contains(SignatureFlags::CORTO));
    assert!(!flags.contains(SignatureFlags::MECO));
    assert_eq!(document.plan, plan);

    // only the final output remains
    assert_eq!(ws.entries(&ws.path("out")), vec![output.clone()]);
    assert!(ws.cache_is_empty());
}

#[test]
fn test_compressed_positions_within_step() {
    let ws = Workspace::new();
    let input = ws.write("grid.obj", &grid_obj(8, None));
    let output = ws.output("grid.nxz");

    let mut options = ws.options();
    options.compression.coord_step = 0.3;
    let report = build_with_options(&input, &output, &options).unwrap();
    let plan = report.quantization.unwrap();
    assert_eq!(plan.mode, QuantizationMode::Explicit);
    assert_eq!(plan.coord_q, -2);

    let document = CompressedDocument::read(&output).unwrap();
    for node in &document.geometry {
        assert_eq!(node.coord_q, -2);
        for p in node.dequantized_positions() {
            // grid vertices are integers, exact on a 0.25 grid
            assert_eq!(p, p.round());
        }
    }
}

#[test]
fn test_extension_case_and_meco() {
    let ws = Workspace::new();
    let input = ws.write("grid.obj", &grid_obj(4, None));
    let output = ws.output("grid.NXZ");

    let mut options = ws.options();
    options.compression.compress_lib = String::from("meco");
    let report = build_with_options(&input, &output, &options).unwrap();
    assert_eq!(report.codec, Some(Codec::Meco));

    let document = CompressedDocument::read(&output).unwrap();
    assert!(document.header.signature.flags.contains(SignatureFlags::MECO));
    assert!(!document.header.signature.flags.contains(SignatureFlags::CORTO));
}

#[test]
fn test_compression_disabled_writes_nxs_layout() {
    let ws = Workspace::new();
    let input = ws.write("grid.obj", &grid_obj(4, None));
    let output = ws.output("grid.nxz");

    let mut options = ws.options();
    options.compression.enable_compression = false;
    let report = build_with_options(&input, &output, &options).unwrap();
    assert!(!report.compressed);
    assert!(NexusFile::open(&output).is_ok());
}

#[test]
fn test_unknown_codec() {
    let ws = Workspace::new();
    let input = ws.write("grid.obj", &grid_obj(4, None));
    let output = ws.output("grid.nxz");

    let mut options = ws.options();
    options.compression.compress_lib = String::from("zstd");
    let error = build_with_options(&input, &output, &options).unwrap_err();

    assert_eq!(error.status(), BuildStatus::Exception);
    assert!(matches!(&error, BuildError::Configuration(_)));
    assert_eq!(error.to_string(), "Unknown compression method: zstd");
    assert!(ws.entries(&ws.path("out")).is_empty());
    assert!(ws.cache_is_empty());
}

#[test]
fn test_unknown_codec_ignored_for_nxs() {
    let ws = Workspace::new();
    let input = ws.write("grid.obj", &grid_obj(4, None));

    let mut options = ws.options();
    options.compression.compress_lib = String::from("zstd");
    assert!(build_with_options(&input, ws.output("grid.nxs"), &options).is_ok());
}

#[test]
fn test_missing_input() {
    let ws = Workspace::new();
    let output = ws.output("grid.nxs");

    let error = build_with_options(ws.path("missing.obj"), &output, &ws.options()).unwrap_err();
    assert_eq!(error.status(), BuildStatus::InvalidInput);
    assert!(!output.exists());
    assert!(ws.cache_is_empty());
}

#[test]
fn test_empty_paths() {
    let ws = Workspace::new();
    let input = ws.write("grid.obj", &grid_obj(2, None));

    let pipeline = BuildPipeline::new(ReferenceEngine, ws.options());
    let outcome = pipeline.execute(Path::new(""), &ws.output("a.nxs"));
    assert_eq!(outcome.status, BuildStatus::InvalidInput);
    assert_eq!(pipeline.execute(&input, Path::new("")).status, BuildStatus::InvalidInput);
}

#[test]
fn test_execute_reports_success() {
    let ws = Workspace::new();
    let input = ws.write("grid.obj", &grid_obj(2, None));

    let pipeline = BuildPipeline::new(ReferenceEngine, ws.options());
    let outcome = pipeline.execute(&input, &ws.output("grid.nxs"));
    assert!(outcome.is_success());
    assert_eq!(outcome.message, None);
}

#[test]
fn test_malformed_source() {
    let ws = Workspace::new();
    let input = ws.write("bad.obj", "v 0 0 0\nf 1 2 3\n");
    let output = ws.output("bad.nxs");

    let error = build_with_options(&input, &output, &ws.options()).unwrap_err();
    assert!(matches!(error, BuildError::Engine(_)));
    assert!(!output.exists());
    assert!(ws.cache_is_empty());
}

#[test]
fn test_point_cloud() {
    let ws = Workspace::new();
    let input = ws.write("cloud.obj", &cloud_obj(300));
    let output = ws.output("cloud.nxz");

    let mut options = ws.options();
    options.attributes.point_cloud = true;
    let report = build_with_options(&input, &output, &options).unwrap();

    assert!(!report.components.contains(AttributeMask::FACES));
    assert!(!report.components.contains(AttributeMask::NORMALS));
    assert!(report.components.contains(AttributeMask::COLORS));

    let document = CompressedDocument::read(&output).unwrap();
    assert!(document.geometry.iter().all(|g| g.faces.is_empty()));
    assert!(document.geometry.iter().any(|g| !g.colors.is_empty()));
}

#[test]
fn test_attribute_toggles() {
    let ws = Workspace::new();
    let input = ws.write("cloud.obj", &cloud_obj(50));

    let mut options = ws.options();
    options.attributes.disable_normals = true;
    options.attributes.disable_colors = true;
    let report = build_with_options(&input, ws.output("a.nxs"), &options).unwrap();
    assert_eq!(report.components, AttributeMask::FACES);

    let mut options = ws.options();
    options.attributes.point_cloud = true;
    options.attributes.force_normals = true;
    let report = build_with_options(&input, ws.output("b.nxs"), &options).unwrap();
    assert!(report.components.contains(AttributeMask::NORMALS));
}

#[test]
fn test_textures_kept_and_dropped() {
    let ws = Workspace::new();
    ws.write("grid.mtl", "newmtl checker\nmap_Kd checker.png\n");
    ws.write("checker.png", "not really a png");
    let input = ws.write("grid.obj", &grid_obj(8, Some("checker")));

    let report = build_with_options(&input, ws.output("textured.nxs"), &ws.options()).unwrap();
    assert!(report.source.has_textures);
    assert!(report.components.contains(AttributeMask::TEXTURES));
    let file = NexusFile::open(&ws.output("textured.nxs")).unwrap();
    assert_eq!(file.header().n_textures, 1);
    assert!(file.header().signature.flags.contains(SignatureFlags::PTEXTURE));

    let mut options = ws.options();
    options.attributes.disable_texcoords = true;
    let report = build_with_options(&input, ws.output("plain.nxs"), &options).unwrap();
    assert!(!report.components.contains(AttributeMask::TEXTURES));
    let file = NexusFile::open(&ws.output("plain.nxs")).unwrap();
    assert_eq!(file.header().n_textures, 0);
    assert!(file.textures().is_empty());
}

#[test]
fn test_missing_texture_fails_atlas() {
    let ws = Workspace::new();
    ws.write("grid.mtl", "newmtl checker\nmap_Kd absent.png\n");
    let input = ws.write("grid.obj", &grid_obj(4, Some("checker")));
    let output = ws.output("grid.nxz");

    let error = build_with_options(&input, &output, &ws.options()).unwrap_err();
    assert!(matches!(
        &error,
        BuildError::Configuration(m) if m == "Failed to initialize texture atlas"
    ));
    assert!(ws.entries(&ws.path("out")).is_empty());
    assert!(ws.cache_is_empty());
}

#[test]
fn test_spilled_store() {
    let ws = Workspace::new();
    let input = ws.write("grid.obj", &grid_obj(8, None));

    let mut options = ws.options();
    options.hierarchy.ram_buffer_mb = 0;
    build_with_options(&input, ws.output("grid.nxs"), &options).unwrap();
    assert!(ws.cache_is_empty());
}

#[test]
fn test_concurrent_builds() {
    let ws = Workspace::new();
    let input = ws.write("grid.obj", &grid_obj(8, None));
    let options = ws.options();

    std::thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let (input, options) = (&input, &options);
                let output = ws.output(&format!("grid{}.nxz", i));
                scope.spawn(move || build_with_options(input, output, options))
            })
            .collect();
        for handle in handles {
            assert!(handle.join().unwrap().is_ok());
        }
    });

    assert_eq!(ws.entries(&ws.path("out")).len(), 4);
    assert!(ws.cache_is_empty());
}
