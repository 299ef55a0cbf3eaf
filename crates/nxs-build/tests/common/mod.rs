//! Shared fixtures for pipeline tests

#![allow(dead_code)]

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use nxs_core::BuildOptions;
use tempfile::TempDir;

/// Scratch workspace: source files, cache directory and outputs
pub struct Workspace {
    pub dir: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("cache")).unwrap();
        std::fs::create_dir_all(dir.path().join("out")).unwrap();
        Self { dir }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.path("cache")
    }

    pub fn output(&self, name: &str) -> PathBuf {
        self.path("out").join(name)
    }

    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.path(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    /// Options with small nodes so the hierarchy has several levels
    pub fn options(&self) -> BuildOptions {
        let mut options = BuildOptions::default();
        options.hierarchy.node_faces = 64;
        options.hierarchy.top_node_faces = 64;
        options.hierarchy.n_threads = 2;
        options.hierarchy.cache_dir = Some(self.cache_dir());
        options
    }

    /// Files left in a directory
    pub fn entries(&self, dir: &Path) -> Vec<PathBuf> {
        std::fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .collect()
    }

    pub fn cache_is_empty(&self) -> bool {
        self.entries(&self.cache_dir()).is_empty()
    }
}

/// `n` x `n` quad grid in the z = 0 plane, optionally with texcoords and a material
pub fn grid_obj(n: usize, material: Option<&str>) -> String {
    let mut obj = String::new();
    if material.is_some() {
        obj.push_str("mtllib grid.mtl\n");
    }
    for y in 0..=n {
        for x in 0..=n {
            writeln!(obj, "v {} {} 0", x, y).unwrap();
            if material.is_some() {
                writeln!(obj, "vt {} {}", x as f32 / n as f32, y as f32 / n as f32).unwrap();
            }
        }
    }
    if let Some(name) = material {
        writeln!(obj, "usemtl {}", name).unwrap();
    }
    let row = n + 1;
    for y in 0..n {
        for x in 0..n {
            let a = y * row + x + 1;
            let (b, c, d) = (a + 1, a + row + 1, a + row);
            if material.is_some() {
                writeln!(obj, "f {0}/{0} {1}/{1} {2}/{2} {3}/{3}", a, b, c, d).unwrap();
            } else {
                writeln!(obj, "f {} {} {} {}", a, b, c, d).unwrap();
            }
        }
    }
    obj
}

/// Colored point cloud with `n` points
pub fn cloud_obj(n: usize) -> String {
    let mut obj = String::new();
    for i in 0..n {
        let t = i as f32 / n as f32;
        writeln!(obj, "v {} {} {} {} 0.5 0.25", i % 10, (i / 10) % 10, i / 100, t).unwrap();
    }
    obj
}
