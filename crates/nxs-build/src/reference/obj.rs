//! Wavefront OBJ reader
//!
//! Reads positions (with optional per-vertex RGB), normals, texture
//! coordinates and polygonal faces, triangulated as fans. Textures come
//! from the `map_Kd` entries of the material library. A file without faces
//! is read as a point cloud.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use ahash::AHashMap;
use glam::Vec3;
use smallvec::SmallVec;

use nxs_core::Patch;

use super::mesh::{Triangle, Vertex};
use crate::engine::{EngineError, EngineResult, TextureSet};

/// Everything read from one OBJ file
#[derive(Debug, Default)]
pub struct ObjModel {
    pub triangles: Vec<Triangle>,
    /// Textures indexed by [`Triangle::texture`]
    pub textures: TextureSet,
    pub has_normals: bool,
    pub has_colors: bool,
    pub has_texcoords: bool,
}

impl ObjModel {
    pub fn is_point_cloud(&self) -> bool {
        !self.triangles.is_empty() && self.triangles.iter().all(Triangle::is_point)
    }
}

/// Material name to diffuse texture
type Materials = AHashMap<String, Option<PathBuf>>;

#[derive(Debug, Clone, Copy)]
struct Corner {
    position: usize,
    uv: Option<usize>,
    normal: Option<usize>,
}

/// Load an OBJ file. `material_library` replaces the file's own `mtllib`.
/// `separator` is the decimal separator of the active numeric locale.
pub fn load(
    path: &Path,
    material_library: Option<&Path>,
    separator: char,
) -> EngineResult<ObjModel> {
    let file = File::open(path)?;
    let mut parser = ObjParser::new(path, separator);
    if let Some(library) = material_library {
        parser.load_materials(library)?;
        parser.locked_materials = true;
    }
    parser.parse(BufReader::new(file))?;
    Ok(parser.finish())
}

struct ObjParser<'a> {
    source: &'a Path,
    separator: char,
    line: usize,
    positions: Vec<Vec3>,
    colors: Vec<Option<[u8; 4]>>,
    normals: Vec<Vec3>,
    uvs: Vec<[f32; 2]>,
    materials: Materials,
    locked_materials: bool,
    current_texture: u32,
    model: ObjModel,
}

impl<'a> ObjParser<'a> {
    fn new(source: &'a Path, separator: char) -> Self {
        Self {
            source,
            separator,
            line: 0,
            positions: Vec::new(),
            colors: Vec::new(),
            normals: Vec::new(),
            uvs: Vec::new(),
            materials: Materials::default(),
            locked_materials: false,
            current_texture: Patch::NO_TEXTURE,
            model: ObjModel::default(),
        }
    }

    fn error(&self, message: impl Into<String>) -> EngineError {
        EngineError::Parse {
            path: self.source.display().to_string(),
            line: self.line,
            message: message.into(),
        }
    }

    fn parse<R: BufRead>(&mut self, reader: R) -> EngineResult<()> {
        for line in reader.lines() {
            let line = line?;
            self.line += 1;

            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            let mut parts = trimmed.split_whitespace();
            let Some(keyword) = parts.next() else {
                continue;
            };
            let args: SmallVec<[&str; 8]> = parts.collect();

            match keyword {
                "v" => self.vertex(&args)?,
                "vn" => {
                    let n = self.floats::<3>(&args, "normal")?;
                    self.normals.push(Vec3::from(n));
                }
                "vt" => {
                    let uv = self.floats::<2>(&args, "texture coordinate")?;
                    self.uvs.push(uv);
                }
                "f" => self.face(&args)?,
                "mtllib" if !self.locked_materials => {
                    if let Some(name) = args.last() {
                        let library = self.relative(name);
                        self.load_materials(&library)?;
                    }
                }
                "usemtl" => {
                    self.current_texture = args
                        .first()
                        .and_then(|name| self.materials.get(*name).cloned().flatten())
                        .map(|texture| self.model.textures.insert(texture))
                        .unwrap_or(Patch::NO_TEXTURE);
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn number(&self, token: &str) -> EngineResult<f32> {
        token
            .parse::<f32>()
            .ok()
            .or_else(|| {
                if self.separator == '.' {
                    None
                } else {
                    token.replace(self.separator, ".").parse().ok()
                }
            })
            .filter(|value| value.is_finite())
            .ok_or_else(|| self.error(format!("invalid number '{}'", token)))
    }

    fn floats<const N: usize>(&self, args: &[&str], what: &str) -> EngineResult<[f32; N]> {
        if args.len() < N {
            return Err(self.error(format!("{} needs {} values", what, N)));
        }
        let mut values = [0.0; N];
        for (value, token) in values.iter_mut().zip(args) {
            *value = self.number(token)?;
        }
        Ok(values)
    }

    fn vertex(&mut self, args: &[&str]) -> EngineResult<()> {
        let position = self.floats::<3>(args, "vertex")?;
        self.positions.push(Vec3::from(position));

        let color = if args.len() >= 6 {
            let rgb = self.floats::<3>(&args[3..], "vertex color")?;
            // 0..1 floats unless some channel is clearly on a 0..255 scale
            let scale = if rgb.iter().any(|c| *c > 1.0) { 1.0 } else { 255.0 };
            let channel = |c: f32| (c * scale).round().clamp(0.0, 255.0) as u8;
            Some([channel(rgb[0]), channel(rgb[1]), channel(rgb[2]), 255])
        } else {
            None
        };
        self.colors.push(color);
        Ok(())
    }

    fn index(&self, token: &str, count: usize, what: &str) -> EngineResult<usize> {
        let raw: i64 = token
            .parse()
            .map_err(|_| self.error(format!("invalid {} index '{}'", what, token)))?;
        let resolved = match raw {
            r if r > 0 => (r - 1) as usize,
            r if r < 0 => count.checked_sub(r.unsigned_abs() as usize).unwrap_or(usize::MAX),
            _ => usize::MAX,
        };
        if resolved >= count {
            return Err(self.error(format!("{} index {} out of range", what, raw)));
        }
        Ok(resolved)
    }

    fn corner(&self, token: &str) -> EngineResult<Corner> {
        let mut fields = token.split('/');
        let position = self.index(fields.next().unwrap_or(""), self.positions.len(), "vertex")?;
        let uv = match fields.next() {
            Some(field) if !field.is_empty() => Some(self.index(field, self.uvs.len(), "texture")?),
            _ => None,
        };
        let normal = match fields.next() {
            Some(field) if !field.is_empty() => {
                Some(self.index(field, self.normals.len(), "normal")?)
            }
            _ => None,
        };
        Ok(Corner {
            position,
            uv,
            normal,
        })
    }

    fn corner_vertex(&self, corner: Corner) -> Vertex {
        let mut vertex = Vertex::at(self.positions[corner.position]);
        if let Some(color) = self.colors[corner.position] {
            vertex.color = color;
        }
        if let Some(uv) = corner.uv {
            vertex.uv = self.uvs[uv];
        }
        if let Some(normal) = corner.normal {
            vertex.normal = self.normals[normal];
        }
        vertex
    }

    fn face(&mut self, args: &[&str]) -> EngineResult<()> {
        let corners = args
            .iter()
            .map(|token| self.corner(token))
            .collect::<EngineResult<SmallVec<[Corner; 4]>>>()?;
        if corners.len() < 3 {
            return Err(self.error("face needs at least 3 vertices"));
        }

        self.model.has_texcoords |= corners.iter().all(|c| c.uv.is_some());
        self.model.has_normals |= corners.iter().all(|c| c.normal.is_some());
        self.model.has_colors |= corners.iter().any(|c| self.colors[c.position].is_some());

        let first = self.corner_vertex(corners[0]);
        for pair in corners[1..].windows(2) {
            let vertices = [first, self.corner_vertex(pair[0]), self.corner_vertex(pair[1])];
            self.model.triangles.push(Triangle::new(vertices, self.current_texture));
        }
        Ok(())
    }

    fn relative(&self, name: &str) -> PathBuf {
        let base = self.source.parent().unwrap_or_else(|| Path::new(""));
        base.join(name)
    }

    fn load_materials(&mut self, library: &Path) -> EngineResult<()> {
        let file = match File::open(library) {
            Ok(file) => file,
            Err(e) => {
                log::warn!("Could not open material library {}: {}", library.display(), e);
                return Ok(());
            }
        };
        let base = library.parent().unwrap_or_else(|| Path::new(""));

        let mut current: Option<String> = None;
        for line in BufReader::new(file).lines() {
            let line = line?;
            let mut parts = line.split_whitespace();
            match parts.next() {
                Some("newmtl") => {
                    let name = parts.collect::<Vec<_>>().join(" ");
                    self.materials.entry(name.clone()).or_insert(None);
                    current = Some(name);
                }
                Some("map_Kd") => {
                    // options may precede the file name
                    if let (Some(name), Some(texture)) = (&current, parts.last()) {
                        self.materials.insert(name.clone(), Some(base.join(texture)));
                    }
                }
                _ => {}
            }
        }
        log::debug!("Read {} materials from {}", self.materials.len(), library.display());
        Ok(())
    }

    fn finish(mut self) -> ObjModel {
        if self.model.triangles.is_empty() && !self.positions.is_empty() {
            log::info!("{} has no faces, reading it as a point cloud", self.source.display());
            let with_normals = self.normals.len() == self.positions.len();
            for (i, position) in self.positions.iter().enumerate() {
                let mut vertex = Vertex::at(*position);
                if let Some(color) = self.colors[i] {
                    vertex.color = color;
                }
                if with_normals {
                    vertex.normal = self.normals[i];
                }
                self.model.triangles.push(Triangle::point(vertex));
            }
            self.model.has_normals = with_normals;
            self.model.has_colors = self.colors.iter().any(Option::is_some);
            self.model.has_texcoords = false;
            self.model.textures.clear();
        }
        self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_quad_triangulation() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "quad.obj",
            "# quad\nv 0 0 0\nv 1 0 0\nv 1 1 0\nv 0 1 0\nf 1 2 3 4\n",
        );
        let model = load(&path, None, '.').unwrap();
        assert_eq!(model.triangles.len(), 2);
        assert!(!model.has_normals);
        assert!(!model.has_colors);
        assert!(!model.has_texcoords);
        assert!(!model.is_point_cloud());
        assert_eq!(model.triangles[1].vertices[2].position, Vec3::new(0.0, 1.0, 0.0));
    }

    #[test]
    fn test_negative_indices_and_channels() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "tri.obj",
            "v 0 0 0 1 0 0\nv 1 0 0 0 1 0\nv 0 1 0 0 0 1\n\
             vn 0 0 1\nvt 0 0\nvt 1 0\nvt 0 1\n\
             f -3/1/1 -2/2/1 -1/3/1\n",
        );
        let model = load(&path, None, '.').unwrap();
        assert_eq!(model.triangles.len(), 1);
        assert!(model.has_normals);
        assert!(model.has_colors);
        assert!(model.has_texcoords);

        let t = &model.triangles[0];
        assert_eq!(t.vertices[0].color, [255, 0, 0, 255]);
        assert_eq!(t.vertices[1].uv, [1.0, 0.0]);
        assert_eq!(t.vertices[2].normal, Vec3::Z);
    }

    #[test]
    fn test_point_cloud() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "cloud.obj", "v 0 0 0\nv 1 2 3\nv 4 5 6 10 20 30\n");
        let model = load(&path, None, '.').unwrap();
        assert!(model.is_point_cloud());
        assert_eq!(model.triangles.len(), 3);
        assert!(model.has_colors);
        assert_eq!(model.triangles[2].vertices[0].color, [10, 20, 30, 255]);
    }

    #[test]
    fn test_materials_and_textures() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "scene.mtl",
            "newmtl wood\nmap_Kd -s 1 1 1 wood.png\nnewmtl plain\nKd 1 1 1\n",
        );
        let path = write(
            dir.path(),
            "scene.obj",
            "mtllib scene.mtl\nv 0 0 0\nv 1 0 0\nv 0 1 0\nvt 0 0\nvt 1 0\nvt 0 1\n\
             usemtl wood\nf 1/1 2/2 3/3\nusemtl plain\nf 1/1 3/3 2/2\n",
        );
        let model = load(&path, None, '.').unwrap();
        assert_eq!(model.textures.len(), 1);
        assert_eq!(model.textures.get(0), Some(dir.path().join("wood.png").as_path()));
        assert_eq!(model.triangles[0].texture, 0);
        assert_eq!(model.triangles[1].texture, Patch::NO_TEXTURE);
    }

    #[test]
    fn test_material_library_override() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "own.mtl", "newmtl m\nmap_Kd own.png\n");
        let other = write(dir.path(), "other.mtl", "newmtl m\nmap_Kd other.png\n");
        let path = write(
            dir.path(),
            "model.obj",
            "mtllib own.mtl\nv 0 0 0\nv 1 0 0\nv 0 1 0\nusemtl m\nf 1 2 3\n",
        );
        let model = load(&path, Some(&other), '.').unwrap();
        assert_eq!(model.textures.get(0), Some(dir.path().join("other.png").as_path()));
    }

    #[test]
    fn test_comma_separator() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "comma.obj", "v 0,5 1 2\n");
        let model = load(&path, None, ',').unwrap();
        assert_eq!(model.triangles[0].vertices[0].position, Vec3::new(0.5, 1.0, 2.0));

        assert!(load(&path, None, '.').is_err());
    }

    #[test]
    fn test_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "bad.obj", "v 0 0 0\nv 1 0 0\nf 1 2 7\n");
        match load(&path, None, '.') {
            Err(EngineError::Parse { line, .. }) => assert_eq!(line, 3),
            other => panic!("expected parse error, got {:?}", other),
        }

        let missing = load(&dir.path().join("missing.obj"), None, '.');
        assert!(matches!(missing, Err(EngineError::Io(_))));
    }

    #[test]
    fn test_extreme_negative_index() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "neg.obj",
            "v 0 0 0\nv 1 0 0\nv 0 1 0\nf -9223372036854775808 -2 -1\nf -4 -2 -1\n",
        );
        match load(&path, None, '.') {
            Err(EngineError::Parse { line, message, .. }) => {
                assert_eq!(line, 4);
                assert!(message.contains("out of range"));
            }
            other => panic!("expected parse error, got {:?}", other),
        }
    }
}
