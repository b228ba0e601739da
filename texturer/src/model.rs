// Body model template: mesh topology, UV layout and per-vertex part labels.

use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use log::debug;

use crate::geometry::{rasterize_triangle, Point3, Vector2, Vector3};
use crate::picture::read_rgb_image;
use crate::segmentation::SMPL_TO_CANONICAL;
use crate::tensor::{check_shape, image_to_tensor, to_signed, Tensor};
use base::defs::{Error, ErrorKind::*, Result};
use base::util::fs;

#[derive(Clone, Debug, Default)]
pub struct BodyModel {
    pub vertices: Vec<Point3>,
    pub faces: Vec<[usize; 3]>,
    pub uv_coords: Vec<Vector2>,
    pub uv_faces: Vec<[usize; 3]>,
    pub part_labels: Option<Vec<u8>>,
}

impl BodyModel {
    pub fn load(
        obj_path: &Path,
        part_labels_path: Option<&Path>,
    ) -> Result<Self> {
        let mut model = read_obj(fs::open_file(obj_path)?)?;
        if let Some(path) = part_labels_path {
            let labels = read_part_labels(fs::open_file(path)?)?;
            model.set_part_labels(labels)?;
        }
        debug!(
            "loaded body model with {} vertices and {} faces",
            model.vertices.len(),
            model.faces.len()
        );
        Ok(model)
    }

    pub fn set_part_labels(&mut self, labels: Vec<u8>) -> Result<()> {
        check_shape("part labels", &[labels.len()], &[self.vertices.len()])?;
        self.part_labels = Some(labels);
        Ok(())
    }

    pub fn check_vertices(&self, vertices: &[Point3]) -> Result<()> {
        check_shape(
            "estimated vertices",
            &[vertices.len()],
            &[self.vertices.len()],
        )
    }

    // Continuous [i, j] texel coordinates of a UV face's corners.
    pub fn uv_face_texels(
        &self,
        face: usize,
        height: usize,
        width: usize,
    ) -> [Vector2; 3] {
        let to_texel = |t: usize| {
            let uv = self.uv_coords[t];
            Vector2::new((1.0 - uv[1]) * height as f64, uv[0] * width as f64)
        };
        let [t0, t1, t2] = self.uv_faces[face];
        [to_texel(t0), to_texel(t1), to_texel(t2)]
    }

    pub fn face_points(&self, vertices: &[Point3], face: usize) -> [Point3; 3] {
        let [v0, v1, v2] = self.faces[face];
        [vertices[v0], vertices[v1], vertices[v2]]
    }
}

// Majority of the three vertex labels, ties resolving to the first vertex.
pub fn face_part_labels(labels: &[u8], faces: &[[usize; 3]]) -> Vec<u8> {
    faces
        .iter()
        .map(|&[v0, v1, v2]| {
            let (l0, l1, l2) = (labels[v0], labels[v1], labels[v2]);
            if l1 == l2 && l0 != l1 {
                l1
            } else {
                l0
            }
        })
        .collect()
}

pub fn read_part_labels<R: Read>(reader: R) -> Result<Vec<u8>> {
    let mut labels = vec![];
    for (n, line_res) in BufReader::new(reader).lines().enumerate() {
        let line = line_res.map_err(|e| {
            let desc = "failed to read part labels".to_string();
            Error::with_source(IoError, desc, e)
        })?;
        for part in line.split_whitespace() {
            let label = part
                .parse::<u8>()
                .ok()
                .filter(|&l| (l as usize) < SMPL_TO_CANONICAL.len());
            match label {
                Some(l) => labels.push(l),
                None => {
                    let desc = format!(
                        "malformed part label '{}' at line {}",
                        part,
                        n + 1
                    );
                    return Err(Error::new(MalformedData, desc));
                }
            }
        }
    }
    Ok(labels)
}

#[derive(Default)]
struct ImportState {
    line: usize,
    model: BodyModel,
}

pub fn read_obj<R: Read>(reader: R) -> Result<BodyModel> {
    let mut state = ImportState::default();

    for line_res in BufReader::new(reader).lines() {
        let line = line_res.map_err(|e| {
            let desc = format!("failed to read line {}", state.line + 1);
            Error::with_source(IoError, desc, e)
        })?;
        state.line += 1;

        let parts: Vec<&str> = line.split_whitespace().collect();
        if !parts.is_empty() {
            match parts[0] {
                "f" => import_f(&mut state, &parts)?,
                "v" => import_v(&mut state, &parts)?,
                "vt" => import_vt(&mut state, &parts)?,
                _ => (),
            }
        }
    }

    Ok(state.model)
}

fn import_f(state: &mut ImportState, parts: &[&str]) -> Result<()> {
    let num_vertices_err = |kind, prop| {
        let msg = "number of vertices in f-statement at line";
        Err(Error::new(kind, format!("{} {} {}", prop, msg, state.line)))
    };
    if parts.len() < 4 {
        return num_vertices_err(MalformedData, "bad");
    } else if parts.len() > 4 {
        return num_vertices_err(UnsupportedFeature, "unsupported");
    }

    let mut face = [0; 3];
    let mut uv_face = [0; 3];
    for (i, part) in parts[1..].iter().enumerate() {
        let mut iter = part.split('/');
        let vertex = parse_f_component(state.line, iter.next(), i + 1)?;
        let texture = parse_f_component(state.line, iter.next(), i + 1)?;

        let model = &state.model;
        if vertex > model.vertices.len() || texture > model.uv_coords.len() {
            let desc = format!(
                "reference to unknown vertex {} in f-statement at line {}",
                i + 1,
                state.line
            );
            return Err(Error::new(InconsistentState, desc));
        }
        face[i] = vertex - 1;
        uv_face[i] = texture - 1;
    }

    state.model.faces.push(face);
    state.model.uv_faces.push(uv_face);
    Ok(())
}

fn parse_f_component(
    line: usize,
    component: Option<&str>,
    vnum: usize,
) -> Result<usize> {
    let component = component.unwrap_or_default();
    if component.starts_with('-') {
        let desc = format!(
            "relative index of vertex {} in f-statement at line {}",
            vnum, line
        );
        return Err(Error::new(UnsupportedFeature, desc));
    }

    let num = component.parse::<usize>().unwrap_or_default();
    if num != 0 {
        Ok(num)
    } else {
        let desc = format!(
            "malformed vertex {} in f-statement at line {}",
            vnum, line
        );
        Err(Error::new(MalformedData, desc))
    }
}

fn import_v(state: &mut ImportState, parts: &[&str]) -> Result<()> {
    if parts.len() < 4 || parts.len() > 5 {
        return Err(Error::new(
            MalformedData,
            format!("malformed v-statement at line {}", state.line),
        ));
    }

    let x = parse_coord("x-coordinate of v-statement", state.line, parts[1])?;
    let y = parse_coord("y-coordinate of v-statement", state.line, parts[2])?;
    let z = parse_coord("z-coordinate of v-statement", state.line, parts[3])?;

    state.model.vertices.push(Point3::new(x, y, z));
    Ok(())
}

fn import_vt(state: &mut ImportState, parts: &[&str]) -> Result<()> {
    if parts.len() < 3 || parts.len() > 4 {
        return Err(Error::new(
            MalformedData,
            format!("malformed vt-statement at line {}", state.line),
        ));
    }

    let u = parse_coord("u-coordinate of vt-statement", state.line, parts[1])?;
    let v = parse_coord("v-coordinate of vt-statement", state.line, parts[2])?;

    state.model.uv_coords.push(Vector2::new(u, v));
    Ok(())
}

fn parse_coord(what: &str, line: usize, str: &str) -> Result<f64> {
    match str.parse::<f64>() {
        Ok(val) => Ok(val),
        Err(_) => Err(Error::new(
            MalformedData,
            format!("failed to parse {} at line {}", what, line),
        )),
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TexelFace {
    pub face: usize,
    pub bary: Vector3,
}

// Which UV faces cover each texel center of a height x width texture.
pub struct UvCoverage {
    pub height: usize,
    pub width: usize,
    faces: Vec<Vec<usize>>,
    primary: Vec<Option<TexelFace>>,
}

impl UvCoverage {
    pub fn new(model: &BodyModel, height: usize, width: usize) -> Self {
        let mut faces = vec![vec![]; height * width];
        let mut primary = vec![None; height * width];
        for face in 0..model.uv_faces.len() {
            let ijs = model.uv_face_texels(face, height, width);
            rasterize_triangle(ijs, height, width, |i, j, bary| {
                let k = i * width + j;
                faces[k].push(face);
                primary[k].get_or_insert(TexelFace { face, bary });
            });
        }
        UvCoverage {
            height,
            width,
            faces,
            primary,
        }
    }

    pub fn faces(&self, i: usize, j: usize) -> &[usize] {
        &self.faces[i * self.width + j]
    }

    pub fn primary(&self, i: usize, j: usize) -> Option<TexelFace> {
        self.primary[i * self.width + j]
    }

    pub fn covered_share(&self) -> f64 {
        let covered = self.primary.iter().filter(|p| p.is_some()).count();
        covered as f64 / self.primary.len().max(1) as f64
    }
}

// UV target embedding derived from the template: each covered texel holds
// its surface point normalized over the template bounding box.
pub fn template_encoding(model: &BodyModel, coverage: &UvCoverage) -> Tensor {
    let mut lo = Vector3::repeat(f64::MAX);
    let mut hi = Vector3::repeat(f64::MIN);
    for v in &model.vertices {
        lo = lo.inf(&v.coords);
        hi = hi.sup(&v.coords);
    }
    let extent = (hi - lo).map(|e| if e > 0.0 { e } else { 1.0 });

    let (h, w) = (coverage.height, coverage.width);
    let mut encoding = Tensor::zeros((3, h, w));
    for i in 0..h {
        for j in 0..w {
            if let Some(TexelFace { face, bary }) = coverage.primary(i, j) {
                let [p0, p1, p2] = model.face_points(&model.vertices, face);
                let p = p0.coords * bary[0]
                    + p1.coords * bary[1]
                    + p2.coords * bary[2];
                for c in 0..3 {
                    encoding[(c, i, j)] = ((p[c] - lo[c]) / extent[c]) as f32;
                }
            }
        }
    }
    to_signed(&encoding)
}

pub fn load_uv_encoding(
    path: &Path,
    height: usize,
    width: usize,
) -> Result<Tensor> {
    let image = read_rgb_image(path)?;
    let (w, h) = image.dimensions();
    check_shape(
        "UV encoding image",
        &[h as usize, w as usize],
        &[height, width],
    )?;
    Ok(to_signed(&image_to_tensor(&image)))
}
