// Decides which UV texels were observed by the estimated camera and masks
// the rest of the texture with a sentinel color.

use std::rc::Rc;
use std::str::FromStr;

use kiddo::distance::squared_euclidean;
use kiddo::KdTree;
use ndarray::{s, Array2, Array3};
use serde::Deserialize;

use crate::camera::ViewCamera;
use crate::geometry::{
    vertex_normals, BarycentricCoordinateSystem, Point3, ProjectedPoint,
    Vector2,
};
use crate::model::UvCoverage;
use crate::tensor::{check_shape, Tensor};
use base::defs::{Error, ErrorKind::*, Result};

// Texels nobody observed, in byte space.
pub const UNKNOWN_COLOR: [u8; 3] = [255, 255, 255];

pub fn unknown_color() -> [f32; 3] {
    UNKNOWN_COLOR.map(|c| c as f32 / 255.0)
}

// Per-texel condition channels of shape (C, H, W).
pub type TexelConditions = Array3<bool>;

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Criterion {
    All,
    Any,
}

impl Default for Criterion {
    fn default() -> Self {
        Criterion::All
    }
}

impl Criterion {
    pub fn holds<I: IntoIterator<Item = bool>>(self, flags: I) -> bool {
        let mut flags = flags.into_iter();
        match self {
            Criterion::All => flags.all(|f| f),
            Criterion::Any => flags.any(|f| f),
        }
    }
}

impl FromStr for Criterion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "all" => Ok(Criterion::All),
            "any" => Ok(Criterion::Any),
            _ => Err(Error::new(
                InvalidArgument,
                format!("unknown criterion '{}', can be 'all' or 'any'", s),
            )),
        }
    }
}

pub struct Visibility {
    pub vertices: Vec<bool>,
    pub faces: Vec<bool>,
    pub conditions: TexelConditions,
}

pub trait VisibilityOracle {
    fn texel_conditions(
        &self,
        vertices: &[Point3],
        faces: &[[usize; 3]],
        camera: &ViewCamera,
    ) -> Result<Visibility>;
}

#[derive(Clone, Copy, Debug)]
pub struct OcclusionParams {
    pub criterion: Criterion,
    pub normal_threshold: Option<f64>,
    pub depth_epsilon: f64,
}

// Hidden-surface test over the projected mesh, with a kd-tree narrowing the
// vertices each face can cover.
pub struct OcclusionOracle {
    coverage: Rc<UvCoverage>,
    params: OcclusionParams,
}

impl OcclusionOracle {
    pub fn new(coverage: Rc<UvCoverage>, params: OcclusionParams) -> Self {
        OcclusionOracle { coverage, params }
    }

    fn vertex_visibility(
        &self,
        vertices: &[Point3],
        faces: &[[usize; 3]],
        camera: &ViewCamera,
    ) -> Result<Vec<bool>> {
        let projected = camera.project_all(vertices);
        let occluded =
            occluded_vertices(&projected, faces, self.params.depth_epsilon)?;

        let normals = self
            .params
            .normal_threshold
            .map(|_| vertex_normals(vertices, faces));

        Ok((0..vertices.len())
            .map(|i| {
                let facing = match (&normals, self.params.normal_threshold) {
                    (Some(normals), Some(threshold)) => {
                        let dir = camera.direction_to_eye(&vertices[i]);
                        normals[i].dot(&dir) > threshold
                    }
                    _ => true,
                };
                projected[i].depth > 0.0 && !occluded[i] && facing
            })
            .collect())
    }
}

impl VisibilityOracle for OcclusionOracle {
    fn texel_conditions(
        &self,
        vertices: &[Point3],
        faces: &[[usize; 3]],
        camera: &ViewCamera,
    ) -> Result<Visibility> {
        let vertex_flags = self.vertex_visibility(vertices, faces, camera)?;
        let criterion = self.params.criterion;
        let face_flags = face_visibility(&vertex_flags, faces, criterion);
        let conditions =
            corner_conditions(&self.coverage, faces, &vertex_flags, criterion);
        Ok(Visibility {
            vertices: vertex_flags,
            faces: face_flags,
            conditions,
        })
    }
}

fn orientation(v0: Vector2, v1: Vector2, v2: Vector2) -> f64 {
    (v1[0] * v2[1] - v1[1] * v2[0])
        + (v2[0] * v0[1] - v2[1] * v0[0])
        + (v0[0] * v1[1] - v0[1] * v1[0])
}

// Strict containment for either winding of the triangle.
fn containment_check(v: Vector2, f: [Vector2; 3]) -> bool {
    let [v0, v1, v2] = f;
    if v == v0 || v == v1 || v == v2 {
        return false;
    }
    let s0 = orientation(v, v1, v2);
    let s1 = orientation(v0, v, v2);
    let s2 = orientation(v0, v1, v);
    (s0 > 0.0 && s1 > 0.0 && s2 > 0.0) || (s0 < 0.0 && s1 < 0.0 && s2 < 0.0)
}

fn max(a: [f64; 3]) -> f64 {
    a.iter().cloned().fold(f64::NEG_INFINITY, f64::max)
}

fn occluded_vertices(
    projected: &[ProjectedPoint],
    faces: &[[usize; 3]],
    depth_epsilon: f64,
) -> Result<Vec<bool>> {
    let mut occluded = vec![false; projected.len()];

    // Build 2d kdtree of all finite projections.
    let mut kdtree = KdTree::new();
    let mut num_indexed = 0;
    for (i, p) in projected.iter().enumerate() {
        if p.point.iter().all(|c| c.is_finite()) && p.depth.is_finite() {
            kdtree.add(p.point.as_ref(), i).map_err(|e| {
                let desc = format!("failed to index vertex {}: {:?}", i, e);
                Error::new(InconsistentState, desc)
            })?;
            num_indexed += 1;
        }
    }
    if num_indexed == 0 {
        return Ok(occluded);
    }

    // For each triangle in front of the eye, occlude covered vertices.
    for &[i0, i1, i2] in faces {
        let (p0, p1, p2) = (projected[i0], projected[i1], projected[i2]);
        let tri = [p0.point, p1.point, p2.point];
        if p0.depth <= 0.0 || p1.depth <= 0.0 || p2.depth <= 0.0 {
            continue;
        }
        let bcs = match BarycentricCoordinateSystem::new(tri) {
            Some(bcs) => bcs,
            None => continue,
        };

        let center = (tri[0] + tri[1] + tri[2]) / 3.0;
        let radius = 1.1
            * max([
                (tri[0] - center).norm_squared(),
                (tri[1] - center).norm_squared(),
                (tri[2] - center).norm_squared(),
            ]);
        if !radius.is_finite() {
            continue;
        }

        let neighbours = kdtree
            .within_unsorted(center.as_ref(), radius, &squared_euclidean)
            .map_err(|e| {
                let desc = format!("failed to query vertex index: {:?}", e);
                Error::new(InconsistentState, desc)
            })?;
        for (_dist, &i) in neighbours {
            if i == i0 || i == i1 || i == i2 || occluded[i] {
                continue;
            }
            let ProjectedPoint { point, depth } = projected[i];
            if !containment_check(point, tri) {
                continue;
            }
            let bary = bcs.infer(point);
            let face_depth = bary[0] * p0.depth
                + bary[1] * p1.depth
                + bary[2] * p2.depth;
            if depth > face_depth + depth_epsilon {
                occluded[i] = true;
            }
        }
    }

    Ok(occluded)
}

pub fn face_visibility(
    vertex_visibility: &[bool],
    faces: &[[usize; 3]],
    criterion: Criterion,
) -> Vec<bool> {
    faces
        .iter()
        .map(|f| criterion.holds(f.iter().map(|&v| vertex_visibility[v])))
        .collect()
}

// Channel k of a texel covered by a single face holds the visibility of
// corner k. A texel on a seam between faces is observed when every face
// sharing it satisfies the criterion, and all its channels say so.
// Uncovered texels are all true.
pub fn corner_conditions(
    coverage: &UvCoverage,
    faces: &[[usize; 3]],
    vertex_visibility: &[bool],
    criterion: Criterion,
) -> TexelConditions {
    let (h, w) = (coverage.height, coverage.width);
    let corners = |face: usize| faces[face].map(|v| vertex_visibility[v]);
    let mut conditions = TexelConditions::from_elem((3, h, w), true);
    for i in 0..h {
        for j in 0..w {
            let flags = match coverage.faces(i, j) {
                [] => continue,
                &[face] => corners(face),
                shared => {
                    let seen = shared
                        .iter()
                        .all(|&face| criterion.holds(corners(face)));
                    [seen; 3]
                }
            };
            for (k, &flag) in flags.iter().enumerate() {
                conditions[(k, i, j)] = flag;
            }
        }
    }
    conditions
}

pub struct PartialTexture {
    pub texture: Tensor,
    pub visible: Array2<bool>,
}

impl PartialTexture {
    pub fn visible_share(&self) -> f64 {
        let visible = self.visible.iter().filter(|&&v| v).count();
        visible as f64 / self.visible.len().max(1) as f64
    }
}

pub fn composite(
    provisional: &Tensor,
    conditions: &TexelConditions,
    criterion: Criterion,
    sentinel: [f32; 3],
) -> Result<PartialTexture> {
    let (c, h, w) = provisional.dim();
    check_shape("provisional texture", &[c], &[3])?;
    let (_, ch, cw) = conditions.dim();
    check_shape("texel conditions", &[ch, cw], &[h, w])?;

    let visible = Array2::from_shape_fn((h, w), |(i, j)| {
        criterion.holds(conditions.slice(s![.., i, j]).iter().cloned())
    });

    let texture = Tensor::from_shape_fn((3, h, w), |(k, i, j)| {
        if visible[(i, j)] {
            provisional[(k, i, j)]
        } else {
            sentinel[k]
        }
    });

    Ok(PartialTexture { texture, visible })
}
