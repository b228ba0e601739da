use std::path::PathBuf;

use log::debug;
use serde::Deserialize;

use crate::geometry::{Matrix3, Point3, Vector3};
use crate::tensor::{check_shape, Tensor};
use base::defs::{Error, ErrorKind::*, Result};
use base::util::fs;

// Body shape, pose and camera recovered from one image. Read-only once
// produced.
#[derive(Clone, Debug, PartialEq)]
pub struct BodyEstimate {
    pub vertices: Vec<Point3>,
    pub camera_translation: Vector3,
    pub rotations: Vec<Matrix3>,
    pub shape: Vec<f64>,
}

pub struct EstimateRequest<'a> {
    pub name: &'a str,
    // Square (3, S, S) image in [0, 1].
    pub image: &'a Tensor,
    // Side of the crop the estimator works on.
    pub scale: usize,
}

pub trait BodyEstimator {
    // Fails with EstimationFailure when no body can be recovered.
    fn estimate(&mut self, request: &EstimateRequest) -> Result<BodyEstimate>;
}

#[derive(Deserialize)]
struct EstimateFile {
    vertices: Vec<[f64; 3]>,
    camera_translation: [f64; 3],
    #[serde(default)]
    rotations: Vec<[[f64; 3]; 3]>,
    #[serde(default)]
    shape: Vec<f64>,
}

// Reads estimates computed ahead of time, one JSON file per image named
// '<stem>_smpl.json'.
pub struct PrecomputedEstimator {
    pub dir: PathBuf,
    pub num_vertices: usize,
    pub square_size: usize,
}

impl PrecomputedEstimator {
    pub fn estimate_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}_smpl.json", name))
    }
}

impl BodyEstimator for PrecomputedEstimator {
    fn estimate(&mut self, request: &EstimateRequest) -> Result<BodyEstimate> {
        let (c, h, w) = request.image.dim();
        let s = self.square_size;
        check_shape("estimator input", &[c, h, w], &[3, s, s])?;

        let path = self.estimate_path(request.name);
        let failure = |desc: String| Error::new(EstimationFailure, desc);

        let data = fs::read_file(&path).map_err(|e| failure(e.to_string()))?;
        let file: EstimateFile = serde_json::from_slice(&data).map_err(|e| {
            failure(format!("malformed estimate '{}': {}", path.display(), e))
        })?;

        if file.vertices.len() != self.num_vertices {
            return Err(failure(format!(
                "estimate '{}' has {} vertices, expected {}",
                path.display(),
                file.vertices.len(),
                self.num_vertices
            )));
        }
        if file.vertices.iter().flatten().any(|c| !c.is_finite()) {
            return Err(failure(format!(
                "estimate '{}' has non-finite vertices",
                path.display()
            )));
        }

        debug!(
            "read estimate '{}' with {} pose rotations",
            path.display(),
            file.rotations.len()
        );

        let [tx, ty, tz] = file.camera_translation;
        Ok(BodyEstimate {
            vertices: file
                .vertices
                .iter()
                .map(|&[x, y, z]| Point3::new(x, y, z))
                .collect(),
            camera_translation: Vector3::new(tx, ty, tz),
            rotations: file
                .rotations
                .iter()
                .map(|r| Matrix3::from_fn(|i, j| r[i][j]))
                .collect(),
            shape: file.shape,
        })
    }
}
