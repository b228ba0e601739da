use std::rc::Rc;

use crate::camera::ImageCamera;
use crate::estimator::BodyEstimate;
use crate::geometry::{interpolate, Point3};
use crate::model::{BodyModel, UvCoverage};
use crate::tensor::{check_shape, Tensor};
use base::defs::Result;

// Flow value that samples nothing under zero padding.
pub const NO_FLOW: f32 = -2.0;

pub struct FlowInputs<'a> {
    // UV target embedding (3, Ht, Wt) in [-1, 1].
    pub target: &'a Tensor,
    // Image crop and segmentation feature, (4, h, w).
    pub source: &'a Tensor,
    // Coordinate grid and image crop, (5, h, w).
    pub value: &'a Tensor,
    pub estimate: &'a BodyEstimate,
}

pub trait TextureFlowPredictor {
    // Returns a (2, Ht, Wt) field of normalized [x, y] crop locations.
    fn predict(&mut self, inputs: &FlowInputs) -> Result<Tensor>;
}

#[derive(Clone, Copy, Debug)]
pub struct CropGeometry {
    pub square_size: usize,
    pub crop_height: usize,
    pub crop_width: usize,
}

impl CropGeometry {
    // Square image pixel [i, j] to the [x, y] frame of the column crop.
    pub fn normalize(&self, pixel: [f64; 2]) -> [f64; 2] {
        let s = self.square_size as f64;
        let (ch, cw) = (self.crop_height as f64, self.crop_width as f64);
        let offset = self.crop_height.saturating_sub(self.crop_width) / 2;
        let col = pixel[1] * ch / s - offset as f64;
        [2.0 * col / cw - 1.0, 2.0 * pixel[0] / s - 1.0]
    }
}

// Transfers texture without learning: every covered texel looks up the
// pixel its estimated surface point projects to.
pub struct ProjectionFlowPredictor {
    pub model: Rc<BodyModel>,
    pub coverage: Rc<UvCoverage>,
    pub geometry: CropGeometry,
    pub focal_length: f64,
}

impl TextureFlowPredictor for ProjectionFlowPredictor {
    fn predict(&mut self, inputs: &FlowInputs) -> Result<Tensor> {
        let estimate = inputs.estimate;
        self.model.check_vertices(&estimate.vertices)?;

        let (h, w) = (self.coverage.height, self.coverage.width);
        let (_, th, tw) = inputs.target.dim();
        check_shape("UV target", &[th, tw], &[h, w])?;
        let crop = [self.geometry.crop_height, self.geometry.crop_width];
        let (sc, sh, sw) = inputs.source.dim();
        check_shape("source stack", &[sc, sh, sw], &[4, crop[0], crop[1]])?;
        let (vc, vh, vw) = inputs.value.dim();
        check_shape("value stack", &[vc, vh, vw], &[5, crop[0], crop[1]])?;

        let camera = ImageCamera {
            focal_length: self.focal_length,
            size: self.geometry.square_size as f64,
            translation: estimate.camera_translation,
        };

        let mut flow = Tensor::from_elem((2, h, w), NO_FLOW);
        for i in 0..h {
            for j in 0..w {
                let texel = match self.coverage.primary(i, j) {
                    Some(texel) => texel,
                    None => continue,
                };
                let [p0, p1, p2] =
                    self.model.face_points(&estimate.vertices, texel.face);
                let coords =
                    interpolate(texel.bary, [p0.coords, p1.coords, p2.coords]);
                let projected = camera.project(&Point3::from(coords));
                if projected.depth <= 0.0 {
                    continue;
                }
                let point = [projected.point[0], projected.point[1]];
                let [x, y] = self.geometry.normalize(point);
                flow[(0, i, j)] = x as f32;
                flow[(1, i, j)] = y as f32;
            }
        }
        Ok(flow)
    }
}
