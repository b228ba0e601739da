use crate::estimator::BodyEstimate;
use crate::flow::{FlowInputs, TextureFlowPredictor};
use crate::grid::coordinate_grid;
use crate::tensor::{check_shape, concat_channels, from_signed, Tensor};
use base::defs::Result;

// Bilinear sampling of the input at normalized [x, y] flow locations with
// align_corners = false. Taps outside the input contribute zero.
pub fn grid_sample(input: &Tensor, flow: &Tensor) -> Result<Tensor> {
    let (c, h, w) = input.dim();
    let (fc, oh, ow) = flow.dim();
    check_shape("flow field channels", &[fc], &[2])?;

    let tap = |k: usize, y: i64, x: i64| {
        if y < 0 || x < 0 || y >= h as i64 || x >= w as i64 {
            0.0
        } else {
            input[(k, y as usize, x as usize)]
        }
    };

    let mut output = Tensor::zeros((c, oh, ow));
    for i in 0..oh {
        for j in 0..ow {
            let (gx, gy) = (flow[(0, i, j)], flow[(1, i, j)]);
            let x = ((gx + 1.0) * w as f32 - 1.0) / 2.0;
            let y = ((gy + 1.0) * h as f32 - 1.0) / 2.0;
            // No tap of a location outside (-1, w) x (-1, h) is inside.
            let inside = |v: f32, len: usize| v > -1.0 && v < len as f32;
            if !inside(x, w) || !inside(y, h) {
                continue;
            }
            let (x0, y0) = (x.floor(), y.floor());
            let (dx, dy) = (x - x0, y - y0);
            let (x0, y0) = (x0 as i64, y0 as i64);
            for k in 0..c {
                let top =
                    (1.0 - dx) * tap(k, y0, x0) + dx * tap(k, y0, x0 + 1);
                let bottom = (1.0 - dx) * tap(k, y0 + 1, x0)
                    + dx * tap(k, y0 + 1, x0 + 1);
                output[(k, i, j)] = (1.0 - dy) * top + dy * bottom;
            }
        }
    }
    Ok(output)
}

// Turns a partial observed image into a UV-space texture by flow-based
// sampling.
pub struct UvSampler {
    target: Tensor,
    coords: Tensor,
}

impl UvSampler {
    pub fn new(target: Tensor, crop_height: usize, crop_width: usize) -> Self {
        UvSampler {
            target,
            coords: coordinate_grid(crop_height, crop_width),
        }
    }

    // Provisional texture of the target's resolution in [0, 1].
    pub fn sample(
        &self,
        predictor: &mut dyn TextureFlowPredictor,
        image_crop: &Tensor,
        seg_feature: &Tensor,
        estimate: &BodyEstimate,
    ) -> Result<Tensor> {
        let source = concat_channels(
            "segmentation feature",
            &[image_crop.view(), seg_feature.view()],
        )?;
        let value = concat_channels(
            "image crop",
            &[self.coords.view(), image_crop.view()],
        )?;

        let flow = predictor.predict(&FlowInputs {
            target: &self.target,
            source: &source,
            value: &value,
            estimate,
        })?;

        let (_, th, tw) = self.target.dim();
        let (fc, fh, fw) = flow.dim();
        check_shape("flow field", &[fc, fh, fw], &[2, th, tw])?;

        Ok(from_signed(&grid_sample(image_crop, &flow)?))
    }
}
