// Body-part label maps and their adaptation to the flow predictor's
// source-crop convention.

use std::str::FromStr;

use image::GrayImage;
use ndarray::{s, Array2};
use serde::Deserialize;

use crate::tensor::{
    check_shape, fit_width, resize_nearest, to_signed, Tensor,
};
use base::defs::{Error, ErrorKind::*, Result};

pub type SegmentationMap = Array2<u8>;

// Raw SMPL-style part ids (0 is background) to the canonical classes.
pub const SMPL_TO_CANONICAL: [u8; 13] = [0, 3, 3, 1, 5, 5, 2, 4, 4, 6, 6, 7, 7];

pub const NUM_CANONICAL_CLASSES: usize = 8;

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LabelTaxonomy {
    Smpl,
    Canonical,
}

impl LabelTaxonomy {
    pub fn num_classes(self) -> usize {
        match self {
            LabelTaxonomy::Smpl => SMPL_TO_CANONICAL.len(),
            LabelTaxonomy::Canonical => NUM_CANONICAL_CLASSES,
        }
    }
}

impl FromStr for LabelTaxonomy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "smpl" => Ok(LabelTaxonomy::Smpl),
            "canonical" => Ok(LabelTaxonomy::Canonical),
            _ => Err(Error::new(
                InvalidArgument,
                format!(
                    "unknown label taxonomy '{}', can be 'smpl' or 'canonical'",
                    s
                ),
            )),
        }
    }
}

pub fn check_labels(
    labels: &SegmentationMap,
    taxonomy: LabelTaxonomy,
) -> Result<()> {
    let num_classes = taxonomy.num_classes();
    if let Some(&label) = labels.iter().find(|&&l| l as usize >= num_classes) {
        let desc = format!(
            "label {} is outside of the {}-class {:?} taxonomy",
            label, num_classes, taxonomy
        );
        return Err(Error::new(MalformedData, desc));
    }
    Ok(())
}

pub fn canonical_labels(
    labels: &SegmentationMap,
    taxonomy: LabelTaxonomy,
) -> Result<SegmentationMap> {
    check_labels(labels, taxonomy)?;
    Ok(match taxonomy {
        LabelTaxonomy::Smpl => labels.mapv(|l| SMPL_TO_CANONICAL[l as usize]),
        LabelTaxonomy::Canonical => labels.clone(),
    })
}

pub fn labels_from_image(image: &GrayImage) -> SegmentationMap {
    let (w, h) = image.dimensions();
    Array2::from_shape_fn((h as usize, w as usize), |(i, j)| {
        image.get_pixel(j as u32, i as u32)[0]
    })
}

pub fn labels_to_image(labels: &SegmentationMap) -> GrayImage {
    let (h, w) = labels.dim();
    GrayImage::from_fn(w as u32, h as u32, |x, y| {
        image::Luma([labels[(y as usize, x as usize)]])
    })
}

// Spatial convention of the flow predictor's inputs.
#[derive(Clone, Copy, Debug)]
pub struct TextureSpace {
    pub crop_height: usize,
    pub crop_width: usize,
    pub num_classes: usize,
}

impl TextureSpace {
    pub fn crop_offset(&self) -> usize {
        self.crop_height.saturating_sub(self.crop_width) / 2
    }

    // Label map to a single-channel feature in [-1, 1] of crop shape.
    pub fn adapt_segmentation(
        &self,
        labels: &SegmentationMap,
        taxonomy: LabelTaxonomy,
    ) -> Result<Tensor> {
        let canonical = canonical_labels(labels, taxonomy)?;
        let denom = (self.num_classes.max(2) - 1) as f32;
        let (h, w) = canonical.dim();
        if h == 0 {
            let desc = "segmentation map is empty".to_string();
            return Err(Error::new(MalformedData, desc));
        }

        let parts = canonical
            .mapv(|l| l as f32 / denom)
            .into_shape((1, h, w))
            .map_err(|e| {
                let desc = "failed to reshape segmentation map".to_string();
                Error::with_source(ShapeMismatch, desc, e)
            })?;

        let height = self.crop_height;
        let width = (height as f64 * w as f64 / h as f64) as usize;
        let parts = resize_nearest(&parts, height, width);
        let parts = fit_width(&parts, self.crop_width);
        Ok(to_signed(&parts))
    }

    // Square [0, 1] image to the fixed center column crop in [-1, 1].
    pub fn adapt_image(&self, image: &Tensor) -> Result<Tensor> {
        let (c, _, _) = image.dim();
        check_shape("source image channels", &[c], &[3])?;
        let side = self.crop_height;
        let resized = resize_nearest(&to_signed(image), side, side);
        let start = self.crop_offset();
        let end = (start + self.crop_width).min(side);
        Ok(resized.slice(s![.., .., start..end]).to_owned())
    }

    pub fn check_pair(
        &self,
        image: &Tensor,
        segmentation: &Tensor,
    ) -> Result<()> {
        let expected = [self.crop_height, self.crop_width];
        let (_, h, w) = image.dim();
        check_shape("adapted image", &[h, w], &expected)?;
        let (_, h, w) = segmentation.dim();
        check_shape("adapted segmentation", &[h, w], &expected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use base::assert_eq_f32;

    fn space() -> TextureSpace {
        TextureSpace {
            crop_height: 128,
            crop_width: 64,
            num_classes: NUM_CANONICAL_CLASSES,
        }
    }

    #[test]
    fn test_remap_is_total_and_keeps_background() {
        let raw = Array2::from_shape_fn((1, 13), |(_, j)| j as u8);
        let canonical = canonical_labels(&raw, LabelTaxonomy::Smpl).unwrap();
        assert_eq!(canonical[(0, 0)], 0);
        for &l in canonical.iter() {
            assert!((l as usize) < NUM_CANONICAL_CLASSES);
        }
        assert_eq!(
            canonical.into_raw_vec(),
            vec![0, 3, 3, 1, 5, 5, 2, 4, 4, 6, 6, 7, 7]
        );
    }

    #[test]
    fn test_remap_rejects_unknown_labels() {
        let raw = Array2::from_elem((2, 2), 13);
        let err = canonical_labels(&raw, LabelTaxonomy::Smpl).unwrap_err();
        assert_eq!(err.kind, MalformedData);

        let canonical = Array2::from_elem((2, 2), 8);
        let res = canonical_labels(&canonical, LabelTaxonomy::Canonical);
        assert!(res.is_err());
    }

    #[test]
    fn test_adapt_square_segmentation_crops_center() {
        // 224x224 resizes to 128x128, columns [32, 96) survive.
        let mut labels = Array2::zeros((224, 224));
        for i in 0..224 {
            for j in 0..224 {
                labels[(i, j)] = if j < 112 { 1 } else { 7 };
            }
        }
        let seg = space()
            .adapt_segmentation(&labels, LabelTaxonomy::Canonical)
            .unwrap();
        assert_eq!(seg.dim(), (1, 128, 64));
        assert_eq_f32!(seg[(0, 0, 0)], 2.0 / 7.0 - 1.0);
        assert_eq_f32!(seg[(0, 127, 31)], 2.0 / 7.0 - 1.0);
        assert_eq_f32!(seg[(0, 64, 32)], 1.0);
    }

    #[test]
    fn test_adapt_narrow_segmentation_pads_trailing() {
        // 256x101 resizes to 128x50, padded 7 before and 7 after.
        let labels = Array2::from_elem((256, 101), 7);
        let seg = space()
            .adapt_segmentation(&labels, LabelTaxonomy::Canonical)
            .unwrap();
        assert_eq!(seg.dim(), (1, 128, 64));
        assert_eq_f32!(seg[(0, 10, 6)], -1.0);
        assert_eq_f32!(seg[(0, 10, 7)], 1.0);
        assert_eq_f32!(seg[(0, 10, 56)], 1.0);
        assert_eq_f32!(seg[(0, 10, 57)], -1.0);

        // 128x51 is not resized, the odd margin of 13 puts 7 after.
        let labels = Array2::from_elem((128, 51), 7);
        let seg = space()
            .adapt_segmentation(&labels, LabelTaxonomy::Canonical)
            .unwrap();
        assert_eq_f32!(seg[(0, 0, 5)], -1.0);
        assert_eq_f32!(seg[(0, 0, 6)], 1.0);
        assert_eq_f32!(seg[(0, 0, 56)], 1.0);
        assert_eq_f32!(seg[(0, 0, 57)], -1.0);
    }

    #[test]
    fn test_adapt_smpl_segmentation_remaps() {
        let labels = Array2::from_elem((224, 224), 3);
        let seg = space()
            .adapt_segmentation(&labels, LabelTaxonomy::Smpl)
            .unwrap();
        assert_eq_f32!(seg[(0, 50, 50)], 2.0 / 7.0 - 1.0);
    }

    #[test]
    fn test_adapt_image_takes_center_columns() {
        let image = Tensor::from_shape_fn((3, 224, 224), |(_, _, j)| {
            j as f32 / 223.0
        });
        let crop = space().adapt_image(&image).unwrap();
        assert_eq!(crop.dim(), (3, 128, 64));
        // Column 0 of the crop is column 32 of the 128 resize, i.e. 56.
        assert_eq_f32!(crop[(0, 0, 0)], 56.0 / 223.0 * 2.0 - 1.0);
        let seg = Tensor::zeros((1, 128, 64));
        space().check_pair(&crop, &seg).unwrap();
    }

    #[test]
    fn test_check_pair_mismatch() {
        let image = Tensor::zeros((3, 128, 64));
        let segmentation = Tensor::zeros((1, 64, 64));
        let err = space().check_pair(&image, &segmentation).unwrap_err();
        assert_eq!(err.kind, ShapeMismatch);
    }

    #[test]
    fn test_label_image_round_trip() {
        let labels = Array2::from_shape_fn((3, 2), |(i, j)| (i * 2 + j) as u8);
        let image = labels_to_image(&labels);
        assert_eq!(image.dimensions(), (2, 3));
        assert_eq!(labels_from_image(&image), labels);
    }
}
