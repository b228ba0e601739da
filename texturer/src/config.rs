use std::path::Path;

use serde::Deserialize;

use crate::camera::{Projection, ViewRotation};
use crate::resize::ResizeMode;
use crate::segmentation::{TextureSpace, NUM_CANONICAL_CLASSES};
use crate::visibility::{Criterion, OcclusionParams};
use base::defs::{Error, ErrorKind::*, IntoResult, Result};
use base::util::fs;

#[derive(Clone, Copy, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct VisibilityConfig {
    pub projection: Projection,
    pub criterion: Criterion,
    pub normal_threshold: Option<f64>,
    pub depth_epsilon: f64,
}

impl Default for VisibilityConfig {
    fn default() -> Self {
        VisibilityConfig {
            projection: Projection::Orthographic,
            criterion: Criterion::All,
            normal_threshold: None,
            depth_epsilon: 1E-4,
        }
    }
}

impl VisibilityConfig {
    pub fn occlusion_params(&self) -> OcclusionParams {
        OcclusionParams {
            criterion: self.criterion,
            normal_threshold: self.normal_threshold,
            depth_epsilon: self.depth_epsilon,
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    pub square_size: usize,
    pub resize_mode: ResizeMode,
    pub crop_height: usize,
    pub crop_width: usize,
    pub uv_height: usize,
    pub uv_width: usize,
    pub num_classes: usize,
    pub estimator_scale: usize,
    pub focal_length: f64,
    pub render_size: usize,
    pub render_zoom: f64,
    pub views: Vec<ViewRotation>,
    pub visibility: VisibilityConfig,
    pub panel_gap: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            square_size: 224,
            resize_mode: ResizeMode::Pad,
            crop_height: 128,
            crop_width: 64,
            uv_height: 128,
            uv_width: 64,
            num_classes: NUM_CANONICAL_CLASSES,
            estimator_scale: 128,
            focal_length: 5000.0,
            render_size: 224,
            render_zoom: 0.8,
            views: vec![[0.0, 0.0, 0.0].into(), [0.0, 180.0, 0.0].into()],
            visibility: VisibilityConfig::default(),
            panel_gap: 8,
        }
    }
}

impl PipelineConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let data = fs::read_file(path)?;
        let config: PipelineConfig = serde_json::from_slice(&data)
            .res(|| format!("malformed config '{}'", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("square_size", self.square_size),
            ("crop_height", self.crop_height),
            ("crop_width", self.crop_width),
            ("uv_height", self.uv_height),
            ("uv_width", self.uv_width),
            ("render_size", self.render_size),
        ];
        for (name, value) in positive {
            if value == 0 {
                let desc = format!("config field '{}' must be positive", name);
                return Err(Error::new(InvalidArgument, desc));
            }
        }
        if self.crop_width > self.crop_height {
            let desc = format!(
                "crop width {} exceeds crop height {}",
                self.crop_width, self.crop_height
            );
            return Err(Error::new(InvalidArgument, desc));
        }
        if self.num_classes < 2 {
            let desc = "config field 'num_classes' must be at least 2";
            return Err(Error::new(InvalidArgument, desc.to_string()));
        }
        Ok(())
    }

    pub fn texture_space(&self) -> TextureSpace {
        TextureSpace {
            crop_height: self.crop_height,
            crop_width: self.crop_width,
            num_classes: self.num_classes,
        }
    }
}
