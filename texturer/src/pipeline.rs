// Per-image texture reconstruction and the batch loop around it.

use std::path::{Path, PathBuf};
use std::rc::Rc;

use image::{DynamicImage, GenericImage, Rgb, RgbImage};
use log::{debug, error, info, warn};

use crate::camera::ViewCamera;
use crate::config::PipelineConfig;
use crate::estimator::{BodyEstimate, BodyEstimator, EstimateRequest};
use crate::flow::{CropGeometry, ProjectionFlowPredictor, TextureFlowPredictor};
use crate::model::{template_encoding, BodyModel, UvCoverage};
use crate::picture::{
    is_image_path, read_gray_image, read_rgb_image, write_image,
};
use crate::render::{PartSegmenter, Renderer, Rendering, SoftwareRenderer};
use crate::resize::{resize_to_height, resize_to_square};
use crate::sampler::UvSampler;
use crate::segmentation::{labels_from_image, LabelTaxonomy, SegmentationMap};
use crate::tensor::{check_shape, image_to_tensor, tensor_to_image, Tensor};
use crate::visibility::{
    composite, unknown_color, OcclusionOracle, PartialTexture,
    VisibilityOracle, UNKNOWN_COLOR,
};
use base::defs::{Error, ErrorKind::*, IntoResult, Result};
use base::util::fs;

// Suffixes of the files this program writes next to its inputs.
const OUTPUT_SUFFIXES: [&str; 3] = ["_texture", "_uvmap", "_seg"];

#[derive(Clone, Debug, PartialEq)]
pub struct InputItem {
    pub path: PathBuf,
    pub name: String,
    pub seg_path: Option<PathBuf>,
}

impl InputItem {
    fn new(path: PathBuf, seg_path: Option<PathBuf>) -> Self {
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_string();
        InputItem {
            path,
            name,
            seg_path,
        }
    }

    fn is_output(&self) -> bool {
        OUTPUT_SUFFIXES.iter().any(|s| self.name.ends_with(s))
    }

    pub fn texture_path(&self, save_dir: &Path) -> PathBuf {
        let ext = self
            .path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("png");
        save_dir.join(format!("{}_texture.{}", self.name, ext))
    }

    pub fn uvmap_path(&self, save_dir: &Path) -> PathBuf {
        save_dir.join(format!("{}_uvmap.png", self.name))
    }

    pub fn seg_output_path(&self, save_dir: &Path) -> PathBuf {
        save_dir.join(format!("{}_seg.png", self.name))
    }
}

// A single image file, or the image files of a directory sorted by name.
pub fn collect_inputs(
    img_path: &Path,
    seg_path: Option<&Path>,
) -> Result<Vec<InputItem>> {
    if img_path.is_file() {
        let mut item = InputItem::new(img_path.to_path_buf(), None);
        item.seg_path = seg_path.map(|path| {
            if path.is_dir() {
                path.join(format!("{}_seg.png", item.name))
            } else {
                path.to_path_buf()
            }
        });
        return Ok(vec![item]);
    }

    if !img_path.is_dir() {
        let desc =
            format!("image path '{}' does not exist", img_path.display());
        return Err(Error::new(InvalidArgument, desc));
    }
    if let Some(seg_dir) = seg_path {
        if !seg_dir.is_dir() {
            let desc = format!(
                "segmentation path '{}' must be a directory",
                seg_dir.display()
            );
            return Err(Error::new(InvalidArgument, desc));
        }
    }

    let err_fn =
        || format!("failed to read directory '{}'", img_path.display());
    let mut paths = vec![];
    for entry in std::fs::read_dir(img_path).res(err_fn)? {
        let path = entry.res(err_fn)?.path();
        if path.is_file() && is_image_path(&path) {
            paths.push(path);
        }
    }
    paths.sort();

    Ok(paths
        .into_iter()
        .map(|path| {
            let mut item = InputItem::new(path, None);
            item.seg_path =
                seg_path.map(|dir| dir.join(format!("{}_seg.png", item.name)));
            item
        })
        .filter(|item| !item.is_output())
        .collect())
}

// Input image and its tensor in the estimator's square frame.
pub struct ImageContext {
    pub name: String,
    pub original: RgbImage,
    // (3, S, S) in [0, 1].
    pub tensor: Tensor,
}

impl ImageContext {
    pub fn read(item: &InputItem, config: &PipelineConfig) -> Result<Self> {
        let original = read_rgb_image(&item.path)?;
        let size = config.square_size as u32;
        let square = resize_to_square(&original, size, config.resize_mode);
        let tensor = image_to_tensor(&square);
        Ok(ImageContext {
            name: item.name.clone(),
            original,
            tensor,
        })
    }
}

// None when the estimator gives up on the image.
pub fn estimate_body(
    estimator: &mut dyn BodyEstimator,
    context: &ImageContext,
    config: &PipelineConfig,
) -> Result<Option<BodyEstimate>> {
    let request = EstimateRequest {
        name: &context.name,
        image: &context.tensor,
        scale: config.estimator_scale,
    };
    match estimator.estimate(&request) {
        Ok(estimate) => Ok(Some(estimate)),
        Err(err) if err.is_recoverable() => {
            info!("skipping '{}': {}", context.name, err);
            Ok(None)
        }
        Err(err) => Err(err),
    }
}

pub struct Collaborators {
    pub estimator: Box<dyn BodyEstimator>,
    pub predictor: Box<dyn TextureFlowPredictor>,
    pub renderer: Box<dyn Renderer>,
    pub segmenter: Box<dyn PartSegmenter>,
    pub oracle: Box<dyn VisibilityOracle>,
}

impl Collaborators {
    // Non-learned backends over the body model template.
    pub fn with_model(
        config: &PipelineConfig,
        model: Rc<BodyModel>,
        coverage: Rc<UvCoverage>,
        estimator: Box<dyn BodyEstimator>,
    ) -> Self {
        let predictor = ProjectionFlowPredictor {
            model: model.clone(),
            coverage: coverage.clone(),
            geometry: CropGeometry {
                square_size: config.square_size,
                crop_height: config.crop_height,
                crop_width: config.crop_width,
            },
            focal_length: config.focal_length,
        };
        let renderer = SoftwareRenderer {
            model: model.clone(),
            size: config.render_size,
            focal_length: config.focal_length * config.render_size as f64
                / config.square_size as f64,
            zoom: config.render_zoom,
        };
        let segmenter = SoftwareRenderer {
            model,
            size: config.square_size,
            focal_length: config.focal_length,
            zoom: 1.0,
        };
        let oracle = OcclusionOracle::new(
            coverage,
            config.visibility.occlusion_params(),
        );
        Collaborators {
            estimator,
            predictor: Box::new(predictor),
            renderer: Box::new(renderer),
            segmenter: Box::new(segmenter),
            oracle: Box::new(oracle),
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct TextureOptions {
    pub seg_taxonomy: LabelTaxonomy,
    pub save_uvmap: bool,
}

impl Default for TextureOptions {
    fn default() -> Self {
        TextureOptions {
            seg_taxonomy: LabelTaxonomy::Canonical,
            save_uvmap: false,
        }
    }
}

pub struct TextureOutput {
    pub original: RgbImage,
    pub partial: PartialTexture,
    pub renders: Vec<Rendering>,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct RunSummary {
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
}

pub struct Texturer {
    config: PipelineConfig,
    faces: Vec<[usize; 3]>,
    sampler: UvSampler,
    collaborators: Collaborators,
    options: TextureOptions,
}

impl Texturer {
    pub fn new(
        config: PipelineConfig,
        faces: Vec<[usize; 3]>,
        target: Tensor,
        collaborators: Collaborators,
        options: TextureOptions,
    ) -> Result<Self> {
        config.validate()?;
        let (c, h, w) = target.dim();
        check_shape(
            "UV target",
            &[c, h, w],
            &[3, config.uv_height, config.uv_width],
        )?;
        let sampler =
            UvSampler::new(target, config.crop_height, config.crop_width);
        Ok(Texturer {
            config,
            faces,
            sampler,
            collaborators,
            options,
        })
    }

    // Builds the non-learned backends and the UV target for the model.
    pub fn with_model(
        config: PipelineConfig,
        model: BodyModel,
        uv_encoding: Option<Tensor>,
        estimator: Box<dyn BodyEstimator>,
        options: TextureOptions,
    ) -> Result<Self> {
        let model = Rc::new(model);
        let coverage = Rc::new(UvCoverage::new(
            &model,
            config.uv_height,
            config.uv_width,
        ));
        debug!(
            "UV layout covers {:.1}% of texels",
            coverage.covered_share() * 100.0
        );

        let target = match uv_encoding {
            Some(encoding) => encoding,
            None => template_encoding(&model, &coverage),
        };
        let faces = model.faces.clone();
        let collaborators =
            Collaborators::with_model(&config, model, coverage, estimator);
        Texturer::new(config, faces, target, collaborators, options)
    }

    fn segmentation(
        &mut self,
        item: &InputItem,
        estimate: &BodyEstimate,
    ) -> Result<(SegmentationMap, LabelTaxonomy)> {
        if let Some(path) = &item.seg_path {
            if path.is_file() {
                let labels = labels_from_image(&read_gray_image(path)?);
                // Supplied maps must share the square image's frame.
                let (h, w) = labels.dim();
                let size = self.config.square_size;
                check_shape("segmentation map", &[h, w], &[size, size])?;
                return Ok((labels, self.options.seg_taxonomy));
            }
            warn!(
                "segmentation '{}' not found, rendering it instead",
                path.display()
            );
        }
        let labels = self
            .collaborators
            .segmenter
            .segment(&estimate.vertices, estimate.camera_translation)?;
        Ok((labels, LabelTaxonomy::Smpl))
    }

    // None when the image is skipped.
    pub fn process_image(
        &mut self,
        item: &InputItem,
    ) -> Result<Option<TextureOutput>> {
        let context = ImageContext::read(item, &self.config)?;
        let estimator = self.collaborators.estimator.as_mut();
        let estimate = match estimate_body(estimator, &context, &self.config)? {
            Some(estimate) => estimate,
            None => return Ok(None),
        };

        let (labels, taxonomy) = self.segmentation(item, &estimate)?;
        let space = self.config.texture_space();
        let seg_feature = space.adapt_segmentation(&labels, taxonomy)?;
        let image_crop = space.adapt_image(&context.tensor)?;
        space.check_pair(&image_crop, &seg_feature)?;

        let provisional = self.sampler.sample(
            self.collaborators.predictor.as_mut(),
            &image_crop,
            &seg_feature,
            &estimate,
        )?;

        let visibility_config = &self.config.visibility;
        let camera = ViewCamera::new(
            estimate.camera_translation,
            visibility_config.projection,
        );
        let visibility = self.collaborators.oracle.texel_conditions(
            &estimate.vertices,
            &self.faces,
            &camera,
        )?;
        let visible_faces = visibility.faces.iter().filter(|&&f| f).count();
        debug!(
            "{} of {} faces are visible",
            visible_faces,
            visibility.faces.len()
        );

        let partial = composite(
            &provisional,
            &visibility.conditions,
            visibility_config.criterion,
            unknown_color(),
        )?;
        debug!(
            "{:.1}% of texels are visible",
            partial.visible_share() * 100.0
        );

        let mut renders = vec![];
        for view in &self.config.views {
            renders.push(self.collaborators.renderer.render(
                &estimate.vertices,
                estimate.camera_translation,
                &partial.texture,
                view,
            )?);
        }

        Ok(Some(TextureOutput {
            original: context.original,
            partial,
            renders,
        }))
    }

    pub fn write_output(
        &self,
        item: &InputItem,
        output: &TextureOutput,
        save_dir: &Path,
    ) -> Result<()> {
        let texture = tensor_to_image(&output.partial.texture)?;
        let height = self.config.render_size as u32;
        let input = resize_to_height(&output.original, height);
        let mut panels = vec![input, texture.clone()];
        for render in &output.renders {
            panels.push(tensor_to_image(&render.rgb)?);
        }

        let composite = compose_panels(&panels, self.config.panel_gap)?;
        let path = item.texture_path(save_dir);
        write_image(&path, DynamicImage::ImageRgb8(composite))?;
        debug!("wrote '{}'", path.display());

        if self.options.save_uvmap {
            let path = item.uvmap_path(save_dir);
            write_image(&path, DynamicImage::ImageRgb8(texture))?;
        }
        Ok(())
    }

    pub fn run(&mut self, items: &[InputItem], save_dir: &Path) -> RunSummary {
        let mut summary = RunSummary::default();
        for (n, item) in items.iter().enumerate() {
            info!("[{}/{}] {}", n + 1, items.len(), item.path.display());
            let res = self.process_image(item).and_then(|output| match output {
                Some(output) => {
                    self.write_output(item, &output, save_dir).map(|_| true)
                }
                None => Ok(false),
            });
            match res {
                Ok(true) => summary.processed += 1,
                Ok(false) => summary.skipped += 1,
                Err(err) => {
                    let path = item.path.display();
                    error!("failed to process '{}': {}", path, err);
                    summary.failed += 1;
                }
            }
        }
        info!(
            "processed {}, skipped {}, failed {}",
            summary.processed, summary.skipped, summary.failed
        );
        summary
    }
}

// Panels side by side, vertically centered on a white canvas.
pub fn compose_panels(panels: &[RgbImage], gap: u32) -> Result<RgbImage> {
    let width = panels.iter().map(|p| p.width()).sum::<u32>()
        + gap * panels.len().saturating_sub(1) as u32;
    let height = panels.iter().map(|p| p.height()).max().unwrap_or_default();

    let mut canvas = RgbImage::from_pixel(width, height, Rgb(UNKNOWN_COLOR));
    let mut x = 0;
    for panel in panels {
        let y = (height - panel.height()) / 2;
        canvas.copy_from(panel, x, y).map_err(|e| {
            let desc = "failed to compose output panels".to_string();
            Error::with_source(ImageError, desc, e)
        })?;
        x += panel.width() + gap;
    }
    Ok(canvas)
}

// Where outputs go when no save path is given.
pub fn default_save_dir(img_path: &Path) -> PathBuf {
    if img_path.is_dir() {
        img_path.to_path_buf()
    } else {
        img_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| ".".as_ref())
            .to_path_buf()
    }
}

pub fn prepare_save_dir(save_dir: &Path) -> Result<()> {
    fs::create_dir(save_dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    use image::{GrayImage, Luma};
    use tempfile::tempdir;

    use crate::geometry::Vector3;
    use crate::model::tests::quad_model;
    use base::assert_eq_f32;
    use base::util::test::MethodMock;

    struct EstimatorMock {
        estimate: MethodMock<String, Result<BodyEstimate>>,
    }

    impl BodyEstimator for EstimatorMock {
        fn estimate(
            &mut self,
            request: &EstimateRequest,
        ) -> Result<BodyEstimate> {
            self.estimate.call(request.name.to_string())
        }
    }

    // The quad seen head-on, filling the middle of the square image.
    fn quad_estimate() -> BodyEstimate {
        BodyEstimate {
            vertices: quad_model().vertices,
            camera_translation: Vector3::new(-0.5, -0.5, 50.0),
            rotations: vec![],
            shape: vec![],
        }
    }

    fn failure() -> Result<BodyEstimate> {
        let desc = "no body found".to_string();
        Err(Error::new(EstimationFailure, desc))
    }

    fn texturer(rets: Vec<Result<BodyEstimate>>) -> Texturer {
        let estimator = EstimatorMock {
            estimate: MethodMock::with_rets(rets),
        };
        Texturer::with_model(
            PipelineConfig::default(),
            quad_model(),
            None,
            Box::new(estimator),
            TextureOptions::default(),
        )
        .unwrap()
    }

    fn write_input(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        let image = RgbImage::from_fn(300, 200, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, 128])
        });
        write_image(&path, DynamicImage::ImageRgb8(image)).unwrap();
        path
    }

    fn write_labels(path: &Path, width: u32, height: u32) {
        let seg = GrayImage::from_pixel(width, height, Luma([1]));
        write_image(path, DynamicImage::ImageLuma8(seg)).unwrap();
    }

    #[test]
    fn test_texture_with_supplied_segmentation() {
        let dir = tempdir().unwrap();
        let path = write_input(dir.path(), "person.png");
        let seg_path = dir.path().join("person_seg.png");
        write_labels(&seg_path, 224, 224);

        let items = collect_inputs(&path, Some(&seg_path)).unwrap();
        assert_eq!(items.len(), 1);
        let mut texturer = texturer(vec![Ok(quad_estimate())]);
        let output = texturer.process_image(&items[0]).unwrap().unwrap();

        assert_eq!(output.partial.texture.dim(), (3, 128, 64));
        for &v in output.partial.texture.iter() {
            assert!((0.0..=1.0).contains(&v));
        }
        assert_eq!(output.renders.len(), 2);
        assert_eq!(output.renders[0].rgb.dim(), output.renders[1].rgb.dim());
        assert_eq!(output.renders[0].rgb.dim(), (3, 224, 224));
        assert_eq!(output.original.dimensions(), (300, 200));

        // Nothing occludes the flat quad.
        assert_eq_f32!(output.partial.visible_share(), 1.0);
        let sum: f32 = output.renders[0].mask.sum();
        assert!(sum > 0.0);
    }

    #[test]
    fn test_segmentation_must_match_square_frame() {
        let dir = tempdir().unwrap();
        let path = write_input(dir.path(), "person.png");
        let seg_path = dir.path().join("person_seg.png");
        write_labels(&seg_path, 300, 200);

        let items = collect_inputs(&path, Some(&seg_path)).unwrap();
        let mut texturer = texturer(vec![Ok(quad_estimate())]);
        let err = texturer.process_image(&items[0]).err().unwrap();
        assert_eq!(err.kind, ShapeMismatch);
        assert_eq!(
            &err.description,
            "segmentation map has shape [200, 300], expected [224, 224]"
        );
    }

    #[test]
    fn test_run_skips_rejected_images() {
        let dir = tempdir().unwrap();
        write_input(dir.path(), "a.png");
        write_input(dir.path(), "b.png");
        std::fs::write(dir.path().join("notes.txt"), "not an image").unwrap();
        let save_dir = dir.path().join("out");
        prepare_save_dir(&save_dir).unwrap();

        let items = collect_inputs(dir.path(), None).unwrap();
        let names: Vec<_> = items.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);

        let mut texturer = texturer(vec![failure(), Ok(quad_estimate())]);
        let summary = texturer.run(&items, &save_dir);
        assert_eq!(
            summary,
            RunSummary {
                processed: 1,
                skipped: 1,
                failed: 0
            }
        );

        let written: Vec<_> = std::fs::read_dir(&save_dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(written, vec!["b_texture.png".to_string()]);

        // The 300x200 input is scaled to the render height.
        let panel = read_rgb_image(&save_dir.join("b_texture.png")).unwrap();
        assert_eq!(panel.dimensions(), (336 + 64 + 224 + 224 + 3 * 8, 224));
    }

    #[test]
    fn test_run_continues_after_failure() {
        let dir = tempdir().unwrap();
        write_input(dir.path(), "a.png");
        write_input(dir.path(), "b.png");
        let items = collect_inputs(dir.path(), None).unwrap();

        // The first estimate has the wrong vertex count.
        let bad = BodyEstimate {
            vertices: vec![],
            ..quad_estimate()
        };
        let mut texturer = texturer(vec![Ok(bad), Ok(quad_estimate())]);
        let summary = texturer.run(&items, dir.path());
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.processed, 1);
        assert!(!dir.path().join("a_texture.png").exists());
        assert!(dir.path().join("b_texture.png").exists());

        // Outputs are not picked up as inputs.
        let items = collect_inputs(dir.path(), None).unwrap();
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn test_missing_segmentation_falls_back_to_rendering() {
        let dir = tempdir().unwrap();
        write_input(dir.path(), "a.png");
        let seg_dir = dir.path().join("seg");
        prepare_save_dir(&seg_dir).unwrap();

        let items = collect_inputs(dir.path(), Some(&seg_dir)).unwrap();
        assert_eq!(items[0].seg_path, Some(seg_dir.join("a_seg.png")));
        let mut texturer = texturer(vec![Ok(quad_estimate())]);
        assert!(texturer.process_image(&items[0]).unwrap().is_some());
    }

    #[test]
    fn test_single_image_with_segmentation_directory() {
        let dir = tempdir().unwrap();
        let path = write_input(dir.path(), "a.png");
        let seg_dir = dir.path().join("seg");
        prepare_save_dir(&seg_dir).unwrap();

        let items = collect_inputs(&path, Some(&seg_dir)).unwrap();
        assert_eq!(items[0].seg_path, Some(seg_dir.join("a_seg.png")));

        let seg_file = dir.path().join("labels.png");
        let items = collect_inputs(&path, Some(&seg_file)).unwrap();
        assert_eq!(items[0].seg_path, Some(seg_file));
    }

    #[test]
    fn test_collect_inputs_errors() {
        let dir = tempdir().unwrap();
        let file = write_input(dir.path(), "a.png");
        let err = collect_inputs(dir.path(), Some(&file)).unwrap_err();
        assert_eq!(err.kind, InvalidArgument);
        let missing = dir.path().join("missing");
        let err = collect_inputs(&missing, None).unwrap_err();
        assert_eq!(err.kind, InvalidArgument);
    }

    #[test]
    fn test_compose_panels() {
        let a = RgbImage::from_pixel(2, 4, Rgb([0, 0, 0]));
        let b = RgbImage::from_pixel(3, 2, Rgb([9, 9, 9]));
        let canvas = compose_panels(&[a, b], 1).unwrap();
        assert_eq!(canvas.dimensions(), (6, 4));
        assert_eq!(*canvas.get_pixel(2, 0), Rgb(UNKNOWN_COLOR));
        assert_eq!(*canvas.get_pixel(3, 0), Rgb(UNKNOWN_COLOR));
        assert_eq!(*canvas.get_pixel(3, 1), Rgb([9, 9, 9]));
    }

    #[test]
    fn test_default_save_dir() {
        assert_eq!(default_save_dir(Path::new("a.png")), PathBuf::from("."));
        assert_eq!(
            default_save_dir(Path::new("/in/a.png")),
            PathBuf::from("/in")
        );
    }
}
