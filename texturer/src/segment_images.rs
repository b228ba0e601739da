use std::path::{Path, PathBuf};
use std::rc::Rc;

use image::DynamicImage;
use log::{error, info};
use structopt::StructOpt;

use crate::config::PipelineConfig;
use crate::estimator::{BodyEstimator, PrecomputedEstimator};
use crate::model::BodyModel;
use crate::picture::write_image;
use crate::pipeline::{
    collect_inputs, default_save_dir, estimate_body, prepare_save_dir,
    ImageContext, InputItem, RunSummary,
};
use crate::render::{PartSegmenter, SoftwareRenderer};
use crate::segmentation::{canonical_labels, labels_to_image, LabelTaxonomy};
use base::defs::Result;

#[derive(StructOpt)]
#[structopt(about = "Render canonical part segmentations for photographs")]
pub struct SegmentCommand {
    #[structopt(help = "Input image file or directory")]
    img_path: PathBuf,

    #[structopt(help = "Body model template .obj file", long)]
    model: PathBuf,

    #[structopt(help = "Per-vertex part labels of the body model", long)]
    part_labels: PathBuf,

    #[structopt(help = "Directory with '<name>_smpl.json' estimates", long)]
    estimates: PathBuf,

    #[structopt(
        help = "Output directory (input directory if omitted)",
        long,
        short = "o"
    )]
    save_path: Option<PathBuf>,

    #[structopt(help = "Pipeline configuration .json file", long)]
    config: Option<PathBuf>,
}

impl SegmentCommand {
    pub fn run(&self) -> Result<()> {
        let config = match &self.config {
            Some(path) => PipelineConfig::load(path)?,
            None => PipelineConfig::default(),
        };
        let model = BodyModel::load(&self.model, Some(&self.part_labels))?;

        let items = collect_inputs(&self.img_path, None)?;
        let save_dir = self
            .save_path
            .clone()
            .unwrap_or_else(|| default_save_dir(&self.img_path));
        prepare_save_dir(&save_dir)?;

        let mut estimator = PrecomputedEstimator {
            dir: self.estimates.clone(),
            num_vertices: model.vertices.len(),
            square_size: config.square_size,
        };
        let mut segmenter = SoftwareRenderer {
            model: Rc::new(model),
            size: config.square_size,
            focal_length: config.focal_length,
            zoom: 1.0,
        };

        segment_images(
            &items,
            &save_dir,
            &config,
            &mut estimator,
            &mut segmenter,
        );
        Ok(())
    }
}

fn segment_image(
    item: &InputItem,
    save_dir: &Path,
    config: &PipelineConfig,
    estimator: &mut dyn BodyEstimator,
    segmenter: &mut dyn PartSegmenter,
) -> Result<bool> {
    let context = ImageContext::read(item, config)?;
    let estimate = match estimate_body(estimator, &context, config)? {
        Some(estimate) => estimate,
        None => return Ok(false),
    };

    let labels = segmenter
        .segment(&estimate.vertices, estimate.camera_translation)?;
    let labels = canonical_labels(&labels, LabelTaxonomy::Smpl)?;
    let image = DynamicImage::ImageLuma8(labels_to_image(&labels));
    write_image(&item.seg_output_path(save_dir), image)?;
    Ok(true)
}

pub fn segment_images(
    items: &[InputItem],
    save_dir: &Path,
    config: &PipelineConfig,
    estimator: &mut dyn BodyEstimator,
    segmenter: &mut dyn PartSegmenter,
) -> RunSummary {
    let mut summary = RunSummary::default();
    for (n, item) in items.iter().enumerate() {
        info!("[{}/{}] {}", n + 1, items.len(), item.path.display());
        match segment_image(item, save_dir, config, estimator, segmenter) {
            Ok(true) => summary.processed += 1,
            Ok(false) => summary.skipped += 1,
            Err(err) => {
                let path = item.path.display();
                error!("failed to segment '{}': {}", path, err);
                summary.failed += 1;
            }
        }
    }
    info!(
        "segmented {}, skipped {}, failed {}",
        summary.processed, summary.skipped, summary.failed
    );
    summary
}

#[cfg(test)]
mod tests {
    use super::*;

    use image::{Rgb, RgbImage};
    use tempfile::tempdir;

    use crate::estimator::{BodyEstimate, EstimateRequest};
    use crate::geometry::Vector3;
    use crate::model::tests::quad_model;
    use crate::picture::read_gray_image;
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

    #[test]
    fn test_segment_images_writes_canonical_labels() {
        let temp = tempdir().unwrap();
        let dir = temp.path();
        let image = RgbImage::from_pixel(200, 300, Rgb([50, 60, 70]));
        let path = dir.join("a.jpg");
        write_image(&path, DynamicImage::ImageRgb8(image)).unwrap();

        let config = PipelineConfig::default();
        let model = quad_model();
        let mut estimator = EstimatorMock {
            estimate: MethodMock::with_rets(vec![Ok(BodyEstimate {
                vertices: model.vertices.clone(),
                camera_translation: Vector3::new(-0.5, -0.5, 50.0),
                rotations: vec![],
                shape: vec![],
            })]),
        };
        let mut segmenter = SoftwareRenderer {
            model: Rc::new(model),
            size: config.square_size,
            focal_length: config.focal_length,
            zoom: 1.0,
        };

        let items = collect_inputs(dir, None).unwrap();
        let summary = segment_images(
            &items,
            dir,
            &config,
            &mut estimator,
            &mut segmenter,
        );
        assert_eq!(summary.processed, 1);
        assert_eq!(estimator.estimate.args, vec!["a".to_string()]);

        // Raw labels 1 and 3 of the quad halves become 3 and 1.
        let seg = read_gray_image(&dir.join("a_seg.png")).unwrap();
        assert_eq!(seg.dimensions(), (224, 224));
        assert_eq!(seg.get_pixel(120, 80)[0], 3);
        assert_eq!(seg.get_pixel(100, 120)[0], 1);
        assert_eq!(seg.get_pixel(5, 5)[0], 0);
    }
}
