use std::path::PathBuf;

use log::info;
use structopt::StructOpt;

use crate::config::PipelineConfig;
use crate::estimator::PrecomputedEstimator;
use crate::model::{load_uv_encoding, BodyModel};
use crate::pipeline::{
    collect_inputs, default_save_dir, prepare_save_dir, RunSummary,
    TextureOptions, Texturer,
};
use crate::segmentation::LabelTaxonomy;
use base::defs::{Error, ErrorKind::*, Result};
use base::util::cli;

#[derive(StructOpt)]
#[structopt(about = "Reconstruct partial body textures from photographs")]
pub struct TextureCommand {
    #[structopt(help = "Input image file or directory")]
    img_path: PathBuf,

    #[structopt(
        help = "Part segmentation file, or directory of '<name>_seg.png'",
        long
    )]
    seg_path: Option<PathBuf>,

    #[structopt(
        help = "Output directory (input directory if omitted)",
        long,
        short = "o"
    )]
    save_path: Option<PathBuf>,

    #[structopt(
        help = "Label taxonomy of supplied segmentations (canonical or smpl)",
        long,
        default_value = "canonical"
    )]
    seg_taxonomy: LabelTaxonomy,

    #[structopt(help = "Body model template .obj file", long)]
    model: PathBuf,

    #[structopt(help = "Per-vertex part labels of the body model", long)]
    part_labels: Option<PathBuf>,

    #[structopt(help = "Directory with '<name>_smpl.json' estimates", long)]
    estimates: PathBuf,

    #[structopt(help = "UV target encoding image", long)]
    uv_encoding: Option<PathBuf>,

    #[structopt(help = "Pipeline configuration .json file", long)]
    config: Option<PathBuf>,

    #[structopt(
        help = "Render view as Euler angles in degrees, e.g. '0,180,0'",
        long = "view"
    )]
    views: Vec<cli::Array<f64, 3>>,

    #[structopt(help = "Also write the partial texture alone", long)]
    save_uvmap: bool,
}

impl TextureCommand {
    pub fn run(&self) -> Result<()> {
        if self.seg_path.is_none() && self.part_labels.is_none() {
            let desc = "either --seg-path or --part-labels is required";
            return Err(Error::new(InvalidArgument, desc.to_string()));
        }

        let mut config = match &self.config {
            Some(path) => PipelineConfig::load(path)?,
            None => PipelineConfig::default(),
        };
        if !self.views.is_empty() {
            config.views = self.views.iter().map(|v| v.0.into()).collect();
        }

        let model = BodyModel::load(&self.model, self.part_labels.as_deref())?;
        let uv_encoding = match &self.uv_encoding {
            Some(path) => Some(load_uv_encoding(
                path,
                config.uv_height,
                config.uv_width,
            )?),
            None => None,
        };

        let items = collect_inputs(&self.img_path, self.seg_path.as_deref())?;
        let save_dir = self
            .save_path
            .clone()
            .unwrap_or_else(|| default_save_dir(&self.img_path));
        prepare_save_dir(&save_dir)?;

        let estimator = PrecomputedEstimator {
            dir: self.estimates.clone(),
            num_vertices: model.vertices.len(),
            square_size: config.square_size,
        };
        let options = TextureOptions {
            seg_taxonomy: self.seg_taxonomy,
            save_uvmap: self.save_uvmap,
        };
        let mut texturer = Texturer::with_model(
            config,
            model,
            uv_encoding,
            Box::new(estimator),
            options,
        )?;

        info!("texturing {} image(s)", items.len());
        let RunSummary { failed, .. } = texturer.run(&items, &save_dir);
        if failed > 0 {
            info!("see the log above for the {} failed image(s)", failed);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_texture_command() {
        let command = TextureCommand::from_iter_safe(&[
            "texture",
            "photos",
            "--model",
            "body.obj",
            "--estimates",
            "est",
            "--seg-taxonomy",
            "smpl",
            "--view",
            "0,0,0",
            "--view",
            "0,90,0",
        ])
        .unwrap();
        assert_eq!(command.img_path, PathBuf::from("photos"));
        assert_eq!(command.seg_taxonomy, LabelTaxonomy::Smpl);
        assert_eq!(command.views.len(), 2);
        assert_eq!(command.views[1].0, [0.0, 90.0, 0.0]);
        assert!(!command.save_uvmap);

        // No segmentation source at all.
        let err = command.run().unwrap_err();
        assert_eq!(err.kind, InvalidArgument);
    }

    #[test]
    fn test_reject_bad_taxonomy() {
        let res = TextureCommand::from_iter_safe(&[
            "texture",
            "photos",
            "--model",
            "body.obj",
            "--estimates",
            "est",
            "--seg-taxonomy",
            "coco",
        ]);
        assert!(res.is_err());
    }
}
