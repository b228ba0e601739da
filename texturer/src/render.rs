// Software z-buffer rendering of the estimated body.

use std::rc::Rc;

use ndarray::Array2;

use crate::camera::{ImageCamera, ViewRotation};
use crate::geometry::{
    interpolate, rasterize_triangle, Point3, Vector2, Vector3,
};
use crate::model::{face_part_labels, BodyModel};
use crate::segmentation::SegmentationMap;
use crate::tensor::{check_shape, sample_rgb, Tensor};
use base::defs::{Error, ErrorKind::*, Result};

pub struct Rendering {
    // (3, S, S) in [0, 1].
    pub rgb: Tensor,
    pub depth: Array2<f32>,
    pub mask: Array2<f32>,
}

pub trait Renderer {
    fn render(
        &mut self,
        vertices: &[Point3],
        camera_translation: Vector3,
        texture: &Tensor,
        view: &ViewRotation,
    ) -> Result<Rendering>;
}

pub trait PartSegmenter {
    // Per-pixel part labels in the raw SMPL taxonomy.
    fn segment(
        &mut self,
        vertices: &[Point3],
        camera_translation: Vector3,
    ) -> Result<SegmentationMap>;
}

#[derive(Clone, Copy)]
struct Fragment {
    face: usize,
    bary: Vector3,
    depth: f64,
}

pub struct SoftwareRenderer {
    pub model: Rc<BodyModel>,
    pub size: usize,
    pub focal_length: f64,
    pub zoom: f64,
}

impl SoftwareRenderer {
    // Nearest fragment per pixel.
    fn rasterize(
        &self,
        vertices: &[Point3],
        camera_translation: Vector3,
        view: &ViewRotation,
        zoom: f64,
    ) -> Result<Vec<Option<Fragment>>> {
        self.model.check_vertices(vertices)?;

        let rotation = view.rotation();
        let camera = ImageCamera {
            focal_length: self.focal_length * zoom,
            size: self.size as f64,
            translation: camera_translation,
        };
        let projected: Vec<_> = vertices
            .iter()
            .map(|v| camera.project(&rotation.transform_point(v)))
            .collect();

        let size = self.size;
        let mut fragments: Vec<Option<Fragment>> = vec![None; size * size];
        for (face, &[v0, v1, v2]) in self.model.faces.iter().enumerate() {
            let ps = [projected[v0], projected[v1], projected[v2]];
            if ps.iter().any(|p| p.depth <= 0.0) {
                continue;
            }
            let ijs = [ps[0].point, ps[1].point, ps[2].point];
            let depths = [ps[0].depth, ps[1].depth, ps[2].depth];
            rasterize_triangle(ijs, size, size, |i, j, bary| {
                let depth = interpolate(bary, depths);
                let slot = &mut fragments[i * size + j];
                if slot.map_or(true, |f| depth < f.depth) {
                    *slot = Some(Fragment { face, bary, depth });
                }
            });
        }
        Ok(fragments)
    }
}

impl Renderer for SoftwareRenderer {
    fn render(
        &mut self,
        vertices: &[Point3],
        camera_translation: Vector3,
        texture: &Tensor,
        view: &ViewRotation,
    ) -> Result<Rendering> {
        let (c, _, _) = texture.dim();
        check_shape("render texture channels", &[c], &[3])?;

        let fragments =
            self.rasterize(vertices, camera_translation, view, self.zoom)?;

        let size = self.size;
        let mut rendering = Rendering {
            rgb: Tensor::zeros((3, size, size)),
            depth: Array2::zeros((size, size)),
            mask: Array2::zeros((size, size)),
        };
        let uv_coords = &self.model.uv_coords;
        for (k, fragment) in fragments.iter().enumerate() {
            let Fragment { face, bary, depth } = match fragment {
                Some(f) => *f,
                None => continue,
            };
            let (i, j) = (k / size, k % size);
            let [t0, t1, t2] = self.model.uv_faces[face];
            let corners = [uv_coords[t0], uv_coords[t1], uv_coords[t2]];
            let uv = interpolate(bary, corners);
            let rgb = sample_rgb(texture, Vector2::new(1.0 - uv[1], uv[0]));
            for (ch, value) in rgb.iter().enumerate() {
                rendering.rgb[(ch, i, j)] = *value;
            }
            rendering.depth[(i, j)] = depth as f32;
            rendering.mask[(i, j)] = 1.0;
        }
        Ok(rendering)
    }
}

impl PartSegmenter for SoftwareRenderer {
    fn segment(
        &mut self,
        vertices: &[Point3],
        camera_translation: Vector3,
    ) -> Result<SegmentationMap> {
        let labels = self.model.part_labels.as_ref().ok_or_else(|| {
            let desc = "body model has no part labels".to_string();
            Error::new(InvalidArgument, desc)
        })?;
        let face_labels = face_part_labels(labels, &self.model.faces);

        let identity = ViewRotation::identity();
        let fragments =
            self.rasterize(vertices, camera_translation, &identity, 1.0)?;

        let size = self.size;
        let mut map = SegmentationMap::zeros((size, size));
        for (k, fragment) in fragments.iter().enumerate() {
            if let Some(f) = fragment {
                map[(k / size, k % size)] = face_labels[f.face];
            }
        }
        Ok(map)
    }
}
