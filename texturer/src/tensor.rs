// Channel-first float tensors (C, H, W) and the resampling policies applied
// to them. The batch axis of the networks is always 1 and is left implicit.

use image::{Rgb, RgbImage};
use ndarray::{concatenate, s, Array3, ArrayView3, Axis};

use crate::geometry::Vector2;
use base::defs::{Error, ErrorKind::*, Result};

pub type Tensor = Array3<f32>;

pub fn check_shape(
    what: &str,
    actual: &[usize],
    expected: &[usize],
) -> Result<()> {
    if actual == expected {
        Ok(())
    } else {
        let desc = format!(
            "{} has shape {:?}, expected {:?}",
            what, actual, expected
        );
        Err(Error::new(ShapeMismatch, desc))
    }
}

// Bytes to [0, 1].
pub fn image_to_tensor(image: &RgbImage) -> Tensor {
    let (w, h) = image.dimensions();
    Tensor::from_shape_fn((3, h as usize, w as usize), |(c, i, j)| {
        // Beware: the image is indexed as (x, y).
        image.get_pixel(j as u32, i as u32)[c] as f32 / 255.0
    })
}

// [0, 1] to bytes, clamping out-of-range values.
pub fn tensor_to_image(tensor: &Tensor) -> Result<RgbImage> {
    let (c, h, w) = tensor.dim();
    check_shape("RGB tensor", &[c], &[3])?;
    let byte = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
    Ok(RgbImage::from_fn(w as u32, h as u32, |x, y| {
        let (i, j) = (y as usize, x as usize);
        Rgb([
            byte(tensor[(0, i, j)]),
            byte(tensor[(1, i, j)]),
            byte(tensor[(2, i, j)]),
        ])
    }))
}

// [0, 1] to [-1, 1].
pub fn to_signed(tensor: &Tensor) -> Tensor {
    tensor.mapv(|v| v * 2.0 - 1.0)
}

// [-1, 1] to [0, 1] with clamping.
pub fn from_signed(tensor: &Tensor) -> Tensor {
    tensor.mapv(|v| ((v + 1.0) / 2.0).clamp(0.0, 1.0))
}

pub fn nearest_index(index: usize, in_len: usize, out_len: usize) -> usize {
    let scale = in_len as f32 / out_len as f32;
    ((index as f32 * scale).floor() as usize).min(in_len - 1)
}

// Nearest-neighbour resize: output index i reads floor(i * in / out).
pub fn resize_nearest(tensor: &Tensor, height: usize, width: usize) -> Tensor {
    let (c, h, w) = tensor.dim();
    if (h, w) == (height, width) {
        return tensor.clone();
    }
    if h == 0 || w == 0 {
        return Tensor::zeros((c, height, width));
    }
    let rows: Vec<usize> =
        (0..height).map(|i| nearest_index(i, h, height)).collect();
    let cols: Vec<usize> =
        (0..width).map(|j| nearest_index(j, w, width)).collect();
    Tensor::from_shape_fn((c, height, width), |(k, i, j)| {
        tensor[(k, rows[i], cols[j])]
    })
}

// Splits an odd margin so that the extra unit goes after.
pub fn split_margin(diff: usize) -> (usize, usize) {
    let before = diff / 2;
    (before, diff - before)
}

// Center-crops or zero-pads the column axis to the given width.
pub fn fit_width(tensor: &Tensor, width: usize) -> Tensor {
    let (c, h, w) = tensor.dim();
    if w > width {
        let (before, _) = split_margin(w - width);
        tensor.slice(s![.., .., before..before + width]).to_owned()
    } else if w < width {
        let (before, _) = split_margin(width - w);
        let mut padded = Tensor::zeros((c, h, width));
        padded
            .slice_mut(s![.., .., before..before + w])
            .assign(tensor);
        padded
    } else {
        tensor.clone()
    }
}

pub fn concat_channels(
    what: &str,
    parts: &[ArrayView3<f32>],
) -> Result<Tensor> {
    if let Some(first) = parts.first() {
        let (_, h, w) = first.dim();
        for part in &parts[1..] {
            let (_, h1, w1) = part.dim();
            check_shape(what, &[h1, w1], &[h, w])?;
        }
    }
    concatenate(Axis(0), parts).map_err(|e| {
        let desc = format!("failed to stack {}", what);
        Error::with_source(ShapeMismatch, desc, e)
    })
}

// Bilinear lookup with edge clamping; uv is [i, j] normalized to [0, 1].
pub fn sample_rgb(texture: &Tensor, uv: Vector2) -> [f32; 3] {
    let (_, h, w) = texture.dim();
    if h == 0 || w == 0 {
        return [0.0; 3];
    }
    let i = (uv[0].clamp(0.0, 1.0) * h as f64 - 0.5).max(0.0);
    let j = (uv[1].clamp(0.0, 1.0) * w as f64 - 0.5).max(0.0);
    let (i0, j0) = ((i as usize).min(h - 1), (j as usize).min(w - 1));
    let (i1, j1) = ((i0 + 1).min(h - 1), (j0 + 1).min(w - 1));
    let (di, dj) = ((i - i0 as f64) as f32, (j - j0 as f64) as f32);
    let mut rgb = [0.0; 3];
    for (c, out) in rgb.iter_mut().enumerate() {
        let s0 = (1.0 - dj) * texture[(c, i0, j0)] + dj * texture[(c, i0, j1)];
        let s1 = (1.0 - dj) * texture[(c, i1, j0)] + dj * texture[(c, i1, j1)];
        *out = (1.0 - di) * s0 + di * s1;
    }
    rgb
}
