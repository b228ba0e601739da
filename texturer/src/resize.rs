use std::str::FromStr;

use image::imageops::{resize, FilterType};
use image::RgbImage;
use serde::Deserialize;

use crate::tensor::split_margin;
use base::defs::{Error, ErrorKind::*, Result};

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ResizeMode {
    // Longer side to the target size, zero padding on the shorter side.
    Pad,
    // Shorter side to the target size, cropping of the longer side.
    Crop,
}

impl Default for ResizeMode {
    fn default() -> Self {
        ResizeMode::Pad
    }
}

impl FromStr for ResizeMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pad" => Ok(ResizeMode::Pad),
            "crop" => Ok(ResizeMode::Crop),
            _ => Err(Error::new(
                InvalidArgument,
                format!("unknown resize mode '{}', can be 'pad' or 'crop'", s),
            )),
        }
    }
}

// Scales one side to the target size and the other by the implied aspect
// ratio, truncating toward an integer pixel count.
pub fn scaled_dimensions(
    width: u32,
    height: u32,
    size: u32,
    mode: ResizeMode,
) -> (u32, u32) {
    let scale_to = |side: u32, other: u32| {
        if side == other {
            return size;
        }
        let ratio = size as f64 / side as f64;
        ((ratio * other as f64) as u32).max(1)
    };
    let height_leads = match mode {
        ResizeMode::Pad => height > width,
        ResizeMode::Crop => height < width,
    };
    if height_leads {
        (scale_to(height, width), size)
    } else {
        (size, scale_to(width, height))
    }
}

// Source offset, target offset and length of the span copied along one axis.
fn placement(src_len: u32, dst_len: u32) -> (u32, u32, u32) {
    if src_len <= dst_len {
        let (before, _) = split_margin((dst_len - src_len) as usize);
        (0, before as u32, src_len)
    } else {
        let (before, _) = split_margin((src_len - dst_len) as usize);
        (before as u32, 0, dst_len)
    }
}

pub fn resize_to_square(
    image: &RgbImage,
    size: u32,
    mode: ResizeMode,
) -> RgbImage {
    let (w, h) = image.dimensions();
    if (w, h) == (size, size) {
        return image.clone();
    }
    if w == 0 || h == 0 {
        return RgbImage::new(size, size);
    }

    let (w1, h1) = scaled_dimensions(w, h, size, mode);
    let resized = resize(image, w1, h1, FilterType::Triangle);

    let (x_src, x_dst, x_len) = placement(w1, size);
    let (y_src, y_dst, y_len) = placement(h1, size);

    let mut square = RgbImage::new(size, size);
    for y in 0..y_len {
        for x in 0..x_len {
            let pixel = *resized.get_pixel(x_src + x, y_src + y);
            square.put_pixel(x_dst + x, y_dst + y, pixel);
        }
    }
    square
}

// Scales to the given height keeping the aspect ratio.
pub fn resize_to_height(image: &RgbImage, height: u32) -> RgbImage {
    let (w, h) = image.dimensions();
    if h == height || w == 0 || h == 0 {
        return image.clone();
    }
    let width = ((w as f64 * height as f64 / h as f64).round() as u32).max(1);
    resize(image, width, height, FilterType::Triangle)
}
