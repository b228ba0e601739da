use std::io::Cursor;
use std::path::Path;

use image::io::Reader as ImageReader;
use image::{DynamicImage, GrayImage, ImageFormat, ImageOutputFormat, RgbImage};

use base::defs::{Error, ErrorKind::*, IntoResult, Result};
use base::util::fs;

fn decode(path: &Path) -> Result<DynamicImage> {
    let err_fn = || format!("failed to decode image '{}'", path.display());
    ImageReader::open(path)
        .into_result(err_fn)?
        .with_guessed_format()
        .into_result(err_fn)?
        .decode()
        .map_err(|e| Error::with_source(ImageError, err_fn(), e))
}

pub fn read_rgb_image(path: &Path) -> Result<RgbImage> {
    Ok(decode(path)?.into_rgb8())
}

pub fn read_gray_image(path: &Path) -> Result<GrayImage> {
    Ok(decode(path)?.into_luma8())
}

pub fn is_image_path(path: &Path) -> bool {
    ImageFormat::from_path(path).is_ok()
}

// Encodes by the path's extension and writes atomically.
pub fn write_image(path: &Path, image: DynamicImage) -> Result<()> {
    let err_fn = || format!("failed to encode image '{}'", path.display());
    let format = ImageFormat::from_path(path)
        .map_err(|e| Error::with_source(UnsupportedFeature, err_fn(), e))?;
    let mut data = Cursor::new(Vec::new());
    image
        .write_to(&mut data, ImageOutputFormat::from(format))
        .map_err(|e| Error::with_source(ImageError, err_fn(), e))?;
    fs::write_file_atomically(path, data.get_ref())
}
