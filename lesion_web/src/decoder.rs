use image::{ImageReader, Limits, RgbImage};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Longest edge accepted for an upload, in pixels.
pub const MAX_IMAGE_EDGE: u32 = 8192;
/// Largest accepted ratio between the long and the short edge. Resizing the
/// short edge up to the model input scales the long edge by the same factor.
pub const MAX_ASPECT_RATIO: u32 = 20;
const MAX_DECODE_ALLOC: u64 = 512 * 1024 * 1024;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Failed to open image {path:?}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to decode image {path:?}: {source}")]
    Decode {
        path: PathBuf,
        source: image::ImageError,
    },
    #[error("Image {path:?} has unsupported dimensions {width}x{height}")]
    Dimensions {
        path: PathBuf,
        width: u32,
        height: u32,
    },
}

fn decode_limits() -> Limits {
    let mut limits = Limits::default();
    limits.max_image_width = Some(MAX_IMAGE_EDGE);
    limits.max_image_height = Some(MAX_IMAGE_EDGE);
    limits.max_alloc = Some(MAX_DECODE_ALLOC);
    limits
}

fn check_aspect_ratio(width: u32, height: u32) -> bool {
    let (short, long) = (width.min(height), width.max(height));
    short > 0 && long / short <= MAX_ASPECT_RATIO
}

/// Decodes a stored upload, sniffing the format from its content, and
/// converts it to 8-bit RGB. Oversized or extremely elongated images are
/// refused before any pixel buffer is allocated.
pub fn decode_rgb(path: &Path) -> Result<RgbImage, DecodeError> {
    let open_error = |source| DecodeError::Open {
        path: path.to_path_buf(),
        source,
    };

    let decode_error = |source| DecodeError::Decode {
        path: path.to_path_buf(),
        source,
    };

    let (width, height) = ImageReader::open(path)
        .map_err(open_error)?
        .with_guessed_format()
        .map_err(open_error)?
        .into_dimensions()
        .map_err(decode_error)?;
    if !check_aspect_ratio(width, height) {
        return Err(DecodeError::Dimensions {
            path: path.to_path_buf(),
            width,
            height,
        });
    }

    let mut reader = ImageReader::open(path)
        .map_err(open_error)?
        .with_guessed_format()
        .map_err(open_error)?;
    reader.limits(decode_limits());

    let image = reader.decode().map_err(decode_error)?;

    Ok(image.to_rgb8())
}
