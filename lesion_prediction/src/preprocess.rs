use image::{imageops, imageops::FilterType, RgbImage};
use ndarray::{Array, Ix4};
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];
/// Upper bound on the pixels of the intermediate resized image.
pub const MAX_RESIZE_PIXELS: u64 = 32 * 1024 * 1024;

#[derive(Error, Debug)]
pub enum PreprocessError {
    #[error("Failed to read preprocessor config {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse preprocessor config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid preprocessor config: {0}")]
    Invalid(String),
    #[error("Image of {width}x{height} would resize to {target_width}x{target_height}")]
    TooLarge {
        width: u32,
        height: u32,
        target_width: u32,
        target_height: u32,
    },
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq)]
pub struct ImageSize {
    pub shortest_edge: Option<u32>,
    pub height: Option<u32>,
    pub width: Option<u32>,
}

/// Parameters of a `preprocessor_config.json`. Missing keys take the values
/// used by DINOv2 image processors.
#[derive(Debug, Clone, Deserialize)]
pub struct ImageProcessorConfig {
    #[serde(default = "enabled")]
    pub do_resize: bool,
    #[serde(default = "default_size")]
    pub size: ImageSize,
    #[serde(default = "default_resample")]
    pub resample: u8,
    #[serde(default = "enabled")]
    pub do_center_crop: bool,
    #[serde(default = "default_crop_size")]
    pub crop_size: ImageSize,
    #[serde(default = "enabled")]
    pub do_rescale: bool,
    #[serde(default = "default_rescale_factor")]
    pub rescale_factor: f32,
    #[serde(default = "enabled")]
    pub do_normalize: bool,
    #[serde(default = "default_mean")]
    pub image_mean: Vec<f32>,
    #[serde(default = "default_std")]
    pub image_std: Vec<f32>,
}

fn enabled() -> bool {
    true
}

fn default_size() -> ImageSize {
    ImageSize {
        shortest_edge: Some(256),
        ..ImageSize::default()
    }
}

fn default_resample() -> u8 {
    3
}

fn default_crop_size() -> ImageSize {
    ImageSize {
        height: Some(224),
        width: Some(224),
        ..ImageSize::default()
    }
}

fn default_rescale_factor() -> f32 {
    1.0 / 255.0
}

fn default_mean() -> Vec<f32> {
    IMAGENET_MEAN.to_vec()
}

fn default_std() -> Vec<f32> {
    IMAGENET_STD.to_vec()
}

impl Default for ImageProcessorConfig {
    fn default() -> Self {
        Self {
            do_resize: true,
            size: default_size(),
            resample: default_resample(),
            do_center_crop: true,
            crop_size: default_crop_size(),
            do_rescale: true,
            rescale_factor: default_rescale_factor(),
            do_normalize: true,
            image_mean: default_mean(),
            image_std: default_std(),
        }
    }
}

fn filter_for(resample: u8) -> FilterType {
    match resample {
        0 => FilterType::Nearest,
        1 => FilterType::Lanczos3,
        3 => FilterType::CatmullRom,
        _ => FilterType::Triangle,
    }
}

/// Turns a decoded RGB image into the `[1, 3, H, W]` tensor the classifier
/// expects.
#[derive(Debug, Clone)]
pub struct ImagePreprocessor {
    config: ImageProcessorConfig,
    mean: [f32; 3],
    std: [f32; 3],
}

impl ImagePreprocessor {
    pub fn new(config: ImageProcessorConfig) -> Result<Self, PreprocessError> {
        let mean = channel_triple(&config.image_mean, "image_mean")?;
        let std = channel_triple(&config.image_std, "image_std")?;
        if config.do_normalize && std.iter().any(|s| *s == 0.0) {
            return Err(PreprocessError::Invalid(
                "image_std must not contain zeros".to_string(),
            ));
        }
        if config.do_resize && !has_resize_target(&config.size) {
            return Err(PreprocessError::Invalid(
                "size needs shortest_edge or height and width".to_string(),
            ));
        }
        if config.do_center_crop && crop_dims(&config.crop_size).is_none() {
            return Err(PreprocessError::Invalid(
                "crop_size needs non-zero height and width".to_string(),
            ));
        }

        Ok(Self { config, mean, std })
    }

    pub fn from_json(json: &str) -> Result<Self, PreprocessError> {
        Self::new(serde_json::from_str(json)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, PreprocessError> {
        let json = std::fs::read_to_string(path).map_err(|source| PreprocessError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&json)
    }

    pub fn config(&self) -> &ImageProcessorConfig {
        &self.config
    }

    pub fn preprocess(&self, image: &RgbImage) -> Result<Array<f32, Ix4>, PreprocessError> {
        let resized;
        let source = if self.config.do_resize {
            let (width, height) = self.resize_target(image.width(), image.height());
            if width as u64 * height as u64 > MAX_RESIZE_PIXELS {
                return Err(PreprocessError::TooLarge {
                    width: image.width(),
                    height: image.height(),
                    target_width: width,
                    target_height: height,
                });
            }
            resized = imageops::resize(image, width, height, filter_for(self.config.resample));
            &resized
        } else {
            image
        };

        let (src_w, src_h) = source.dimensions();
        let (out_h, out_w) = if self.config.do_center_crop {
            crop_dims(&self.config.crop_size).unwrap_or((src_h, src_w))
        } else {
            (src_h, src_w)
        };
        let top = crop_offset(src_h, out_h);
        let left = crop_offset(src_w, out_w);

        Ok(Array::from_shape_fn(
            (1, 3, out_h as usize, out_w as usize),
            |(_, c, y, x)| {
                let sy = y as i64 + top;
                let sx = x as i64 + left;
                // Crops larger than the image are zero padded.
                let raw = if sy >= 0 && sx >= 0 && (sy as u32) < src_h && (sx as u32) < src_w {
                    source.get_pixel(sx as u32, sy as u32)[c] as f32
                } else {
                    0.0
                };
                self.normalize(raw, c)
            },
        ))
    }

    fn normalize(&self, value: f32, channel: usize) -> f32 {
        let mut value = value;
        if self.config.do_rescale {
            value *= self.config.rescale_factor;
        }
        if self.config.do_normalize {
            value = (value - self.mean[channel]) / self.std[channel];
        }
        value
    }

    fn resize_target(&self, width: u32, height: u32) -> (u32, u32) {
        let size = &self.config.size;
        if let Some(edge) = size.shortest_edge {
            let (short, long) = if width <= height {
                (width, height)
            } else {
                (height, width)
            };
            let scaled_long = ((edge as u64 * long as u64) / short.max(1) as u64).max(1) as u32;
            if width <= height {
                (edge, scaled_long)
            } else {
                (scaled_long, edge)
            }
        } else {
            match (size.width, size.height) {
                (Some(w), Some(h)) => (w, h),
                _ => (width, height),
            }
        }
    }
}

fn channel_triple(values: &[f32], name: &str) -> Result<[f32; 3], PreprocessError> {
    match values {
        [a, b, c] => Ok([*a, *b, *c]),
        [v] => Ok([*v, *v, *v]),
        _ => Err(PreprocessError::Invalid(format!(
            "{} must have 1 or 3 values, got {}",
            name,
            values.len()
        ))),
    }
}

fn has_resize_target(size: &ImageSize) -> bool {
    matches!(size.shortest_edge, Some(edge) if edge > 0)
        || matches!((size.height, size.width), (Some(h), Some(w)) if h > 0 && w > 0)
}

fn crop_dims(size: &ImageSize) -> Option<(u32, u32)> {
    match (size.height, size.width) {
        (Some(h), Some(w)) if h > 0 && w > 0 => Some((h, w)),
        _ => None,
    }
}

fn crop_offset(source: u32, target: u32) -> i64 {
    if source >= target {
        ((source - target) / 2) as i64
    } else {
        -(((target - source) / 2) as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_default_pipeline_shape() {
        let preprocessor = ImagePreprocessor::new(ImageProcessorConfig::default()).unwrap();
        let img = RgbImage::from_pixel(640, 480, Rgb([255, 0, 0]));

        let input = preprocessor.preprocess(&img).unwrap();

        assert_eq!(input.shape(), &[1, 3, 224, 224]);
        let red = (1.0 - IMAGENET_MEAN[0]) / IMAGENET_STD[0];
        let green = (0.0 - IMAGENET_MEAN[1]) / IMAGENET_STD[1];
        assert!((input[[0, 0, 100, 100]] - red).abs() < 1e-5);
        assert!((input[[0, 1, 100, 100]] - green).abs() < 1e-5);
    }

    #[test]
    fn test_shortest_edge_keeps_aspect_ratio() {
        let preprocessor = ImagePreprocessor::new(ImageProcessorConfig::default()).unwrap();

        assert_eq!(preprocessor.resize_target(640, 480), (341, 256));
        assert_eq!(preprocessor.resize_target(100, 400), (256, 1024));
    }

    #[test]
    fn test_elongated_image_exceeds_resize_budget() {
        let preprocessor = ImagePreprocessor::new(ImageProcessorConfig::default()).unwrap();
        let strip = RgbImage::from_pixel(1, 60000, Rgb([0, 0, 0]));

        let err = preprocessor.preprocess(&strip).unwrap_err();

        assert!(matches!(
            err,
            PreprocessError::TooLarge {
                target_width: 256,
                target_height: 15_360_000,
                ..
            }
        ));
    }

    #[test]
    fn test_from_json_with_explicit_size() {
        let json = r#"{
            "do_center_crop": false,
            "size": {"height": 32, "width": 48},
            "do_normalize": false,
            "image_processor_type": "ViTImageProcessor"
        }"#;
        let preprocessor = ImagePreprocessor::from_json(json).unwrap();
        let img = RgbImage::from_pixel(10, 10, Rgb([51, 102, 255]));

        let input = preprocessor.preprocess(&img).unwrap();

        assert_eq!(input.shape(), &[1, 3, 32, 48]);
        assert!((input[[0, 0, 5, 5]] - 0.2).abs() < 1e-3);
        assert!((input[[0, 2, 5, 5]] - 1.0).abs() < 1e-3);
    }

    #[test]
    fn test_crop_larger_than_image_is_padded() {
        let config = ImageProcessorConfig {
            do_resize: false,
            do_normalize: false,
            crop_size: ImageSize {
                height: Some(4),
                width: Some(4),
                shortest_edge: None,
            },
            ..ImageProcessorConfig::default()
        };
        let preprocessor = ImagePreprocessor::new(config).unwrap();
        let img = RgbImage::from_pixel(2, 2, Rgb([255, 255, 255]));

        let input = preprocessor.preprocess(&img).unwrap();

        assert_eq!(input.shape(), &[1, 3, 4, 4]);
        assert_eq!(input[[0, 0, 0, 0]], 0.0);
        assert!((input[[0, 0, 1, 1]] - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_invalid_std_is_rejected() {
        let json = r#"{"image_std": [0.0, 0.2, 0.2]}"#;

        assert!(matches!(
            ImagePreprocessor::from_json(json),
            Err(PreprocessError::Invalid(_))
        ));
    }
}
