mod model_service;
mod ort_service;

pub mod classification;
pub mod config;
pub mod hub;
pub mod labels;
pub mod preprocess;

pub use async_trait::async_trait;
pub use classification::{ClassificationResult, LabelProbability};
pub use model_service::{ModelService, ModelServiceError};
pub use ort_service::{OrtModelService, OrtServiceError};
