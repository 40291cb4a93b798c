use crate::{
    classification::{ClassificationError, ClassificationResult},
    preprocess::PreprocessError,
};
use async_trait::async_trait;
use image::RgbImage;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelServiceError {
    #[error("Inference failed: {0}")]
    Inference(String),
    #[error("Image rejected by preprocessor: {0}")]
    Preprocess(#[from] PreprocessError),
    #[error("Invalid model output: {0}")]
    Classification(#[from] ClassificationError),
    #[error("Inference task failed: {0}")]
    Task(String),
}

/// An image classifier loaded once and shared read-only by every request.
#[async_trait]
pub trait ModelService: Send + Sync + Clone + 'static {
    /// Identifier of the loaded model, shown alongside predictions.
    fn model_id(&self) -> &str;

    async fn classify(&self, image: RgbImage) -> Result<ClassificationResult, ModelServiceError>;
}
