use crate::{
    classification::ClassificationResult,
    config::{ModelConfig, Validatable},
    hub::{self, HubError, ModelArtifacts},
    labels::{ClassLabels, LabelsError},
    model_service::{ModelService, ModelServiceError},
    preprocess::{ImagePreprocessor, PreprocessError},
};
use async_trait::async_trait;
use image::RgbImage;
use ndarray::{Array, Ix4};
use ort::{
    session::{builder::GraphOptimizationLevel, Session},
    value::TensorRef,
};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};
use thiserror::Error;
use tracing::instrument;

#[derive(Error, Debug)]
pub enum OrtServiceError {
    #[error("Invalid model config: {0}")]
    Config(String),
    #[error("Failed to fetch model artifacts: {0}")]
    Hub(#[from] HubError),
    #[error("Failed to load class labels: {0}")]
    Labels(#[from] LabelsError),
    #[error("Failed to load preprocessor: {0}")]
    Preprocessor(#[from] PreprocessError),
    #[error("ONNX Runtime error: {0}")]
    Ort(#[from] ort::Error),
}

/// ONNX Runtime backed classifier. Holds a small pool of sessions that are
/// picked round-robin, each guarded by its own mutex.
#[derive(Clone)]
pub struct OrtModelService {
    sessions: Arc<Vec<Arc<Mutex<Session>>>>,
    counter: Arc<AtomicUsize>,
    preprocessor: Arc<ImagePreprocessor>,
    labels: Arc<ClassLabels>,
    model_id: Arc<str>,
    input_name: Arc<str>,
    output_name: Arc<str>,
}

impl OrtModelService {
    pub async fn from_config(model_config: &ModelConfig) -> Result<Self, OrtServiceError> {
        model_config.validate().map_err(OrtServiceError::Config)?;
        let artifacts = hub::resolve_artifacts(model_config).await?;

        let model_config = model_config.clone();
        tokio::task::spawn_blocking(move || Self::from_artifacts(&model_config, &artifacts))
            .await
            .map_err(|e| OrtServiceError::Config(format!("model loading task failed: {}", e)))?
    }

    pub fn from_artifacts(
        model_config: &ModelConfig,
        artifacts: &ModelArtifacts,
    ) -> Result<Self, OrtServiceError> {
        let labels = ClassLabels::from_config_file(&artifacts.config)?;
        let preprocessor = ImagePreprocessor::from_file(&artifacts.preprocessor)?;

        ort::init().with_name("lesion_prediction").commit()?;
        let num_instances = model_config.num_instances;
        let sessions = (0..num_instances)
            .map(|_| {
                let session = Session::builder()?
                    .with_optimization_level(GraphOptimizationLevel::Level3)?
                    .commit_from_file(&artifacts.onnx)?;
                Ok(Arc::new(Mutex::new(session)))
            })
            .collect::<Result<Vec<_>, ort::Error>>()?;

        if let Some(session) = sessions.first() {
            let session = session
                .lock()
                .map_err(|e| OrtServiceError::Config(format!("session mutex poisoned: {}", e)))?;
            let inputs: Vec<&str> = session.inputs.iter().map(|i| i.name.as_str()).collect();
            let outputs: Vec<&str> = session.outputs.iter().map(|o| o.name.as_str()).collect();
            check_tensor_names(&inputs, &outputs, model_config)?;
        }

        tracing::info!(
            "Created {} ONNX sessions for {} ({} classes)",
            num_instances,
            model_config.model_id,
            labels.len()
        );

        Ok(Self {
            sessions: Arc::new(sessions),
            counter: Arc::new(AtomicUsize::new(0)),
            preprocessor: Arc::new(preprocessor),
            labels: Arc::new(labels),
            model_id: Arc::from(model_config.model_id.as_str()),
            input_name: Arc::from(model_config.input_name.as_str()),
            output_name: Arc::from(model_config.output_name.as_str()),
        })
    }

    pub fn labels(&self) -> &ClassLabels {
        &self.labels
    }

    /// Runs one forward pass and returns the flattened logits.
    pub fn run_inference(&self, input: &Array<f32, Ix4>) -> Result<Vec<f32>, ModelServiceError> {
        let index = self.counter.fetch_add(1, Ordering::SeqCst) % self.sessions.len();
        let mut session = self.sessions[index]
            .lock()
            .map_err(|e| ModelServiceError::Inference(format!("session mutex poisoned: {}", e)))?;

        tracing::debug!("Handling request with session {}", index);
        let owned_buffer;
        let input_view = if input.view().is_standard_layout() {
            input.view()
        } else {
            owned_buffer = input.as_standard_layout().into_owned();
            owned_buffer.view()
        };

        let tensor_ref = TensorRef::from_array_view(input_view).map_err(|e| {
            ModelServiceError::Inference(format!("failed to build tensor: {}", e))
        })?;

        let outputs = session
            .run(ort::inputs![&*self.input_name => tensor_ref])
            .map_err(|e| ModelServiceError::Inference(format!("forward pass failed: {}", e)))?;

        let output = outputs.get(&*self.output_name).ok_or_else(|| {
            ModelServiceError::Inference(format!(
                "model has no output named {:?}",
                &*self.output_name
            ))
        })?;
        let (_, data) = output
            .try_extract_tensor::<f32>()
            .map_err(|e| {
                ModelServiceError::Inference(format!("failed to extract logits: {}", e))
            })?;

        Ok(data.to_vec())
    }
}

fn check_tensor_names(
    inputs: &[&str],
    outputs: &[&str],
    model_config: &ModelConfig,
) -> Result<(), OrtServiceError> {
    if !inputs.contains(&model_config.input_name.as_str()) {
        return Err(OrtServiceError::Config(format!(
            "model has no input named {:?}, available: {:?}",
            model_config.input_name, inputs
        )));
    }
    if !outputs.contains(&model_config.output_name.as_str()) {
        return Err(OrtServiceError::Config(format!(
            "model has no output named {:?}, available: {:?}",
            model_config.output_name, outputs
        )));
    }
    Ok(())
}

#[async_trait]
impl ModelService for OrtModelService {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    #[instrument(skip(self, image), fields(width = image.width(), height = image.height()))]
    async fn classify(&self, image: RgbImage) -> Result<ClassificationResult, ModelServiceError> {
        let service = self.clone();
        tokio::task::spawn_blocking(move || -> Result<ClassificationResult, ModelServiceError> {
            let input = service.preprocessor.preprocess(&image)?;
            let logits = service.run_inference(&input)?;
            let result = ClassificationResult::from_logits(&logits, &service.labels)?;
            Ok(result)
        })
        .await
        .map_err(|e| ModelServiceError::Task(e.to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn write_artifacts(dir: &Path, config_json: &str, preprocessor_json: &str) -> ModelArtifacts {
        let artifacts = ModelArtifacts::in_dir(dir, "model.onnx");
        std::fs::write(&artifacts.config, config_json).unwrap();
        std::fs::write(&artifacts.preprocessor, preprocessor_json).unwrap();
        artifacts
    }

    #[test]
    fn test_bad_labels_fail_before_sessions_are_created() {
        let tmp = tempfile::tempdir().unwrap();
        let artifacts = write_artifacts(tmp.path(), r#"{"id2label": {"1": "Normal"}}"#, "{}");

        let result = OrtModelService::from_artifacts(&ModelConfig::default(), &artifacts);

        assert!(matches!(result, Err(OrtServiceError::Labels(_))));
    }

    #[test]
    fn test_tensor_names_must_exist_in_model() {
        let config = ModelConfig::default();

        assert!(check_tensor_names(&["pixel_values"], &["logits"], &config).is_ok());
        assert!(matches!(
            check_tensor_names(&["pixel_values"], &["last_hidden_state"], &config),
            Err(OrtServiceError::Config(msg)) if msg.contains("\"logits\"")
        ));
        assert!(matches!(
            check_tensor_names(&["input"], &["logits"], &config),
            Err(OrtServiceError::Config(msg)) if msg.contains("\"pixel_values\"")
        ));
    }

    #[test]
    fn test_bad_preprocessor_fails_before_sessions_are_created() {
        let tmp = tempfile::tempdir().unwrap();
        let artifacts = write_artifacts(
            tmp.path(),
            r#"{"id2label": {"0": "Acne", "1": "Normal"}}"#,
            r#"{"image_mean": [0.5, 0.5]}"#,
        );

        let result = OrtModelService::from_artifacts(&ModelConfig::default(), &artifacts);

        assert!(matches!(result, Err(OrtServiceError::Preprocessor(_))));
    }
}
