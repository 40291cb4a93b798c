use serde::Deserialize;
use std::path::PathBuf;

pub const DEFAULT_MODEL_ID: &str = "Jayanth2002/dinov2-base-finetuned-SkinDisease";

pub trait Validatable {
    fn get_path(&self) -> PathBuf;
    fn validate(&self) -> Result<(), String>;
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModelConfig {
    #[serde(default = "default_model_id")]
    pub model_id: String,
    #[serde(default = "default_model_dir")]
    pub model_dir: PathBuf,
    #[serde(default = "default_revision")]
    pub revision: String,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_onnx_file")]
    pub onnx_file: String,
    #[serde(default = "default_allow_download")]
    pub allow_download: bool,
    #[serde(default = "default_model_instances")]
    pub num_instances: usize,
    #[serde(default = "default_input_name")]
    pub input_name: String,
    #[serde(default = "default_output_name")]
    pub output_name: String,
}

fn default_model_id() -> String {
    DEFAULT_MODEL_ID.to_string()
}

fn default_model_dir() -> PathBuf {
    PathBuf::from("models")
}

fn default_revision() -> String {
    "main".to_string()
}

fn default_endpoint() -> String {
    "https://huggingface.co".to_string()
}

fn default_onnx_file() -> String {
    "model.onnx".to_string()
}

fn default_allow_download() -> bool {
    true
}

fn default_model_instances() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(2)
}

fn default_input_name() -> String {
    "pixel_values".to_string()
}

fn default_output_name() -> String {
    "logits".to_string()
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model_id: default_model_id(),
            model_dir: default_model_dir(),
            revision: default_revision(),
            endpoint: default_endpoint(),
            onnx_file: default_onnx_file(),
            allow_download: default_allow_download(),
            num_instances: default_model_instances(),
            input_name: default_input_name(),
            output_name: default_output_name(),
        }
    }
}

impl ModelConfig {
    /// Cache directory name for the model, `owner/name` becomes `owner--name`.
    pub fn cache_key(&self) -> String {
        self.model_id.replace('/', "--")
    }
}

impl Validatable for ModelConfig {
    fn get_path(&self) -> PathBuf {
        self.model_dir.join(self.cache_key())
    }

    fn validate(&self) -> Result<(), String> {
        if self.model_id.trim().is_empty() {
            return Err("model_id must not be empty".to_string());
        }
        if self.model_id.split('/').any(|part| part == ".." || part.is_empty()) {
            return Err(format!("Invalid model_id: {:?}", self.model_id));
        }
        if self.onnx_file.split('/').any(|part| part == "..") {
            return Err(format!("Invalid onnx_file: {:?}", self.onnx_file));
        }
        if self.num_instances == 0 {
            return Err("num_instances must be at least 1".to_string());
        }
        Ok(())
    }
}
