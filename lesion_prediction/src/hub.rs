//! Resolves the artifacts of a model identifier to files in the local cache,
//! downloading the ones that are missing from the model hub.

use crate::config::{ModelConfig, Validatable};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const CONFIG_FILE: &str = "config.json";
pub const PREPROCESSOR_FILE: &str = "preprocessor_config.json";

const TOKEN_VAR: &str = "HF_TOKEN";

#[derive(Error, Debug)]
pub enum HubError {
    #[error("Model artifact not found and downloads are disabled: {0:?}")]
    Missing(PathBuf),
    #[error("Failed to create directory {path:?}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to write {path:?}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to build HTTP client: {0}")]
    Client(reqwest::Error),
    #[error("Request to {url} failed: {source}")]
    Request { url: String, source: reqwest::Error },
    #[error("Failed to download {url}: {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },
    #[error("Invalid authorization token in HF_TOKEN")]
    InvalidToken,
}

/// On-disk locations of everything needed to run the classifier.
#[derive(Debug, Clone)]
pub struct ModelArtifacts {
    pub onnx: PathBuf,
    pub config: PathBuf,
    pub preprocessor: PathBuf,
}

impl ModelArtifacts {
    pub fn in_dir(dir: &Path, onnx_file: &str) -> Self {
        Self {
            onnx: dir.join(onnx_file),
            config: dir.join(CONFIG_FILE),
            preprocessor: dir.join(PREPROCESSOR_FILE),
        }
    }
}

pub fn download_url(model_config: &ModelConfig, file: &str) -> String {
    format!(
        "{}/{}/resolve/{}/{}",
        model_config.endpoint.trim_end_matches('/'),
        model_config.model_id,
        model_config.revision,
        file
    )
}

pub async fn resolve_artifacts(model_config: &ModelConfig) -> Result<ModelArtifacts, HubError> {
    let cache_dir = model_config.get_path();
    let artifacts = ModelArtifacts::in_dir(&cache_dir, &model_config.onnx_file);

    let wanted = [
        (CONFIG_FILE, &artifacts.config),
        (PREPROCESSOR_FILE, &artifacts.preprocessor),
        (model_config.onnx_file.as_str(), &artifacts.onnx),
    ];

    let missing: Vec<_> = wanted
        .into_iter()
        .filter(|(_, path)| {
            let cached = path.exists();
            if cached {
                tracing::debug!("Using cached artifact {:?}", path);
            }
            !cached
        })
        .collect();

    if !missing.is_empty() {
        if !model_config.allow_download {
            return Err(HubError::Missing(missing[0].1.clone()));
        }

        let client = build_client()?;
        for (file, path) in missing {
            let url = download_url(model_config, file);
            download_file(&client, &url, path).await?;
        }
    }

    tracing::info!(
        "Resolved artifacts for {} in {:?}",
        model_config.model_id,
        cache_dir
    );
    Ok(artifacts)
}

fn build_client() -> Result<reqwest::Client, HubError> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("application/octet-stream"));

    if let Ok(token) = std::env::var(TOKEN_VAR) {
        let value = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|_| HubError::InvalidToken)?;
        headers.insert(AUTHORIZATION, value);
    }

    reqwest::Client::builder()
        .default_headers(headers)
        .build()
        .map_err(HubError::Client)
}

async fn download_file(client: &reqwest::Client, url: &str, path: &Path) -> Result<(), HubError> {
    tracing::info!("Downloading {} to {:?}", url, path);

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|source| HubError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
    }

    let response = client
        .get(url)
        .send()
        .await
        .map_err(|source| HubError::Request {
            url: url.to_string(),
            source,
        })?;

    if !response.status().is_success() {
        return Err(HubError::Status {
            url: url.to_string(),
            status: response.status(),
        });
    }

    let bytes = response.bytes().await.map_err(|source| HubError::Request {
        url: url.to_string(),
        source,
    })?;

    // A partial download must never look like a cached artifact.
    let mut partial = path.as_os_str().to_owned();
    partial.push(".part");
    let partial = PathBuf::from(partial);
    tokio::fs::write(&partial, &bytes)
        .await
        .map_err(|source| HubError::Write {
            path: partial.clone(),
            source,
        })?;
    tokio::fs::rename(&partial, path)
        .await
        .map_err(|source| HubError::Write {
            path: path.to_path_buf(),
            source,
        })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offline_config(model_dir: &Path) -> ModelConfig {
        ModelConfig {
            model_dir: model_dir.to_path_buf(),
            allow_download: false,
            ..ModelConfig::default()
        }
    }

    #[test]
    fn test_download_url() {
        let config = ModelConfig {
            endpoint: "https://hub.example.org/".to_string(),
            revision: "v2".to_string(),
            ..ModelConfig::default()
        };

        assert_eq!(
            download_url(&config, "onnx/model.onnx"),
            "https://hub.example.org/Jayanth2002/dinov2-base-finetuned-SkinDisease/resolve/v2/onnx/model.onnx"
        );
    }

    #[tokio::test]
    async fn test_resolve_uses_cached_files() {
        let tmp = tempfile::tempdir().unwrap();
        let config = offline_config(tmp.path());
        let cache_dir = config.get_path();
        std::fs::create_dir_all(&cache_dir).unwrap();
        for file in [CONFIG_FILE, PREPROCESSOR_FILE, "model.onnx"] {
            std::fs::write(cache_dir.join(file), b"{}").unwrap();
        }

        let artifacts = resolve_artifacts(&config).await.unwrap();

        assert_eq!(artifacts.onnx, cache_dir.join("model.onnx"));
        assert_eq!(artifacts.config, cache_dir.join(CONFIG_FILE));
        assert_eq!(artifacts.preprocessor, cache_dir.join(PREPROCESSOR_FILE));
    }

    #[tokio::test]
    async fn test_resolve_offline_reports_missing_file() {
        let tmp = tempfile::tempdir().unwrap();
        let config = offline_config(tmp.path());

        let err = resolve_artifacts(&config).await.unwrap_err();

        assert!(matches!(err, HubError::Missing(path) if path.ends_with(CONFIG_FILE)));
    }
}
