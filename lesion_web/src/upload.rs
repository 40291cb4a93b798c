use crate::{config::UploadConfig, validation};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::instrument;
use unicode_normalization::UnicodeNormalization;

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Filename {0:?} has no usable name after sanitizing")]
    UnusableFilename(String),
    #[error("Failed to create upload directory {path:?}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to write upload {path:?}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to remove upload {path:?}: {source}")]
    Remove {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// A file written to the upload directory.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredUpload {
    pub filename: String,
    pub path: PathBuf,
    pub url: String,
}

/// Flat directory of uploaded images. Same-name uploads overwrite each other.
#[derive(Debug, Clone)]
pub struct UploadStore {
    dir: PathBuf,
    url_prefix: String,
}

impl UploadStore {
    pub async fn new(config: &UploadConfig) -> Result<Self, UploadError> {
        tokio::fs::create_dir_all(&config.dir)
            .await
            .map_err(|source| UploadError::CreateDir {
                path: config.dir.clone(),
                source,
            })?;

        Ok(Self {
            dir: config.dir.clone(),
            url_prefix: config.url_prefix.trim_end_matches('/').to_string(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn url_prefix(&self) -> &str {
        &self.url_prefix
    }

    #[instrument(skip(self, bytes), fields(size = bytes.len()))]
    pub async fn save(&self, filename: &str, bytes: &[u8]) -> Result<StoredUpload, UploadError> {
        let sanitized = sanitize_filename(filename);
        if sanitized.is_empty() || !validation::is_allowed(&sanitized) {
            return Err(UploadError::UnusableFilename(filename.to_string()));
        }

        let path = self.dir.join(&sanitized);
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|source| UploadError::Write {
                path: path.clone(),
                source,
            })?;
        tracing::debug!("Stored upload at {:?}", path);

        Ok(StoredUpload {
            url: format!("{}/{}", self.url_prefix, sanitized),
            filename: sanitized,
            path,
        })
    }

    pub async fn remove(&self, upload: &StoredUpload) -> Result<(), UploadError> {
        tokio::fs::remove_file(&upload.path)
            .await
            .map_err(|source| UploadError::Remove {
                path: upload.path.clone(),
                source,
            })
    }
}

/// Reduces a client supplied filename to a flat, ASCII-only name: accents
/// are folded through NFKD, separators become `_`, anything outside
/// `[A-Za-z0-9_.-]` is dropped and leading or trailing dots and underscores
/// are trimmed.
pub fn sanitize_filename(filename: &str) -> String {
    let flattened: String = filename
        .nfkd()
        .filter(char::is_ascii)
        .map(|c| if c == '/' || c == '\\' { ' ' } else { c })
        .collect();

    let joined = flattened.split_whitespace().collect::<Vec<_>>().join("_");

    joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(*c, '_' | '.' | '-'))
        .collect::<String>()
        .trim_matches(|c: char| c == '.' || c == '_')
        .to_string()
}
