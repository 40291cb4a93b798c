use serde::Deserialize;
use std::{collections::BTreeMap, collections::HashMap, path::Path};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LabelsError {
    #[error("Failed to read labels from {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse model config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid class index {0:?} in id2label")]
    InvalidIndex(String),
    #[error("id2label is missing class index {0}")]
    MissingIndex(usize),
    #[error("Model config defines no class labels")]
    Empty,
}

#[derive(Deserialize)]
struct ClassifierConfigFile {
    id2label: HashMap<String, String>,
}

/// Class labels in model output order.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassLabels {
    labels: Vec<String>,
}

impl ClassLabels {
    pub fn new(labels: Vec<String>) -> Result<Self, LabelsError> {
        if labels.is_empty() {
            return Err(LabelsError::Empty);
        }
        Ok(Self { labels })
    }

    pub fn from_config_file(path: &Path) -> Result<Self, LabelsError> {
        let json = std::fs::read_to_string(path).map_err(|source| LabelsError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_config_json(&json)
    }

    /// Reads the `id2label` table of a classifier `config.json`. Indices must
    /// cover `0..N` without gaps.
    pub fn from_config_json(json: &str) -> Result<Self, LabelsError> {
        let config: ClassifierConfigFile = serde_json::from_str(json)?;

        let mut by_index = BTreeMap::new();
        for (key, label) in config.id2label {
            let index: usize = key
                .trim()
                .parse()
                .map_err(|_| LabelsError::InvalidIndex(key.clone()))?;
            by_index.insert(index, label);
        }

        let mut labels = Vec::with_capacity(by_index.len());
        for (expected, (index, label)) in by_index.into_iter().enumerate() {
            if index != expected {
                return Err(LabelsError::MissingIndex(expected));
            }
            labels.push(label);
        }

        Self::new(labels)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.labels.iter().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels_follow_index_order() {
        let json = r#"{
            "architectures": ["Dinov2ForImageClassification"],
            "id2label": {"2": "Eczema", "0": "Acne", "1": "Normal"},
            "label2id": {"Acne": 0, "Normal": 1, "Eczema": 2}
        }"#;

        let labels = ClassLabels::from_config_json(json).unwrap();

        assert_eq!(labels.len(), 3);
        assert_eq!(
            labels.iter().collect::<Vec<_>>(),
            vec!["Acne", "Normal", "Eczema"]
        );
        assert_eq!(labels.get(2), Some("Eczema"));
        assert_eq!(labels.get(3), None);
    }

    #[test]
    fn test_gap_in_indices_is_rejected() {
        let json = r#"{"id2label": {"0": "Acne", "2": "Eczema"}}"#;

        let err = ClassLabels::from_config_json(json).unwrap_err();

        assert!(matches!(err, LabelsError::MissingIndex(1)));
    }

    #[test]
    fn test_non_numeric_index_is_rejected() {
        let json = r#"{"id2label": {"zero": "Acne"}}"#;

        assert!(matches!(
            ClassLabels::from_config_json(json),
            Err(LabelsError::InvalidIndex(_))
        ));
    }

    #[test]
    fn test_empty_label_set_is_rejected() {
        assert!(matches!(
            ClassLabels::from_config_json(r#"{"id2label": {}}"#),
            Err(LabelsError::Empty)
        ));
    }
}
