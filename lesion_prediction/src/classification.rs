use crate::labels::ClassLabels;
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum ClassificationError {
    #[error("Model returned no logits")]
    Empty,
    #[error("Model returned {logits} logits for {labels} class labels")]
    LabelMismatch { logits: usize, labels: usize },
    #[error("Model returned a non-finite logit at index {0}")]
    NonFinite(usize),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabelProbability {
    pub label: String,
    pub probability: f32,
}

impl LabelProbability {
    pub fn new(label: impl Into<String>, probability: f32) -> Self {
        Self {
            label: label.into(),
            probability,
        }
    }
}

/// One probability per class, in class-index order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ClassificationResult {
    entries: Vec<LabelProbability>,
}

/// Numerically stable softmax, the maximum logit is subtracted before
/// exponentiation.
pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|l| (l - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

impl ClassificationResult {
    pub fn from_logits(logits: &[f32], labels: &ClassLabels) -> Result<Self, ClassificationError> {
        if logits.is_empty() {
            return Err(ClassificationError::Empty);
        }
        if logits.len() != labels.len() {
            return Err(ClassificationError::LabelMismatch {
                logits: logits.len(),
                labels: labels.len(),
            });
        }
        if let Some(index) = logits.iter().position(|l| !l.is_finite()) {
            return Err(ClassificationError::NonFinite(index));
        }

        let entries = softmax(logits)
            .into_iter()
            .zip(labels.iter())
            .map(|(probability, label)| LabelProbability::new(label, probability))
            .collect();

        Ok(Self { entries })
    }

    pub fn from_entries(entries: Vec<LabelProbability>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[LabelProbability] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total_probability(&self) -> f32 {
        self.entries.iter().map(|e| e.probability).sum()
    }

    /// Entries sorted by descending probability. The sort is stable, equal
    /// probabilities keep class-index order.
    pub fn ranked(self) -> Vec<LabelProbability> {
        let mut entries = self.entries;
        entries.sort_by(|a, b| b.probability.total_cmp(&a.probability));
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(names: &[&str]) -> ClassLabels {
        ClassLabels::new(names.iter().map(|n| n.to_string()).collect()).unwrap()
    }

    #[test]
    fn test_probabilities_sum_to_one() {
        let labels = labels(&["Acne", "Eczema", "Normal", "Psoriasis"]);
        let logits = [2.5, -1.0, 0.3, 7.25];

        let result = ClassificationResult::from_logits(&logits, &labels).unwrap();

        assert_eq!(result.len(), 4);
        assert!((result.total_probability() - 1.0).abs() < 1e-5);
        assert!(result
            .entries()
            .iter()
            .all(|e| (0.0..=1.0).contains(&e.probability)));
        assert_eq!(result.entries()[3].label, "Psoriasis");
    }

    #[test]
    fn test_softmax_handles_large_logits() {
        let probs = softmax(&[1000.0, 1000.0]);

        assert_eq!(probs, vec![0.5, 0.5]);
    }

    #[test]
    fn test_ranked_is_non_increasing_and_stable() {
        let labels = labels(&["a", "b", "c", "d", "e"]);
        let logits = [0.1, 3.0, 0.1, -2.0, 3.0];

        let ranked = ClassificationResult::from_logits(&logits, &labels)
            .unwrap()
            .ranked();

        assert!(ranked
            .windows(2)
            .all(|pair| pair[0].probability >= pair[1].probability));
        let order: Vec<_> = ranked.iter().map(|e| e.label.as_str()).collect();
        assert_eq!(order, vec!["b", "e", "a", "c", "d"]);
    }

    #[test]
    fn test_label_mismatch_is_rejected() {
        let labels = labels(&["a", "b"]);

        let err = ClassificationResult::from_logits(&[0.5, 0.1, 0.2], &labels).unwrap_err();

        assert_eq!(
            err,
            ClassificationError::LabelMismatch {
                logits: 3,
                labels: 2
            }
        );
    }

    #[test]
    fn test_non_finite_logit_is_rejected() {
        let labels = labels(&["a", "b"]);

        assert_eq!(
            ClassificationResult::from_logits(&[0.5, f32::NAN], &labels),
            Err(ClassificationError::NonFinite(1))
        );
    }
}
