use lesion_prediction::{ClassificationResult, LabelProbability};

pub const TOP_K: usize = 6;
pub const NORMAL_LABEL: &str = "normal";

/// Everything the result page shows for one classified upload.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionView {
    pub prediction: String,
    pub probability: f32,
    pub results: Vec<LabelProbability>,
    pub is_diseased: bool,
    pub model_id: String,
    pub uploaded_image: String,
}

impl PredictionView {
    /// Returns `None` for an empty classification.
    pub fn new(
        result: ClassificationResult,
        model_id: &str,
        uploaded_image: impl Into<String>,
    ) -> Option<Self> {
        let mut ranked = result.ranked();
        let top = ranked.first()?.clone();
        ranked.truncate(TOP_K);

        Some(Self {
            is_diseased: is_diseased(&top.label),
            prediction: top.label,
            probability: top.probability,
            results: ranked,
            model_id: model_id.to_string(),
            uploaded_image: uploaded_image.into(),
        })
    }
}

pub fn is_diseased(label: &str) -> bool {
    label.to_lowercase() != NORMAL_LABEL
}

pub fn format_percentage(probability: f32) -> String {
    format!("{:.2}%", probability * 100.0)
}
