use crate::{
    decoder, page, presenter::PredictionView, server::SharedState, upload::UploadError,
    validation,
};
use axum::{
    extract::{
        multipart::{Field, MultipartError},
        Multipart, Query, State,
    },
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
};
use lesion_prediction::{ModelService, ModelServiceError};
use serde::Deserialize;
use std::time::Instant;
use thiserror::Error;
use tracing::instrument;

const IMAGE_FIELD: &str = "image";
const ROUTE: &str = "/";

/// Upload problems reported back to the user on the form page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    NoFilePart,
    NoSelectedFile,
    FileTypeNotAllowed,
    InvalidImage,
}

impl Rejection {
    pub const ALL: [Rejection; 4] = [
        Rejection::NoFilePart,
        Rejection::NoSelectedFile,
        Rejection::FileTypeNotAllowed,
        Rejection::InvalidImage,
    ];

    pub fn code(self) -> &'static str {
        match self {
            Rejection::NoFilePart => "no-file-part",
            Rejection::NoSelectedFile => "no-selected-file",
            Rejection::FileTypeNotAllowed => "file-type-not-allowed",
            Rejection::InvalidImage => "invalid-image",
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            Rejection::NoFilePart => "No file part",
            Rejection::NoSelectedFile => "No selected file",
            Rejection::FileTypeNotAllowed => {
                "File type not allowed. Only png, jpg, jpeg are supported."
            }
            Rejection::InvalidImage => "Invalid image file. Please upload a valid image.",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.code() == code)
    }

    fn redirect(self) -> Redirect {
        Redirect::to(&format!("{}?notice={}", ROUTE, self.code()))
    }
}

#[derive(Debug)]
pub enum Outcome {
    Predicted(PredictionView),
    Rejected(Rejection),
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Malformed upload: {0}")]
    Multipart(#[from] MultipartError),
    #[error("Upload storage failed: {0}")]
    Storage(#[from] UploadError),
    #[error("Background task failed: {0}")]
    Task(String),
    #[error("Classification failed: {0}")]
    Inference(#[from] ModelServiceError),
    #[error("Model returned no classes")]
    EmptyClassification,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Multipart(e) => e.status(),
            AppError::Storage(_)
            | AppError::Task(_)
            | AppError::Inference(_)
            | AppError::EmptyClassification => StatusCode::INTERNAL_SERVER_ERROR,
        };
        tracing::error!("Request failed: {}", self);
        (status, format!("Something went wrong: {}", self)).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct IndexQuery {
    notice: Option<String>,
}

#[instrument(skip(state))]
pub async fn show_form<M: ModelService>(
    State(state): State<SharedState<M>>,
    Query(query): Query<IndexQuery>,
) -> Html<String> {
    state.metrics.record_request(ROUTE);
    let notice = query.notice.as_deref().and_then(Rejection::from_code);
    page::render_form(notice.map(Rejection::message), state.model_service.model_id())
}

#[instrument(skip(state, multipart))]
pub async fn submit<M: ModelService>(
    State(state): State<SharedState<M>>,
    multipart: Multipart,
) -> Result<Response, AppError> {
    state.metrics.record_request(ROUTE);

    match process_upload(&state, multipart).await? {
        Outcome::Predicted(view) => Ok(page::render_prediction(&view).into_response()),
        Outcome::Rejected(rejection) => {
            tracing::warn!(reason = rejection.code(), "Upload rejected");
            state.metrics.record_rejection(rejection.code());
            Ok(rejection.redirect().into_response())
        }
    }
}

/// Validate, store, decode, classify. The first `image` field wins, other
/// fields are ignored.
pub async fn process_upload<M: ModelService>(
    state: &SharedState<M>,
    mut multipart: Multipart,
) -> Result<Outcome, AppError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some(IMAGE_FIELD) {
            return process_image_field(state, field).await;
        }
    }
    Ok(Outcome::Rejected(Rejection::NoFilePart))
}

fn accept_filename(file_name: Option<&str>) -> Result<String, Rejection> {
    match file_name {
        None => Err(Rejection::NoFilePart),
        Some("") => Err(Rejection::NoSelectedFile),
        Some(name) if !validation::is_allowed(name) => Err(Rejection::FileTypeNotAllowed),
        Some(name) => Ok(name.to_string()),
    }
}

async fn process_image_field<M: ModelService>(
    state: &SharedState<M>,
    field: Field<'_>,
) -> Result<Outcome, AppError> {
    let filename = match accept_filename(field.file_name()) {
        Ok(filename) => filename,
        Err(rejection) => return Ok(Outcome::Rejected(rejection)),
    };

    let bytes = field.bytes().await?;
    let upload = match state.upload_store.save(&filename, &bytes).await {
        Ok(upload) => upload,
        Err(UploadError::UnusableFilename(_)) => {
            return Ok(Outcome::Rejected(Rejection::FileTypeNotAllowed))
        }
        Err(e) => return Err(e.into()),
    };

    if upload.filename != filename {
        tracing::debug!("Upload {:?} stored as {}", filename, upload.filename);
    }

    let path = upload.path.clone();
    let decoded = tokio::task::spawn_blocking(move || decoder::decode_rgb(&path))
        .await
        .map_err(|e| AppError::Task(e.to_string()))?;
    let image = match decoded {
        Ok(image) => image,
        Err(e) => {
            tracing::warn!("Discarding undecodable upload: {}", e);
            state.upload_store.remove(&upload).await?;
            return Ok(Outcome::Rejected(Rejection::InvalidImage));
        }
    };

    let started = Instant::now();
    let result = state.model_service.classify(image).await?;
    state
        .metrics
        .record_prediction_duration(started.elapsed().as_millis() as u64, ROUTE);

    let view = PredictionView::new(result, state.model_service.model_id(), upload.url)
        .ok_or(AppError::EmptyClassification)?;
    tracing::debug!(
        prediction = %view.prediction,
        probability = view.probability,
        diseased = view.is_diseased,
        "Classified {}",
        view.uploaded_image
    );

    Ok(Outcome::Predicted(view))
}
