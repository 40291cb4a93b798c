use crate::server::SharedState;
use axum::{extract::State, response::IntoResponse, response::Json};
use lesion_prediction::ModelService;
use serde::Serialize;

#[derive(Serialize)]
pub struct Health {
    status: &'static str,
    model_id: String,
}

pub async fn healthcheck<M: ModelService>(State(state): State<SharedState<M>>) -> impl IntoResponse {
    Json(Health {
        status: "Available",
        model_id: state.model_service.model_id().to_string(),
    })
}
