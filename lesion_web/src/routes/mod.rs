mod assets;
mod health;
mod index;
mod metrics;

use crate::server::SharedState;
use axum::{routing::get, Router};
use lesion_prediction::ModelService;

pub use assets::MAIN_SCRIPT_PATH;

pub fn api_routes<M: ModelService>() -> Router<SharedState<M>> {
    Router::new()
        .route("/", get(index::show_form::<M>).post(index::submit::<M>))
        .route(assets::MAIN_SCRIPT_PATH, get(assets::main_script))
        .route("/health", get(health::healthcheck::<M>))
        .route("/metrics", get(metrics::metrics_handler::<M>))
}
