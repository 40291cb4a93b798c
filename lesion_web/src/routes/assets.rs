use axum::{http::header, response::IntoResponse};

pub const MAIN_SCRIPT_PATH: &str = "/static/main.js";
const MAIN_SCRIPT: &str = include_str!("../../static/main.js");

/// Upload preview, drag and drop and the clear button. The form works
/// without it.
pub async fn main_script() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/javascript; charset=utf-8")],
        MAIN_SCRIPT,
    )
}
