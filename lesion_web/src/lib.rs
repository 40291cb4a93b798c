mod decoder;
mod page;
mod presenter;
mod routes;
mod server;
mod telemetry;
mod upload;
mod validation;

pub mod app;
pub mod config;

pub use app::start_app;
