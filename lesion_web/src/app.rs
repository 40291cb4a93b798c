use crate::config::Config;
use crate::server::{HttpServer, SharedState};
use crate::telemetry::Metrics;
use crate::upload::UploadStore;

use lesion_prediction::{ModelService, OrtModelService};
use std::error::Error;
use tokio::{signal, sync::broadcast};

pub async fn start_app(config: Config) -> Result<(), Box<dyn Error>> {
    let model_service = match OrtModelService::from_config(&config.model).await {
        Ok(service) => service,
        Err(e) => {
            tracing::error!("Failed to initialize model service: {:?}", e);
            return Err(Box::new(e));
        }
    };
    tracing::info!(
        "Loaded model {} with {} classes",
        model_service.model_id(),
        model_service.labels().len()
    );

    let upload_store = match UploadStore::new(&config.uploads).await {
        Ok(store) => store,
        Err(e) => {
            tracing::error!("Failed to prepare upload directory: {:?}", e);
            return Err(Box::new(e));
        }
    };

    let metrics = Metrics::new()?;
    let state = SharedState::new(model_service, upload_store, metrics);
    let server = HttpServer::new(state, &config).await?;

    let (shutdown_tx, _) = broadcast::channel(1);
    let server_shutdown_rx = shutdown_tx.subscribe();

    let server_handle = server.run(server_shutdown_rx).await?;

    shutdown_signal().await;
    tracing::info!("Shutdown signal received, starting graceful shutdown.");

    let _ = shutdown_tx.send(());
    let _ = server_handle.await;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
