use crate::{
    config::Config, routes::api_routes, telemetry::Metrics, upload::UploadStore,
};
use axum::{extract::DefaultBodyLimit, Router};
use axum_otel_metrics::HttpMetricsLayerBuilder;
use lesion_prediction::ModelService;
use std::sync::Arc;
use tokio::{net::TcpListener, sync::broadcast::Receiver, task::JoinHandle};
use tower_http::{services::ServeDir, trace::TraceLayer};

pub struct SharedState<M: ModelService> {
    pub model_service: Arc<M>,
    pub upload_store: Arc<UploadStore>,
    pub metrics: Arc<Metrics>,
}

impl<M: ModelService> SharedState<M> {
    pub fn new(model_service: M, upload_store: UploadStore, metrics: Metrics) -> Self {
        Self {
            model_service: Arc::new(model_service),
            upload_store: Arc::new(upload_store),
            metrics: Arc::new(metrics),
        }
    }
}

impl<M: ModelService> Clone for SharedState<M> {
    fn clone(&self) -> Self {
        Self {
            model_service: self.model_service.clone(),
            upload_store: self.upload_store.clone(),
            metrics: self.metrics.clone(),
        }
    }
}

/// Application routes, uploaded file serving and the HTTP middleware stack.
pub fn build_router<M: ModelService>(state: SharedState<M>, max_upload_bytes: usize) -> Router {
    let uploads = ServeDir::new(state.upload_store.dir());
    let uploads_prefix = state.upload_store.url_prefix().to_string();
    let metrics_layer = HttpMetricsLayerBuilder::new().build();

    Router::new()
        .merge(api_routes::<M>())
        .nest_service(&uploads_prefix, uploads)
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(metrics_layer)
}

pub struct HttpServer {
    router: Router,
    listener: TcpListener,
}

impl HttpServer {
    pub async fn new<M: ModelService>(state: SharedState<M>, config: &Config) -> anyhow::Result<Self> {
        let addr = config.server.get_address();
        let router = build_router(state, config.server.max_upload_bytes());
        let listener = TcpListener::bind(addr).await?;

        Ok(Self { router, listener })
    }

    pub async fn run(
        self,
        shutdown_rx: Receiver<()>,
    ) -> anyhow::Result<JoinHandle<anyhow::Result<()>>> {
        tracing::info!("Starting app on {}", self.listener.local_addr()?);

        let listener = self.listener;
        let router = self.router;
        let server_handle = tokio::spawn({
            let mut shutdown_rx = shutdown_rx.resubscribe();
            async move {
                axum::serve(listener, router)
                    .with_graceful_shutdown(async move {
                        shutdown_rx.recv().await.ok();
                    })
                    .await?;
                Ok(())
            }
        });

        Ok(server_handle)
    }
}
