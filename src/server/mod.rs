//! HTTP surface for razorx.
//!
//! Routes:
//! - `GET /health`
//! - `POST /transcribe`: audio body to `{transcription}`
//! - `POST /execute`: `{transcription}` to statements and outcomes
//! - `POST /upload`: audio body through transcription and the pipeline

mod error;
mod handlers;

pub use error::ApiError;
pub use handlers::{ExecuteRequest, TranscribeResponse};

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::error::{AppError, Result};
use crate::pipeline::Pipeline;
use crate::transcribe::Transcriber;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub transcriber: Arc<dyn Transcriber>,
    pub upload_dir: PathBuf,
}

impl AppState {
    pub fn new(
        pipeline: Arc<Pipeline>,
        transcriber: Arc<dyn Transcriber>,
        upload_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            pipeline,
            transcriber,
            upload_dir: upload_dir.into(),
        }
    }
}

/// Builds the router. Bodies larger than `max_body_bytes` get a 413.
pub fn router(state: AppState, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/transcribe", post(handlers::transcribe))
        .route("/execute", post(handlers::execute))
        .route("/upload", post(handlers::upload))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .with_state(state)
}

/// A bound HTTP server, ready to serve.
pub struct HttpServer {
    listener: TcpListener,
    app: Router,
}

impl HttpServer {
    /// Binds to the configured address. Port 0 picks a free port.
    pub async fn bind(config: &ServerConfig, state: AppState) -> Result<Self> {
        let bind_addr = config.bind_addr();
        let listener = TcpListener::bind(&bind_addr).await.map_err(|e| {
            AppError::config(format!("Failed to bind to {bind_addr}: {e}"))
        })?;

        Ok(Self {
            listener,
            app: router(state, config.max_upload_bytes),
        })
    }

    /// The address actually bound.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .map_err(|e| AppError::internal(format!("Failed to read bound address: {e}")))
    }

    /// Serves until SIGINT or SIGTERM.
    pub async fn run(self) -> Result<()> {
        self.run_until(wait_for_signal()).await
    }

    /// Serves until `shutdown` resolves, then drains in-flight requests.
    pub async fn run_until(self, shutdown: impl Future<Output = ()> + Send + 'static) -> Result<()> {
        let addr = self.local_addr()?;
        info!(%addr, "HTTP server listening");

        axum::serve(self.listener, self.app)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| AppError::internal(format!("HTTP server error: {e}")))?;

        info!("HTTP server stopped");
        Ok(())
    }
}

/// Waits for SIGINT or SIGTERM.
async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
