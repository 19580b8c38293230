//! HTTP surface of the telemetry gateway.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header::CONTENT_TYPE, Method, Request};
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, info_span, warn};
use uuid::Uuid;

use tracepoint_core::TelemetryService;

pub mod config;
pub use config::ServerConfig;

pub mod error;
pub use error::ApiError;

pub mod routes;

#[derive(Clone)]
pub struct AppState {
    pub telemetry: Arc<TelemetryService>,
}

impl AppState {
    pub fn new(telemetry: TelemetryService) -> Self {
        Self {
            telemetry: Arc::new(telemetry),
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE]);

    let trace = TraceLayer::new_for_http().make_span_with(|req: &Request<Body>| {
        info_span!(
            "request",
            id = %Uuid::new_v4(),
            method = %req.method(),
            path = %req.uri().path(),
        )
    });

    Router::new()
        .route("/healthz", get(routes::healthz))
        .route("/api/directories", get(routes::directories))
        .route("/api/files", get(routes::files))
        .route("/api/jsonfile", get(routes::json_file))
        .route("/api/devices", get(routes::devices))
        .route("/api/devices_laststatus", get(routes::devices_last_status))
        .route("/api/device/log", get(routes::device_log))
        .route("/api/devices/scan", get(routes::devices_scan))
        .route("/api/posture/summary", get(routes::posture_summary))
        .with_state(state)
        .layer(cors)
        .layer(trace)
}

pub async fn serve(config: ServerConfig, state: AppState) -> anyhow::Result<()> {
    let addr = config.addr()?;
    let listener = TcpListener::bind(addr).await?;
    info!("Telemetry gateway listening on {addr}");

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down"),
            Err(e) => {
                warn!(error = %e, "Failed to install Ctrl+C handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                warn!(error = %e, "Failed to install terminate handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
