//! HTTP surface: the current-conditions report and a health probe.

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::watch;

use crate::error::Error;
use crate::render::{render, ReportFormat};
use crate::report::normalize;
use crate::station::StationConfig;
use crate::weather::ObservationSource;

/// Default listen port.
pub const DEFAULT_PORT: u16 = 8080;

/// Shared state for handlers. Read-only after startup.
pub struct AppState<S> {
    pub source: Arc<S>,
    pub station: Arc<StationConfig>,
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            source: self.source.clone(),
            station: self.station.clone(),
        }
    }
}

/// Query params for the report
#[derive(Debug, Deserialize)]
pub struct ReportQuery {
    #[serde(default)]
    pub format: Option<String>,
}

/// HTTP status a per-request failure is reported with.
pub fn status_for(err: &Error) -> StatusCode {
    match err {
        Error::Timeout => StatusCode::GATEWAY_TIMEOUT,
        Error::Network(_) | Error::Decode(_) | Error::EmptyObservation => StatusCode::BAD_GATEWAY,
        Error::Config(_) | Error::Io { .. } | Error::Auth(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(err: &Error) -> Response {
    (
        status_for(err),
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        format!("Unable to load current conditions: {}\n", err),
    )
        .into_response()
}

/// GET / - Current conditions report
async fn report<S: ObservationSource>(
    State(state): State<AppState<S>>,
    Query(query): Query<ReportQuery>,
    headers: HeaderMap,
) -> Response {
    let format = match query.format.as_deref() {
        Some(requested) => match ReportFormat::parse(requested) {
            Some(f) => f,
            None => {
                return (
                    StatusCode::BAD_REQUEST,
                    format!("Unsupported format '{}'; use text, html or json\n", requested),
                )
                    .into_response();
            }
        },
        None => ReportFormat::from_accept(
            headers
                .get(header::ACCEPT)
                .and_then(|value| value.to_str().ok()),
        ),
    };

    let station = state.station.as_ref();
    let result = match state.source.fetch_current(station).await {
        Ok(obs) => normalize(&obs, station),
        Err(e) => Err(e),
    };

    match result {
        Ok(report) => {
            log::debug!(
                "Served report for {} observed at {}",
                report.station_id,
                report.observed_at
            );
            (
                StatusCode::OK,
                [(header::CONTENT_TYPE, format.content_type())],
                render(&report, format),
            )
                .into_response()
        }
        Err(e) => {
            log::error!("Report for {} failed: {}", station.station_id, e);
            error_response(&e)
        }
    }
}

/// GET /health - Health check endpoint
async fn health_check() -> &'static str {
    "ok"
}

/// Create the HTTP router
pub fn create_router<S: ObservationSource>(source: Arc<S>, station: Arc<StationConfig>) -> Router {
    let state = AppState { source, station };

    Router::new()
        .route("/", get(report::<S>))
        .route("/health", get(health_check))
        .with_state(state)
}

/// Run the HTTP server until `shutdown` fires
pub async fn run_http_server(
    router: Router,
    port: u16,
    mut shutdown: watch::Receiver<()>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;
    log::info!("HTTP server listening on port {}", port);

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = shutdown.changed().await;
        })
        .await?;

    Ok(())
}
