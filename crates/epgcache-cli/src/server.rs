//! HTTP endpoint serving the cached artifact.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use epgcache_store::CacheStore;
use serde_json::json;
use tokio::sync::Notify;

use crate::scheduler::{SchedulerStatus, StatusBoard};

/// RFC 7231 IMF-fixdate.
const HTTP_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// State shared by all handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Published artifact.
    pub store: Arc<dyn CacheStore>,
    /// Scheduler bookkeeping.
    pub status: Arc<StatusBoard>,
    /// Wakes the scheduler; `None` disables `POST /refresh`.
    pub trigger: Option<Arc<Notify>>,
}

/// Error visible to HTTP clients.
#[derive(Debug, thiserror::Error)]
pub enum ServeError {
    /// No refresh has published an artifact yet.
    #[error("EPG not yet generated")]
    NoArtifactAvailable,
}

impl IntoResponse for ServeError {
    fn into_response(self) -> Response {
        let status = match self {
            Self::NoArtifactAvailable => StatusCode::SERVICE_UNAVAILABLE,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Builds the router.
///
/// Handlers only read the store; they never reach the upstream API.
#[must_use]
pub fn router(state: AppState) -> Router {
    let mut router = Router::new()
        .route("/epg", get(get_epg))
        .route("/status", get(get_status));
    if state.trigger.is_some() {
        router = router.route("/refresh", post(post_refresh));
    }
    router.with_state(state)
}

async fn get_epg(State(state): State<AppState>) -> Result<Response, ServeError> {
    let artifact = state.store.read().ok_or(ServeError::NoArtifactAvailable)?;
    let last_modified = artifact
        .generated_at()
        .format(HTTP_DATE_FORMAT)
        .to_string();
    tracing::debug!(bytes = artifact.len(), "Serving artifact");

    Ok((
        [
            (header::CONTENT_TYPE, String::from("application/xml")),
            (header::LAST_MODIFIED, last_modified),
        ],
        artifact.bytes().clone(),
    )
        .into_response())
}

async fn get_status(State(state): State<AppState>) -> Json<SchedulerStatus> {
    Json(state.status.snapshot())
}

async fn post_refresh(State(state): State<AppState>) -> impl IntoResponse {
    if let Some(trigger) = &state.trigger {
        trigger.notify_one();
    }
    (
        StatusCode::ACCEPTED,
        Json(json!({ "status": "refresh scheduled" })),
    )
}
