//! Status server.
//!
//! Read-only HTTP view of the scheduler's published status, for kubelet checks and
//! an external cluster-health reporter.

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tower_http::trace::{DefaultMakeSpan, TraceLayer};

use crate::archive::{ArchiveId, GatherReport};
use crate::config::format_period;
use crate::status::{Condition, StatusHandle};
use crate::uploader::UploadAttempt;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub status: StatusHandle,
}

/// Health check response.
#[derive(Serialize)]
struct HealthResponse {
    status: String,
}

/// Body of `/status`.
#[derive(Serialize)]
struct StatusResponse {
    degraded: bool,
    consecutive_failures: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    interval: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    endpoint: Option<String>,
    cycles: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_upload: Option<UploadAttempt>,
    conditions: Vec<Condition>,
}

#[derive(Serialize)]
struct RecordSummary {
    path: String,
    bytes: usize,
}

/// Body of `/archive/latest`.
#[derive(Serialize)]
struct ArchiveResponse {
    id: ArchiveId,
    created_at: DateTime<Utc>,
    total_bytes: usize,
    records: Vec<RecordSummary>,
    gathers: Vec<GatherReport>,
}

/// Create the Axum router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz_handler))
        .route("/readyz", get(readyz_handler))
        .route("/status", get(status_handler))
        .route("/archive/latest", get(latest_archive_handler))
        .layer(TraceLayer::new_for_http().make_span_with(DefaultMakeSpan::default()))
        .with_state(state)
}

/// Liveness check.
async fn healthz_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

/// Readiness check: ready once the first gather cycle has completed.
async fn readyz_handler(State(state): State<AppState>) -> Response {
    if state.status.snapshot().cycles > 0 {
        Json(HealthResponse {
            status: "ok".to_string(),
        })
        .into_response()
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthResponse {
                status: "not_ready".to_string(),
            }),
        )
            .into_response()
    }
}

async fn status_handler(State(state): State<AppState>) -> Json<StatusResponse> {
    let snapshot = state.status.snapshot();
    Json(StatusResponse {
        degraded: snapshot.health.degraded,
        consecutive_failures: snapshot.health.consecutive_failures,
        interval: snapshot.interval.map(format_period),
        endpoint: snapshot.endpoint.clone(),
        cycles: snapshot.cycles,
        conditions: vec![snapshot.degraded_condition()],
        last_upload: snapshot.last_upload,
    })
}

async fn latest_archive_handler(State(state): State<AppState>) -> Response {
    let Some(archive) = state.status.latest_archive() else {
        return (
            StatusCode::NOT_FOUND,
            Json(HealthResponse {
                status: "no archive yet".to_string(),
            }),
        )
            .into_response();
    };

    Json(ArchiveResponse {
        id: archive.id(),
        created_at: archive.created_at(),
        total_bytes: archive.total_bytes(),
        records: archive
            .records()
            .iter()
            .map(|r| RecordSummary {
                path: r.path.clone(),
                bytes: r.len(),
            })
            .collect(),
        gathers: archive.reports().to_vec(),
    })
    .into_response()
}

#[cfg(test)]
mod tests {
    use axum::body::to_bytes;
    use axum::http::Request;
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;
    use crate::status::status_channel;

    async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
        let response = app
            .oneshot(
                Request::builder()
                    .uri(uri)
                    .body(axum::body::Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    #[tokio::test]
    async fn test_not_ready_before_first_cycle() {
        let (_publisher, handle) = status_channel();
        let app = create_router(AppState { status: handle });

        let (status, body) = get_json(app.clone(), "/healthz").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");

        let (status, body) = get_json(app.clone(), "/readyz").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["status"], "not_ready");

        let (status, _) = get_json(app, "/archive/latest").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_status_reports_degraded_condition() {
        let (publisher, handle) = status_channel();
        publisher.update(|s| {
            s.cycles = 5;
            s.interval = Some(std::time::Duration::from_secs(60));
            s.health.consecutive_failures = 5;
            s.health.degraded = true;
        });
        let app = create_router(AppState { status: handle });

        let (status, _) = get_json(app.clone(), "/readyz").await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = get_json(app, "/status").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["degraded"], true);
        assert_eq!(body["interval"], "1m0s");
        assert_eq!(body["conditions"][0]["type"], "Degraded");
        assert_eq!(body["conditions"][0]["status"], "True");
        assert_eq!(body["conditions"][0]["reason"], "UploadFailed");
    }
}
