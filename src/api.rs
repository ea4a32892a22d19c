//! REST endpoints for submitting and inspecting load-test jobs.

use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::error::JobError;
use crate::jobs::{JobId, JobService, JobStatus, MediaType};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<JobService>,
    /// Base URL for job links. Derived from the `Host` header when `None`.
    pub public_url: Option<String>,
}

/// Body of status-only responses.
#[derive(Debug, Serialize)]
struct StatusBody {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    service: Option<&'static str>,
}

/// Build the Axum router with the `/test` routes.
pub fn test_routes(service: Arc<JobService>, public_url: Option<String>) -> Router {
    let state = AppState {
        service,
        public_url,
    };

    Router::new()
        .route("/health", get(health))
        .route(
            "/test",
            get(list_tests).post(create_test).delete(cleanup_tests),
        )
        .route("/test/{id}", get(get_test))
        .with_state(state)
}

// ── Health ──────────────────────────────────────────────────────────────

async fn health() -> impl IntoResponse {
    Json(StatusBody {
        status: "ok",
        service: Some("taurus-api"),
    })
}

// ── Jobs ────────────────────────────────────────────────────────────────

async fn list_tests(State(state): State<AppState>, headers: HeaderMap) -> Response {
    info!("GET /test");
    match state.service.list().await {
        Ok(Some(ids)) => {
            let base = base_url(&state, &headers);
            let urls: Vec<String> = ids.iter().map(|id| job_url(&base, *id)).collect();
            Json(urls).into_response()
        }
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(e) => {
            error!(error = %e, "Failed to list jobs");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string())
        }
    }
}

async fn get_test(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    info!("GET /test/{id}");
    let Ok(job_id) = id.parse::<JobId>() else {
        return error_response(StatusCode::BAD_REQUEST, "Invalid test ID");
    };

    match state.service.get(job_id).await {
        Ok(JobStatus::Done(result)) => (StatusCode::OK, result).into_response(),
        Ok(JobStatus::Pending) => (
            StatusCode::OK,
            Json(StatusBody {
                status: "still running",
                service: None,
            }),
        )
            .into_response(),
        Ok(JobStatus::NotFound) => StatusCode::NOT_FOUND.into_response(),
        Err(e) => {
            error!(job_id = %job_id, error = %e, "Failed to read job");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string())
        }
    }
}

async fn create_test(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    info!("POST /test");
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    let result = match MediaType::from_content_type(content_type) {
        Ok(media_type) => state.service.submit(body, media_type).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(id) => {
            let location = job_url(&base_url(&state, &headers), id);
            (StatusCode::CREATED, [(header::LOCATION, location)]).into_response()
        }
        Err(e @ JobError::UnsupportedMediaType(_)) => {
            warn!(error = %e, "Rejected submission");
            error_response(StatusCode::UNSUPPORTED_MEDIA_TYPE, &e.to_string())
        }
        Err(e @ JobError::MalformedDocument { .. }) => {
            warn!(error = %e, "Rejected submission");
            error_response(StatusCode::BAD_REQUEST, &e.to_string())
        }
        Err(e) => {
            error!(error = %e, "Failed to submit job");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string())
        }
    }
}

async fn cleanup_tests(State(state): State<AppState>) -> StatusCode {
    info!("DELETE /test");
    state.service.cleanup().await;
    StatusCode::NO_CONTENT
}

// ── Helpers ─────────────────────────────────────────────────────────────

fn base_url(state: &AppState, headers: &HeaderMap) -> String {
    if let Some(url) = &state.public_url {
        return url.trim_end_matches('/').to_string();
    }
    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost");
    format!("http://{host}")
}

fn job_url(base: &str, id: JobId) -> String {
    format!("{base}/test/{id}")
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(serde_json::json!({"error": message}))).into_response()
}
