use std::collections::BTreeMap;

use axum::{
    Json,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use tracing::{debug, info};

use super::{
    models::{HealthResponse, JobAcceptedResponse, JobStatusResponse, QueueHealth, SubmitJobRequest},
    state::AppState,
    utils::{parse_content_type, read_limited},
    validation::validate_submission,
};
use crate::api::error::ApiError;
use crate::config::AdmissionPolicy;
use crate::events::sse;
use crate::queue::{Admission, JobId, JobStatus};

/// Job submission endpoint (POST /jobs)
///
/// ## Flow:
/// 1. Validate Content-Type (must be application/json)
/// 2. Read the body up to `server.max_payload_bytes`
/// 3. Deserialize and validate the submission
/// 4. Enqueue according to `queue.admission`: wait for a slot, or answer
///    503 when the queue is full
/// 5. Return 202 Accepted with the job id
pub async fn submit_job(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: axum::body::Body,
) -> Result<impl IntoResponse, ApiError> {
    let content_type = headers
        .get(axum::http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::InvalidPayload("missing Content-Type header".into()))?;
    parse_content_type(content_type)?;

    let max_size = state.config.server.max_payload_bytes.as_usize();
    let body_bytes = read_limited(body, max_size).await?;

    let payload: SubmitJobRequest = serde_json::from_slice(&body_bytes)?;
    let (id, request) = validate_submission(payload)?;
    debug!(source_id = %request.source_id, format = ?request.format, "Submission validated");

    let job_id = match state.config.queue.admission {
        AdmissionPolicy::Block => state.queue.submit(id, request).await?,
        AdmissionPolicy::Reject => match state.queue.try_submit(id, request)? {
            Admission::Accepted(job_id) => job_id,
            Admission::RejectedAtCapacity => {
                state.metrics.job_rejected();
                return Err(ApiError::QueueFull);
            }
        },
    };

    state.metrics.job_submitted();
    info!(job_id = %job_id, "Job accepted");

    let response = JobAcceptedResponse {
        job_id,
        status: JobStatus::Queued,
    };
    Ok((StatusCode::ACCEPTED, Json(response)))
}

fn parse_path_id(raw: &str) -> Result<JobId, ApiError> {
    JobId::parse(raw).map_err(|_| ApiError::NotFound(format!("job {raw}")))
}

/// Job status endpoint (GET /jobs/{job_id})
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_path_id(&job_id)?;
    let job = state
        .queue
        .status(&id)
        .ok_or_else(|| ApiError::NotFound(format!("job {id}")))?;

    Ok((StatusCode::OK, Json(JobStatusResponse::from(job))))
}

/// Cancellation endpoint (DELETE /jobs/{job_id})
///
/// Cancellation is asynchronous: the job reaches `Failed` with code
/// `CANCELLED` once its worker observes the request.
pub async fn cancel_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_path_id(&job_id)?;
    state.queue.cancel(&id)?;
    info!(job_id = %id, "Cancellation requested");

    let status = state
        .queue
        .status(&id)
        .map(|job| job.status)
        .ok_or_else(|| ApiError::NotFound(format!("job {id}")))?;

    Ok((StatusCode::ACCEPTED, Json(JobAcceptedResponse { job_id: id, status })))
}

/// Progress stream (GET /events)
pub async fn stream_events(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let stream = sse::subscribe(&state.hub, state.config.events.keep_alive()).await?;
    Ok(stream)
}

/// Health check endpoint (GET /health)
///
/// Returns 503 Service Unavailable if the queue or the event hub has
/// stopped, 200 OK otherwise.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let component = |running: bool| (if running { "healthy" } else { "stopped" }).to_string();

    let mut components = BTreeMap::new();
    components.insert("api".to_string(), component(true));
    components.insert("queue".to_string(), component(state.queue.is_running()));
    components.insert("event_hub".to_string(), component(state.hub.is_running()));

    let all_healthy = components.values().all(|status| status == "healthy");
    let status_code = if all_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = HealthResponse {
        status: (if all_healthy { "healthy" } else { "unhealthy" }).to_string(),
        components,
        version: env!("CARGO_PKG_VERSION").to_string(),
        queue: QueueHealth {
            workers: state.queue.num_workers(),
            capacity: state.queue.capacity(),
            depth: state.queue.depth(),
            jobs: state.queue.stats(),
        },
        subscribers: state.hub.client_count().await,
        metrics: state.metrics.snapshot(),
    };

    (status_code, Json(response))
}
