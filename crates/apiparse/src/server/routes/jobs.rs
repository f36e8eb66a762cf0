//! Job submission, polling and entry point selection endpoints

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, ErrorResponse};
use crate::jobs::JobPhase;
use crate::server::state::AppState;

/// Declared API vendor of a text submission
pub const VENDOR_HEADER: &str = "x-api-vendor";

/// Optional entry point of an archive submission
pub const ENTRYPOINT_HEADER: &str = "x-entrypoint";

const LD_JSON: &str = "application/ld+json";

type HandlerResult = std::result::Result<Response, ErrorResponse>;

/// Body of a successful submission
#[derive(Debug, Serialize, Deserialize)]
pub struct CreatedResponse {
    pub status: u16,
    pub location: String,
    pub key: Uuid,
}

/// Body of a job waiting for entry point selection
#[derive(Debug, Serialize, Deserialize)]
pub struct CandidatesResponse {
    pub files: Vec<String>,
}

/// Body of `PUT /job/:id`
#[derive(Debug, Deserialize)]
pub struct EntrypointRequest {
    pub entrypoint: String,
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Job keys that do not parse can never exist
fn parse_key(key: &str) -> Result<Uuid, Error> {
    Uuid::parse_str(key).map_err(|_| Error::not_found(key))
}

fn created(state: &AppState, key: Uuid) -> Response {
    let location = state.job_location(&key);
    let body = CreatedResponse {
        status: StatusCode::CREATED.as_u16(),
        location: location.clone(),
        key,
    };
    (
        StatusCode::CREATED,
        [(header::LOCATION, location)],
        Json(body),
    )
        .into_response()
}

/// POST /text - Parse a single document declared by the `x-api-vendor` header
pub async fn submit_text(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> HandlerResult {
    let vendor = header_value(&headers, VENDOR_HEADER)
        .ok_or_else(|| Error::invalid_input("x-api-vendor header is missing"))?;
    if body.is_empty() {
        return Err(Error::invalid_input("Request body is not set").into());
    }

    let content = String::from_utf8_lossy(&body).into_owned();
    let key = state.registry().submit_text(content, vendor.clone())?;
    tracing::info!(job_id = %key, vendor = %vendor, bytes = body.len(), "Text job submitted");

    Ok(created(&state, key))
}

/// POST /file - Parse a zipped project, optionally naming its entry point
pub async fn submit_file(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> HandlerResult {
    let entrypoint = header_value(&headers, ENTRYPOINT_HEADER);
    let size = body.len();

    let key = state.registry().submit_archive(body, entrypoint.clone())?;
    tracing::info!(
        job_id = %key,
        entrypoint = ?entrypoint,
        bytes = size,
        "Archive job submitted"
    );

    Ok(created(&state, key))
}

/// GET /job/:id - Poll a job. Terminal results are handed out once.
pub async fn poll_job(State(state): State<AppState>, Path(key): Path<String>) -> HandlerResult {
    let id = parse_key(&key)?;
    let job = state.registry().get(&id)?;
    let location = state.job_location(&id);

    match job.phase() {
        JobPhase::Initialized | JobPhase::Running => {
            Ok((StatusCode::NO_CONTENT, [(header::LOCATION, location)]).into_response())
        }
        JobPhase::Waiting { candidates } => Ok((
            StatusCode::MULTIPLE_CHOICES,
            [(header::LOCATION, location)],
            Json(CandidatesResponse { files: candidates }),
        )
            .into_response()),
        JobPhase::Finished(result) => {
            let _ = state.registry().remove(&id);
            Ok((
                StatusCode::OK,
                [(header::CONTENT_TYPE, LD_JSON)],
                result.rendered,
            )
                .into_response())
        }
        JobPhase::Failed { error } => {
            let _ = state.registry().remove(&id);
            Err(ErrorResponse::new(StatusCode::INTERNAL_SERVER_ERROR, error))
        }
    }
}

/// PUT /job/:id - Choose the entry point of a waiting job
pub async fn select_entry_point(
    State(state): State<AppState>,
    Path(key): Path<String>,
    body: Bytes,
) -> HandlerResult {
    let bad_request = |e: Error| ErrorResponse::with_status(StatusCode::BAD_REQUEST, e);

    let id = parse_key(&key).map_err(bad_request)?;
    let job = state.registry().get(&id).map_err(bad_request)?;

    let request: EntrypointRequest = serde_json::from_slice(&body).map_err(|e| {
        ErrorResponse::new(
            StatusCode::BAD_REQUEST,
            format!("Invalid entrypoint body: {}", e),
        )
    })?;

    job.select_entry_point(&request.entrypoint)
        .await
        .map_err(bad_request)?;
    tracing::info!(job_id = %id, entrypoint = %request.entrypoint, "Entry point selected");

    Ok(created(&state, id))
}

/// DELETE /job/:id - Cancel and forget a job
pub async fn delete_job(State(state): State<AppState>, Path(key): Path<String>) -> HandlerResult {
    let bad_request = |e: Error| ErrorResponse::with_status(StatusCode::BAD_REQUEST, e);

    let id = parse_key(&key).map_err(bad_request)?;
    state.registry().remove(&id).map_err(bad_request)?;

    Ok(StatusCode::NO_CONTENT.into_response())
}
