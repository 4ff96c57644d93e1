//! Dashboard HTTP API + push channel.
//!
//! Handlers are thin: each validates preconditions, then delegates to
//! `Engine`/`CaseModel`/`driver` and maps the result to a response. State
//! transitions are handed off to a background `tokio::spawn`ed task so the
//! handler returns `202 Accepted` immediately instead of blocking on the
//! full run.

use crate::api::dto::{AcceptedPayload, CasePayload};
use crate::core::case_model::CaseStatus;
use crate::core::driver::{self, CancelFlag};
use crate::core::engine::Engine;
use crate::core::error::EngineError;
use crate::core::manifest::render_line;
use crate::core::schemas;
use axum::extract::{Path as AxumPath, State};
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use futures::stream::Stream;
use serde_json::json;
use std::convert::Infallible;
use std::time::Duration;
use tokio_stream::StreamExt;

pub fn router(engine: Engine) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/cases", get(list_cases))
        .route("/api/cases/:id", get(get_case))
        .route("/api/cases/:id/process", post(process_case))
        .route("/api/cases/:id/hydrated", get(get_hydrated).put(put_hydrated))
        .route("/api/cases/:id/render", post(render_case))
        .route("/api/cases/:id/manifest", get(get_manifest))
        .route("/api/events", get(events))
        .with_state(engine)
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn list_cases(State(engine): State<Engine>) -> Result<Json<Vec<CasePayload>>, EngineError> {
    let cases = engine.case_model().list()?;
    Ok(Json(cases.into_iter().map(CasePayload::from).collect()))
}

async fn get_case(
    State(engine): State<Engine>,
    AxumPath(id): AxumPath<String>,
) -> Result<Json<CasePayload>, EngineError> {
    let case = engine.case_model().get(&id)?;
    Ok(Json(CasePayload::from(case)))
}

/// `POST /api/cases/{id}/process`. Validates preconditions synchronously
/// (case exists, status permits a new job), then acquires the lease itself —
/// synchronously, before returning — so two concurrent requests can never
/// both observe the case as free; the loser gets `409` here rather than
/// racing into the background task. Reserves a queue slot, then spawns the
/// actual job in the background carrying the already-held lease, and
/// returns `202` immediately.
async fn process_case(
    State(engine): State<Engine>,
    AxumPath(id): AxumPath<String>,
) -> Result<Response, EngineError> {
    let case = engine.case_model().get(&id)?;
    let restart_allowed = matches!(
        case.status,
        CaseStatus::New | CaseStatus::PendingReview | CaseStatus::Error | CaseStatus::Complete
    );
    if !restart_allowed {
        return Err(EngineError::Conflict(format!(
            "case '{id}' is in status {:?}; process is not permitted from this state",
            case.status
        )));
    }
    let lease = engine
        .leases
        .acquire(&id)
        .ok_or_else(|| EngineError::already_running(&id))?;
    let Some(slot) = engine.try_reserve_queue_slot() else {
        return Ok((axum::http::StatusCode::SERVICE_UNAVAILABLE, Json(json!({
            "error": "queue_full",
            "message": "processing queue is at capacity",
        })))
            .into_response());
    };

    let background_engine = engine.clone();
    let background_id = id.clone();
    tokio::spawn(async move {
        let _slot = slot;
        if let Err(err) = driver::start_processing(background_engine, background_id.clone(), CancelFlag::new(), lease).await {
            tracing::error!(case_id = %background_id, error = %err, "processing job exited with an unhandled error");
        }
    });

    Ok((
        axum::http::StatusCode::ACCEPTED,
        Json(AcceptedPayload {
            case_id: id,
            status: "PROCESSING".to_string(),
        }),
    )
        .into_response())
}

/// `POST /api/cases/{id}/render`.
async fn render_case(
    State(engine): State<Engine>,
    AxumPath(id): AxumPath<String>,
) -> Result<Response, EngineError> {
    let case = engine.case_model().get(&id)?;
    if case.status != CaseStatus::PendingReview {
        return Err(EngineError::Conflict(format!(
            "case '{id}' is in status {:?}; render requires PENDING_REVIEW",
            case.status
        )));
    }
    let lease = engine
        .leases
        .acquire(&id)
        .ok_or_else(|| EngineError::already_running(&id))?;
    let Some(slot) = engine.try_reserve_queue_slot() else {
        return Ok((axum::http::StatusCode::SERVICE_UNAVAILABLE, Json(json!({
            "error": "queue_full",
            "message": "processing queue is at capacity",
        })))
            .into_response());
    };

    let background_engine = engine.clone();
    let background_id = id.clone();
    tokio::spawn(async move {
        let _slot = slot;
        if let Err(err) = driver::start_render(background_engine, background_id.clone(), lease).await {
            tracing::error!(case_id = %background_id, error = %err, "render job exited with an unhandled error");
        }
    });

    Ok((
        axum::http::StatusCode::ACCEPTED,
        Json(AcceptedPayload {
            case_id: id,
            status: "RENDERING".to_string(),
        }),
    )
        .into_response())
}

async fn get_hydrated(
    State(engine): State<Engine>,
    AxumPath(id): AxumPath<String>,
) -> Result<Response, EngineError> {
    let case = engine.case_model().get(&id)?;
    if case.status == CaseStatus::New || case.status == CaseStatus::Processing {
        return Err(EngineError::Conflict(format!(
            "case '{id}' has not reached PENDING_REVIEW yet"
        )));
    }
    let path = engine.config.case_output_dir(&id).join("hydrated.json");
    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|_| EngineError::not_found(&id))?;
    let value: serde_json::Value = serde_json::from_slice(&bytes)?;
    Ok(Json(value).into_response())
}

async fn put_hydrated(
    State(engine): State<Engine>,
    AxumPath(id): AxumPath<String>,
    body: axum::body::Bytes,
) -> Result<Response, EngineError> {
    let case = engine.case_model().get(&id)?;
    if !matches!(case.status, CaseStatus::PendingReview | CaseStatus::Complete) {
        return Err(EngineError::Conflict(format!(
            "case '{id}' is in status {:?}; hydrated object is only editable in PENDING_REVIEW or COMPLETE",
            case.status
        )));
    }
    let value = schemas::validate_hydrated_object(&body)?;
    let output_dir = engine.config.case_output_dir(&id);
    tokio::fs::create_dir_all(&output_dir).await?;
    let tmp_path = output_dir.join("hydrated.json.tmp");
    let final_path = output_dir.join("hydrated.json");
    tokio::fs::write(&tmp_path, serde_json::to_vec_pretty(&value)?).await?;
    tokio::fs::rename(&tmp_path, &final_path).await?;
    Ok(Json(value).into_response())
}

async fn get_manifest(
    State(engine): State<Engine>,
    AxumPath(id): AxumPath<String>,
) -> Result<Json<serde_json::Value>, EngineError> {
    // Existence of the case (not just the manifest) is what 404s here,
    // matching "raw manifest lines (read-only; for debugging)".
    let _ = engine.case_model().get(&id)?;
    let lines = engine.manifest.read(&id)?;
    let rendered: Vec<String> = lines.iter().map(render_line).collect();
    Ok(Json(json!({ "case_id": id, "lines": rendered })))
}

/// `GET /api/events`: Server-Sent Events push channel. Hint-only — a
/// dropped or lagging connection loses no authoritative state, since
/// clients always re-fetch via the matching `GET` on receipt.
async fn events(
    State(engine): State<Engine>,
) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    let receiver = engine.push.subscribe();
    let stream = tokio_stream::wrappers::BroadcastStream::new(receiver).filter_map(|item| {
        item.ok().and_then(|event| {
            serde_json::to_string(&event)
                .ok()
                .map(|data| Ok(SseEvent::default().event(event.event_name()).data(data)))
        })
    });
    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}
