//! Request handlers for the five routes in spec.md §4.8's dispatch table.

use axum::extract::{Extension, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use ratewarden_core::Attributes;
use ratewarden_engine::{Engine, Job};
use ratewarden_policy::{Policy, ResultEntry};
use ratewarden_store::CounterBackend;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};

/// Shared state handed to every handler: the hot-swappable active policy and
/// the engine tying together the store backend and stats channel.
pub struct AppState<B: CounterBackend + 'static> {
    /// The loader's active-policy pointer (spec.md §4.6); snapshotted once
    /// per request.
    pub policy: Arc<RwLock<Arc<Policy>>>,
    /// The decision engine.
    pub engine: Engine<B>,
    /// Direct backend handle, for `monitor/alive`'s liveness probe.
    pub backend: Arc<B>,
}

impl<B: CounterBackend + 'static> AppState<B> {
    fn snapshot(&self) -> Arc<Policy> {
        self.policy.read().unwrap().clone()
    }
}

/// A malformed-request or internal error, rendered per spec.md §7.4 as
/// `{err_no, err_msg}` with the matching HTTP status.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Client sent something the dispatcher couldn't parse: 400.
    #[error("{0}")]
    BadRequest(String),
    /// Store or serialization failure: 500.
    #[error("{0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrBody {
    err_no: i32,
    err_msg: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, err_no) = match &self {
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, 400),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, 500),
        };
        let err_msg = self.to_string();
        (status, Json(ErrBody { err_no, err_msg })).into_response()
    }
}

const WRITE_THROUGH_FLAG: &str = "_writeThrough";

fn write_through(attrs: &Attributes) -> bool {
    attrs
        .get(WRITE_THROUGH_FLAG)
        .is_some_and(|v| v == "yes")
}

/// `rule/browse`: first-hit verdict.
pub async fn browse<B: CounterBackend + 'static>(
    State(state): State<Arc<AppState<B>>>,
    Extension(attrs): Extension<Attributes>,
) -> Json<ResultEntry> {
    let policy = state.snapshot();
    let write_through = write_through(&attrs);
    let verdict = state.engine.browse(&policy, &attrs, write_through).await;
    Json(verdict)
}

/// `rule/browse_complete`: every denying rule's verdict.
pub async fn browse_complete<B: CounterBackend + 'static>(
    State(state): State<Arc<AppState<B>>>,
    Extension(attrs): Extension<Attributes>,
) -> Json<Vec<ResultEntry>> {
    let policy = state.snapshot();
    let verdicts = state.engine.browse_complete(&policy, &attrs).await;
    Json(verdicts)
}

#[derive(Serialize)]
struct ErrNoOnly {
    err_no: i32,
}

/// `rule/update`: fire-and-forget counter update.
pub async fn update<B: CounterBackend + 'static>(
    State(state): State<Arc<AppState<B>>>,
    Extension(attrs): Extension<Attributes>,
) -> Json<ErrNoOnly> {
    let policy = state.snapshot();
    state.engine.update(&policy, &attrs).await;
    Json(ErrNoOnly { err_no: 0 })
}

#[derive(Deserialize)]
struct ArgsJsonEntry {
    #[serde(rename = "ID")]
    id: String,
    #[serde(rename = "Arg")]
    arg: String,
}

#[derive(Serialize)]
struct JobOutput {
    #[serde(rename = "ID")]
    id: String,
    #[serde(rename = "Result")]
    result: ResultEntry,
}

/// `multi/browse`: `argsJson` is a JSON list of `{ID, Arg}`, `Arg` being a
/// URL-form-encoded attribute blob (spec.md §4.8, §4.9).
pub async fn multi_browse<B: CounterBackend + 'static>(
    State(state): State<Arc<AppState<B>>>,
    Extension(attrs): Extension<Attributes>,
) -> Result<Json<Vec<JobOutput>>, ApiError> {
    let raw = attrs
        .get("argsJson")
        .ok_or_else(|| ApiError::BadRequest("missing argsJson".to_string()))?;
    let entries: Vec<ArgsJsonEntry> = serde_json::from_str(raw)
        .map_err(|e| ApiError::BadRequest(format!("malformed argsJson: {e}")))?;

    let jobs: Vec<Job> = entries
        .into_iter()
        .map(|entry| {
            let attrs: Attributes = url::form_urlencoded::parse(entry.arg.as_bytes())
                .into_owned()
                .collect();
            Job { id: entry.id, attrs }
        })
        .collect();

    let policy = state.snapshot();
    let results = state.engine.multi_browse(&policy, &jobs).await;
    Ok(Json(
        results
            .into_iter()
            .map(|r| JobOutput {
                id: r.id,
                result: r.result,
            })
            .collect(),
    ))
}

/// `monitor/alive`: pings the counter store.
pub async fn monitor_alive<B: CounterBackend + 'static>(
    State(state): State<Arc<AppState<B>>>,
) -> Result<Json<ErrNoOnly>, ApiError> {
    state
        .backend
        .ping()
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(Json(ErrNoOnly { err_no: 0 }))
}

/// Unmatched path: 404, per spec.md §4.8.
pub async fn not_found() -> StatusCode {
    StatusCode::NOT_FOUND
}
