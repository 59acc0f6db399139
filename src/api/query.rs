//! Query API handlers
//!
//! `POST /api/query` runs a question to completion and returns the final
//! answer (or abort reason) with the full step trace. `POST
//! /api/query/stream` runs the same pipeline but streams per-step
//! progress as SSE, terminated by `[DONE]`. `GET`/`POST /api/config`
//! expose the runtime-adjustable execution settings.

use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    response::Response,
    Json,
};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};

use crate::config::ExecutionConfig;
use crate::error::AppError;
use crate::orchestrator::coordinator::{CancelFlag, QueryOutcome};
use crate::state::AppState;

/// Upper bound on a whole query, over and above the per-step deadlines
const QUERY_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(300);

/// Query request body
#[derive(Deserialize, Debug)]
pub struct QueryRequest {
    /// The natural-language question
    pub query: String,
}

/// Validate the query string against the current limits
fn validate_query(query: &str, max_len: usize) -> Result<(), AppError> {
    if query.trim().is_empty() {
        return Err(AppError::InvalidQuery("query is empty".to_string()));
    }
    if query.len() > max_len {
        return Err(AppError::InvalidQuery(format!(
            "query too long ({} > {} characters)",
            query.len(),
            max_len
        )));
    }
    Ok(())
}

/// POST /api/query - run a query to completion
///
/// Returns the terminal outcome: a synthesized answer on `done`, or the
/// abort reason on `aborted`. The trace is present either way, so the
/// caller can see exactly how far execution progressed and why it
/// stopped.
pub async fn run_query(
    State(state): State<Arc<RwLock<AppState>>>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<QueryOutcome>, AppError> {
    let (coordinator, max_len) = {
        let state_read = state.read().await;
        (
            state_read.coordinator(),
            state_read.execution().max_query_length,
        )
    };
    validate_query(&request.query, max_len)?;

    tracing::info!(query_len = request.query.len(), "Running query");

    let outcome = tokio::time::timeout(QUERY_TIMEOUT, coordinator.run(&request.query))
        .await
        .map_err(|_| {
            AppError::Timeout(format!(
                "query did not finish within {} seconds",
                QUERY_TIMEOUT.as_secs()
            ))
        })??;

    tracing::info!(
        status = ?outcome.status,
        abort_reason = ?outcome.abort_reason,
        trace_len = outcome.trace.len(),
        replans = outcome.replans.len(),
        "Query finished"
    );

    Ok(Json(outcome))
}

/// POST /api/query/stream - run a query with SSE progress events
///
/// Each progress event is one `data:` line of JSON; the final event is
/// the full outcome, followed by `[DONE]`.
pub async fn run_query_stream(
    State(state): State<Arc<RwLock<AppState>>>,
    Json(request): Json<QueryRequest>,
) -> Result<Response, AppError> {
    use async_stream::stream;

    let (coordinator, max_len) = {
        let state_read = state.read().await;
        (
            state_read.coordinator(),
            state_read.execution().max_query_length,
        )
    };
    validate_query(&request.query, max_len)?;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let query = request.query;

    let run = tokio::spawn(async move {
        coordinator
            .run_with(&query, CancelFlag::new(), Some(tx))
            .await
    });

    let stream = stream! {
        // Progress events arrive while the query runs; the channel closes
        // when the coordinator drops its sender.
        while let Some(event) = rx.recv().await {
            match serde_json::to_string(&event) {
                Ok(json) => yield Ok::<String, axum::Error>(json),
                Err(e) => {
                    tracing::error!(error = %e, "Failed to serialize progress event");
                }
            }
        }

        match run.await {
            Ok(Ok(outcome)) => {
                if let Ok(json) = serde_json::to_string(&outcome) {
                    yield Ok::<String, axum::Error>(json);
                }
            }
            Ok(Err(e)) => {
                yield Ok::<String, axum::Error>(format!(
                    r#"{{"event": "error", "message": "{}"}}"#,
                    e
                ));
            }
            Err(e) => {
                yield Ok::<String, axum::Error>(format!(
                    r#"{{"event": "error", "message": "query task panicked: {}"}}"#,
                    e
                ));
            }
        }

        yield Ok::<String, axum::Error>("[DONE]".to_string());
    };

    let sse_stream = stream.map(|event_result| {
        let sse_text = match event_result {
            Ok(data) => format!("data: {}\n\n", data),
            Err(e) => format!("data: [ERROR] {}\n\n", e),
        };
        Ok::<_, std::io::Error>(sse_text)
    });

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .header(header::CONNECTION, "keep-alive")
        .body(Body::from_stream(sse_stream))
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to build response: {}", e)))
}

/// Current execution configuration, as returned by GET /api/config
#[derive(Serialize, Debug)]
pub struct ConfigResponse {
    /// Per-step invocation deadline in seconds
    pub step_timeout_secs: u64,
    /// Maximum replans before a query aborts
    pub replan_ceiling: u32,
    /// Maximum query length in characters
    pub max_query_length: usize,
}

/// Request body for updating the execution configuration
#[derive(Deserialize, Debug)]
pub struct ConfigUpdateRequest {
    /// Per-step invocation deadline in seconds (optional)
    pub step_timeout_secs: Option<u64>,
    /// Maximum replans before a query aborts (optional)
    pub replan_ceiling: Option<u32>,
    /// Maximum query length in characters (optional)
    pub max_query_length: Option<usize>,
}

/// GET /api/config - current execution settings
pub async fn get_config(State(state): State<Arc<RwLock<AppState>>>) -> Json<ConfigResponse> {
    let state_read = state.read().await;
    let execution = state_read.execution();
    Json(ConfigResponse {
        step_timeout_secs: execution.step_timeout_secs,
        replan_ceiling: execution.replan_ceiling,
        max_query_length: execution.max_query_length,
    })
}

/// POST /api/config - update execution settings
///
/// Only provided fields change; every change is validated before any of
/// it is applied.
pub async fn update_config(
    State(state): State<Arc<RwLock<AppState>>>,
    Json(request): Json<ConfigUpdateRequest>,
) -> Result<Json<ConfigResponse>, AppError> {
    let mut state_write = state.write().await;
    let updated = validate_and_apply(state_write.execution().clone(), request)?;
    state_write.set_execution(updated.clone());

    tracing::info!(
        step_timeout_secs = updated.step_timeout_secs,
        replan_ceiling = updated.replan_ceiling,
        "Execution configuration updated"
    );

    Ok(Json(ConfigResponse {
        step_timeout_secs: updated.step_timeout_secs,
        replan_ceiling: updated.replan_ceiling,
        max_query_length: updated.max_query_length,
    }))
}

/// Validate an update request and apply it to a config copy
fn validate_and_apply(
    mut config: ExecutionConfig,
    request: ConfigUpdateRequest,
) -> Result<ExecutionConfig, AppError> {
    if let Some(timeout) = request.step_timeout_secs {
        if timeout == 0 {
            return Err(AppError::InvalidConfig(
                "step_timeout_secs must be > 0".to_string(),
            ));
        }
        config.step_timeout_secs = timeout;
    }

    if let Some(max_len) = request.max_query_length {
        if max_len == 0 {
            return Err(AppError::InvalidConfig(
                "max_query_length must be > 0".to_string(),
            ));
        }
        config.max_query_length = max_len;
    }

    // A ceiling of zero is legal: it means "never replan".
    if let Some(ceiling) = request.replan_ceiling {
        config.replan_ceiling = ceiling;
    }

    Ok(config)
}
