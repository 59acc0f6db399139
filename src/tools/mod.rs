//! Retrieval-tool collaborators
//!
//! Every tool is an external collaborator reached through the same narrow
//! contract: `call(params) -> ToolResponse`. The envelope is the only
//! shape the orchestration core relies on; a tool's upstream response
//! format never leaks past its own module.
//!
//! Tools never return `Err`. Anything that goes wrong is classified into
//! the envelope's three failure kinds: `validation-error` for caller-side
//! parameter problems (including searches that matched nothing),
//! `tool-error` for upstream failures (transport, 5xx, rate limits), and
//! `timeout` for enforced deadlines. Rate limits are rejected fast, not
//! queued.

pub mod analysis;
pub mod entity;
pub mod filings;
pub mod fulltext;
pub mod sections;
pub mod xbrl;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::llm::CompletionClient;
use crate::orchestrator::context::FailureKind;
use crate::orchestrator::intent::Intent;
use crate::orchestrator::router::ToolRouter;

/// Failure classification inside the tool envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ToolErrorKind {
    /// Caller-side malformed or unmatched parameters
    ValidationError,
    /// The tool or its upstream failed
    ToolError,
    /// The invocation deadline elapsed
    Timeout,
}

impl From<ToolErrorKind> for FailureKind {
    fn from(kind: ToolErrorKind) -> Self {
        match kind {
            ToolErrorKind::ValidationError => FailureKind::ValidationError,
            ToolErrorKind::ToolError => FailureKind::ToolError,
            ToolErrorKind::Timeout => FailureKind::Timeout,
        }
    }
}

/// Uniform result envelope returned by every tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResponse {
    /// Whether the call succeeded
    pub succeeded: bool,
    /// Tool-specific structured payload; may be absent on success when
    /// the requested data simply is not there
    #[serde(default)]
    pub payload: Option<Value>,
    /// Failure classification; `None` on success
    #[serde(default)]
    pub error_kind: Option<ToolErrorKind>,
    /// Human-readable failure detail; `None` on success
    #[serde(default)]
    pub error_message: Option<String>,
}

impl ToolResponse {
    /// A successful response with data
    pub fn ok(payload: Value) -> Self {
        Self {
            succeeded: true,
            payload: Some(payload),
            error_kind: None,
            error_message: None,
        }
    }

    /// A successful response with no data (the thing asked for is absent)
    pub fn empty() -> Self {
        Self {
            succeeded: true,
            payload: None,
            error_kind: None,
            error_message: None,
        }
    }

    /// A failed response with the given classification
    pub fn failed(kind: ToolErrorKind, message: impl Into<String>) -> Self {
        Self {
            succeeded: false,
            payload: None,
            error_kind: Some(kind),
            error_message: Some(message.into()),
        }
    }

    /// Caller-side parameter failure
    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::failed(ToolErrorKind::ValidationError, message)
    }

    /// Upstream tool failure
    pub fn tool_error(message: impl Into<String>) -> Self {
        Self::failed(ToolErrorKind::ToolError, message)
    }
}

/// One callable external collaborator
///
/// Parameters arrive as JSON with every step-output reference already
/// resolved to a concrete value; each tool deserializes its own typed
/// parameter record and reports a `validation-error` on mismatch.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Stable tool name, used in logs
    fn name(&self) -> &'static str;

    /// Execute one call
    async fn call(&self, params: Value) -> ToolResponse;
}

/// Map an upstream HTTP status to an envelope failure kind
///
/// 429 counts as a tool failure (rate limits are upstream state, not a
/// parameter problem); other 4xx statuses mean the request itself was
/// unserviceable.
pub(crate) fn classify_status(status: u16) -> ToolErrorKind {
    match status {
        429 => ToolErrorKind::ToolError,
        400..=499 => ToolErrorKind::ValidationError,
        _ => ToolErrorKind::ToolError,
    }
}

/// Deserialize a tool's typed parameters or produce a validation failure
pub(crate) fn parse_params<T: serde::de::DeserializeOwned>(
    tool: &str,
    params: Value,
) -> Result<T, ToolResponse> {
    serde_json::from_value(params).map_err(|e| {
        ToolResponse::validation_error(format!("{tool}: malformed parameters: {e}"))
    })
}

/// Build the production tool registry
///
/// All intents in the closed set are bound here, each to a collaborator
/// sharing the given HTTP client. The mapping is injected into the router
/// at construction time; nothing here is process-global.
pub fn build_registry(
    http: reqwest::Client,
    sec_api_key: &str,
    completion: Arc<dyn CompletionClient>,
) -> ToolRouter {
    let mut router = ToolRouter::new();
    router.register(
        Intent::ResolveEntity,
        Arc::new(entity::CompanyResolutionTool::new(http.clone(), sec_api_key)),
    );
    router.register(
        Intent::LocateDocument,
        Arc::new(filings::FilingSearchTool::new(http.clone(), sec_api_key)),
    );
    router.register(
        Intent::ExtractSection,
        Arc::new(sections::SectionExtractTool::new(http.clone(), sec_api_key)),
    );
    router.register(
        Intent::ConvertStructuredData,
        Arc::new(xbrl::XbrlConvertTool::new(http.clone(), sec_api_key)),
    );
    router.register(
        Intent::SearchText,
        Arc::new(fulltext::FullTextSearchTool::new(http, sec_api_key)),
    );
    router.register(
        Intent::Compare,
        Arc::new(analysis::CompareTool::new(completion.clone())),
    );
    router.register(
        Intent::Synthesize,
        Arc::new(analysis::SynthesizeTool::new(completion)),
    );
    debug_assert_eq!(router.len(), Intent::ALL.len());
    router
}
