//! Structured financial data tool
//!
//! Converts a filing's XBRL data to JSON through the conversion endpoint
//! and optionally narrows the result to one metric using the known
//! US-GAAP tag candidates. A conversion that succeeds but contains none
//! of the metric's tags is a succeeded-but-empty response: the filing
//! simply does not report the metric under any known tag.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::knowledge;
use crate::orchestrator::intent::ConvertStructuredDataParams;
use crate::tools::{classify_status, parse_params, Tool, ToolResponse};

const XBRL_API_BASE_URL: &str = "https://api.sec-api.io";

/// XBRL-to-JSON conversion against the conversion endpoint
pub struct XbrlConvertTool {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl XbrlConvertTool {
    /// Create a tool against the production endpoint
    pub fn new(client: reqwest::Client, api_key: impl Into<String>) -> Self {
        Self::with_base_url(client, api_key, XBRL_API_BASE_URL)
    }

    /// Create a tool against a custom base URL (for testing)
    pub fn with_base_url(
        client: reqwest::Client,
        api_key: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl Tool for XbrlConvertTool {
    fn name(&self) -> &'static str {
        "xbrl-convert"
    }

    async fn call(&self, params: Value) -> ToolResponse {
        let params: ConvertStructuredDataParams = match parse_params(self.name(), params) {
            Ok(params) => params,
            Err(response) => return response,
        };
        let document_url = match params.document.as_literal() {
            Some(url) if !url.trim().is_empty() => url.trim().to_string(),
            _ => return ToolResponse::validation_error("document URL is missing or unresolved"),
        };
        if self.api_key.is_empty() {
            return ToolResponse::tool_error("XBRL API key is not configured");
        }

        let url = format!("{}/xbrl-to-json", self.base_url);

        tracing::debug!(document = %document_url, metric = ?params.metric, "Converting XBRL data");

        let response = match self
            .client
            .get(&url)
            .query(&[
                ("htm-url", document_url.as_str()),
                ("token", self.api_key.as_str()),
            ])
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return ToolResponse::tool_error(format!("XBRL request failed: {e}")),
        };

        let status = response.status().as_u16();
        if !(200..300).contains(&status) {
            let body = response.text().await.unwrap_or_default();
            return ToolResponse::failed(
                classify_status(status),
                format!("XBRL endpoint returned HTTP {status}: {body}"),
            );
        }

        let body: Value = match response.json().await {
            Ok(body) => body,
            Err(e) => return ToolResponse::tool_error(format!("XBRL response unreadable: {e}")),
        };

        match &params.metric {
            None => ToolResponse::ok(body),
            Some(metric) => match narrow_to_metric(&body, metric) {
                Some((tag, facts)) => ToolResponse::ok(json!({
                    "metric": metric,
                    "tag": tag,
                    "facts": facts,
                })),
                None => {
                    tracing::debug!(metric = %metric, "No known tag present in XBRL data");
                    ToolResponse::empty()
                }
            },
        }
    }
}

/// Find the first known tag for the metric anywhere in the statement tree
///
/// The converted document groups facts by statement
/// (`StatementsOfIncome`, `BalanceSheets`, ...); each group maps tag
/// names to fact arrays. Tags are tried in the table's order, most
/// specific first.
fn narrow_to_metric<'a>(body: &'a Value, metric: &str) -> Option<(&'static str, &'a Value)> {
    let candidates = knowledge::XBRL_METRICS.get(metric.to_lowercase().as_str())?;
    let statements = body.as_object()?;

    for tag in candidates.iter() {
        for group in statements.values() {
            if let Some(facts) = group.get(*tag) {
                return Some((*tag, facts));
            }
        }
    }
    None
}
