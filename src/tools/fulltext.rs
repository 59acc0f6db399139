//! Full-text search tool
//!
//! Searches filing text through the full-text search endpoint. Used both
//! as a first-class intent and as the fallback path when a targeted
//! section extraction finds nothing. Zero hits is a `validation-error`,
//! consistent with the filing search.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::orchestrator::intent::SearchTextParams;
use crate::tools::{classify_status, parse_params, Tool, ToolResponse};

const FULL_TEXT_API_BASE_URL: &str = "https://api.sec-api.io";

/// Hits returned to the planner are capped so context stays bounded
const MAX_HITS: usize = 10;

/// Full-text search against the search endpoint
pub struct FullTextSearchTool {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl FullTextSearchTool {
    /// Create a tool against the production endpoint
    pub fn new(client: reqwest::Client, api_key: impl Into<String>) -> Self {
        Self::with_base_url(client, api_key, FULL_TEXT_API_BASE_URL)
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
impl Tool for FullTextSearchTool {
    fn name(&self) -> &'static str {
        "full-text-search"
    }

    async fn call(&self, params: Value) -> ToolResponse {
        let params: SearchTextParams = match parse_params(self.name(), params) {
            Ok(params) => params,
            Err(response) => return response,
        };
        if params.phrase.trim().is_empty() {
            return ToolResponse::validation_error("search phrase is empty");
        }
        if self.api_key.is_empty() {
            return ToolResponse::tool_error("full-text search API key is not configured");
        }

        let mut request_body = json!({
            "query": format!("\"{}\"", params.phrase.trim()),
        });
        if !params.form_types.is_empty() {
            request_body["formTypes"] = json!(params.form_types);
        }
        if let Some(range) = &params.date_range {
            request_body["startDate"] = json!(range.from);
            request_body["endDate"] = json!(range.to);
        }

        let url = format!("{}/full-text-search", self.base_url);

        tracing::debug!(phrase = %params.phrase, "Full-text search");

        let response = match self
            .client
            .post(&url)
            .header("Authorization", &self.api_key)
            .json(&request_body)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return ToolResponse::tool_error(format!("full-text search failed: {e}")),
        };

        let status = response.status().as_u16();
        if !(200..300).contains(&status) {
            let body = response.text().await.unwrap_or_default();
            return ToolResponse::failed(
                classify_status(status),
                format!("full-text search returned HTTP {status}: {body}"),
            );
        }

        let body: Value = match response.json().await {
            Ok(body) => body,
            Err(e) => {
                return ToolResponse::tool_error(format!("full-text response unreadable: {e}"))
            }
        };

        let filings = body
            .get("filings")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        if filings.is_empty() {
            return ToolResponse::validation_error(format!(
                "no filings mention \"{}\"",
                params.phrase.trim()
            ));
        }

        let hits: Vec<Value> = filings
            .iter()
            .take(MAX_HITS)
            .map(|filing| {
                json!({
                    "accession_no": filing.get("accessionNo"),
                    "company": filing.get("companyNameLong").or_else(|| filing.get("companyName")),
                    "form_type": filing.get("formType"),
                    "filed_at": filing.get("filedAt"),
                    "url": filing.get("filingUrl"),
                })
            })
            .collect();

        ToolResponse::ok(json!({
            "total": filings.len(),
            "hits": hits,
        }))
    }
}
