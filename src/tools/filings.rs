//! Filing search tool
//!
//! Finds one filing for a resolved company through the filing query
//! endpoint. The query string uses the service's Lucene-style syntax:
//! `cik:320193 AND formType:"10-K" AND filedAt:[2023-01-01 TO 2023-12-31]`,
//! sorted most-recent-first. Zero hits is a `validation-error`: the
//! parameters matched nothing, which is not the same as the service being
//! down.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::orchestrator::intent::LocateDocumentParams;
use crate::tools::{classify_status, parse_params, Tool, ToolResponse};

const QUERY_API_BASE_URL: &str = "https://api.sec-api.io";

/// Filing search against the query endpoint
pub struct FilingSearchTool {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl FilingSearchTool {
    /// Create a tool against the production endpoint
    pub fn new(client: reqwest::Client, api_key: impl Into<String>) -> Self {
        Self::with_base_url(client, api_key, QUERY_API_BASE_URL)
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
impl Tool for FilingSearchTool {
    fn name(&self) -> &'static str {
        "filing-search"
    }

    async fn call(&self, params: Value) -> ToolResponse {
        let params: LocateDocumentParams = match parse_params(self.name(), params) {
            Ok(params) => params,
            Err(response) => return response,
        };
        let cik = match params.entity.as_literal() {
            Some(cik) if !cik.trim().is_empty() => cik.trim().to_string(),
            _ => return ToolResponse::validation_error("entity CIK is missing or unresolved"),
        };
        if self.api_key.is_empty() {
            return ToolResponse::tool_error("filing query API key is not configured");
        }

        let mut search = format!("cik:{} AND formType:\"{}\"", cik, params.form_type);
        if let Some(range) = &params.date_range {
            search.push_str(&format!(" AND filedAt:[{} TO {}]", range.from, range.to));
        }

        let request_body = json!({
            "query": search,
            "from": "0",
            "size": "1",
            "sort": [{"filedAt": {"order": "desc"}}],
        });

        tracing::debug!(query = %search, "Searching filings");

        let response = match self
            .client
            .post(&self.base_url)
            .header("Authorization", &self.api_key)
            .json(&request_body)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return ToolResponse::tool_error(format!("filing query failed: {e}")),
        };

        let status = response.status().as_u16();
        if !(200..300).contains(&status) {
            let body = response.text().await.unwrap_or_default();
            return ToolResponse::failed(
                classify_status(status),
                format!("filing query returned HTTP {status}: {body}"),
            );
        }

        let body: Value = match response.json().await {
            Ok(body) => body,
            Err(e) => return ToolResponse::tool_error(format!("filing response unreadable: {e}")),
        };

        let filing = match body
            .get("filings")
            .and_then(Value::as_array)
            .and_then(|filings| filings.first())
        {
            Some(filing) => filing,
            None => {
                return ToolResponse::validation_error(format!(
                    "no {} filings found for cik {}",
                    params.form_type, cik
                ))
            }
        };

        ToolResponse::ok(json!({
            "accession_no": filing.get("accessionNo"),
            "form_type": filing.get("formType"),
            "filed_at": filing.get("filedAt"),
            "company": filing.get("companyName"),
            "description": filing.get("description"),
            "url": filing.get("linkToFilingDetails"),
        }))
    }
}
