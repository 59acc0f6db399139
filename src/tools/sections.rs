//! Section extraction tool
//!
//! Pulls one section's text out of a filing through the extractor
//! endpoint. A filing that simply does not contain the requested section
//! comes back as a *succeeded* response with no payload: the data is
//! absent, the tool is fine. That is the case the decision procedure's
//! alternate-path rule keys on.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::orchestrator::intent::ExtractSectionParams;
use crate::tools::{classify_status, parse_params, Tool, ToolResponse};

const EXTRACTOR_API_BASE_URL: &str = "https://api.sec-api.io";

/// Some filings yield a placeholder body instead of an empty one
const ABSENT_MARKERS: &[&str] = &["undefined", "null", "processing"];

/// Section extraction against the extractor endpoint
pub struct SectionExtractTool {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl SectionExtractTool {
    /// Create a tool against the production endpoint
    pub fn new(client: reqwest::Client, api_key: impl Into<String>) -> Self {
        Self::with_base_url(client, api_key, EXTRACTOR_API_BASE_URL)
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
impl Tool for SectionExtractTool {
    fn name(&self) -> &'static str {
        "section-extract"
    }

    async fn call(&self, params: Value) -> ToolResponse {
        let params: ExtractSectionParams = match parse_params(self.name(), params) {
            Ok(params) => params,
            Err(response) => return response,
        };
        let document_url = match params.document.as_literal() {
            Some(url) if !url.trim().is_empty() => url.trim().to_string(),
            _ => return ToolResponse::validation_error("document URL is missing or unresolved"),
        };
        if params.section.trim().is_empty() {
            return ToolResponse::validation_error("section id is empty");
        }
        if self.api_key.is_empty() {
            return ToolResponse::tool_error("extractor API key is not configured");
        }

        let url = format!("{}/extractor", self.base_url);

        tracing::debug!(
            document = %document_url,
            section = %params.section,
            "Extracting section"
        );

        let response = match self
            .client
            .get(&url)
            .query(&[
                ("url", document_url.as_str()),
                ("item", params.section.as_str()),
                ("type", "text"),
                ("token", self.api_key.as_str()),
            ])
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return ToolResponse::tool_error(format!("extractor request failed: {e}")),
        };

        let status = response.status().as_u16();
        if !(200..300).contains(&status) {
            let body = response.text().await.unwrap_or_default();
            return ToolResponse::failed(
                classify_status(status),
                format!("extractor returned HTTP {status}: {body}"),
            );
        }

        let text = match response.text().await {
            Ok(text) => text,
            Err(e) => return ToolResponse::tool_error(format!("extractor body unreadable: {e}")),
        };

        let trimmed = text.trim();
        if trimmed.is_empty() || ABSENT_MARKERS.contains(&trimmed.to_lowercase().as_str()) {
            tracing::debug!(section = %params.section, "Section absent from filing");
            return ToolResponse::empty();
        }

        ToolResponse::ok(json!({
            "section": params.section,
            "text": trimmed,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    fn tool_for(server: &Server) -> SectionExtractTool {
        SectionExtractTool::with_base_url(reqwest::Client::new(), "test-key", server.url())
    }

    fn params(section: &str) -> Value {
        json!({
            "document": "https://www.sec.gov/Archives/aapl-20230930.htm",
            "section": section
        })
    }

    #[tokio::test]
    async fn test_extract_section_text() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/extractor")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("item".into(), "1A".into()),
                Matcher::UrlEncoded("type".into(), "text".into()),
                Matcher::UrlEncoded("token".into(), "test-key".into()),
            ]))
            .with_status(200)
            .with_body("The Company's business, reputation, results of operations...")
            .create_async()
            .await;

        let response = tool_for(&server).call(params("1A")).await;

        mock.assert_async().await;
        assert!(response.succeeded);
        let payload = response.payload.unwrap();
        assert_eq!(payload["section"], "1A");
        assert!(payload["text"].as_str().unwrap().starts_with("The Company's"));
    }

    #[tokio::test]
    async fn test_absent_section_is_empty_success() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/extractor")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("undefined")
            .create_async()
            .await;

        let response = tool_for(&server).call(params("1C")).await;

        // Succeeded, but there is nothing there: not a tool failure
        assert!(response.succeeded);
        assert!(response.payload.is_none());
        assert!(response.error_kind.is_none());
    }

    #[tokio::test]
    async fn test_blank_body_is_empty_success() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/extractor")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("   \n  ")
            .create_async()
            .await;

        let response = tool_for(&server).call(params("9B")).await;

        assert!(response.succeeded);
        assert!(response.payload.is_none());
    }

    #[tokio::test]
    async fn test_http_error_classification() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/extractor")
            .match_query(Matcher::Any)
            .with_status(404)
            .with_body("not found")
            .create_async()
            .await;

        let response = tool_for(&server).call(params("1A")).await;

        assert!(!response.succeeded);
        assert_eq!(
            response.error_kind,
            Some(crate::tools::ToolErrorKind::ValidationError)
        );
    }

    #[tokio::test]
    async fn test_unresolved_document_is_validation_error() {
        let server = Server::new_async().await;
        let response = tool_for(&server)
            .call(json!({"document": {"step": 2}, "section": "1A"}))
            .await;

        assert!(!response.succeeded);
        assert_eq!(
            response.error_kind,
            Some(crate::tools::ToolErrorKind::ValidationError)
        );
    }
}
