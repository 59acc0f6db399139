//! Company resolution tool
//!
//! Resolves a ticker, CIK, or company name to a company identity through
//! the mapping endpoint. The first match wins; a resolution that matches
//! nothing is a `validation-error` so the decision procedure can choose a
//! broader search or abort.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::orchestrator::intent::ResolveEntityParams;
use crate::tools::{classify_status, parse_params, Tool, ToolResponse};

const MAPPING_API_BASE_URL: &str = "https://api.sec-api.io";

/// Entity resolution against the mapping endpoint
pub struct CompanyResolutionTool {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl CompanyResolutionTool {
    /// Create a tool against the production endpoint
    pub fn new(client: reqwest::Client, api_key: impl Into<String>) -> Self {
        Self::with_base_url(client, api_key, MAPPING_API_BASE_URL)
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
impl Tool for CompanyResolutionTool {
    fn name(&self) -> &'static str {
        "company-resolution"
    }

    async fn call(&self, params: Value) -> ToolResponse {
        let params: ResolveEntityParams = match parse_params(self.name(), params) {
            Ok(params) => params,
            Err(response) => return response,
        };
        if params.identifier.trim().is_empty() {
            return ToolResponse::validation_error("identifier is empty");
        }
        if self.api_key.is_empty() {
            return ToolResponse::tool_error("mapping API key is not configured");
        }

        let url = format!(
            "{}/mapping/{}/{}",
            self.base_url,
            params.kind.as_str(),
            params.identifier
        );

        tracing::debug!(url = %url, identifier = %params.identifier, "Resolving company");

        let response = match self
            .client
            .get(&url)
            .query(&[("token", self.api_key.as_str())])
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return ToolResponse::tool_error(format!("mapping request failed: {e}")),
        };

        let status = response.status().as_u16();
        if !(200..300).contains(&status) {
            let body = response.text().await.unwrap_or_default();
            return ToolResponse::failed(
                classify_status(status),
                format!("mapping endpoint returned HTTP {status}: {body}"),
            );
        }

        let body: Value = match response.json().await {
            Ok(body) => body,
            Err(e) => return ToolResponse::tool_error(format!("mapping response unreadable: {e}")),
        };

        let matches = body.as_array().cloned().unwrap_or_else(|| vec![body]);
        let first = match matches.iter().find(|m| m.is_object()) {
            Some(first) => first,
            None => {
                return ToolResponse::validation_error(format!(
                    "no company matched {} '{}'",
                    params.kind.as_str(),
                    params.identifier
                ))
            }
        };

        let field = |name: &str| -> Option<String> {
            first.get(name).and_then(|v| match v {
                Value::String(s) if !s.is_empty() => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
        };

        let (name, cik) = match (field("name"), field("cik")) {
            (Some(name), Some(cik)) => (name, cik),
            _ => {
                return ToolResponse::validation_error(format!(
                    "no company matched {} '{}'",
                    params.kind.as_str(),
                    params.identifier
                ))
            }
        };

        ToolResponse::ok(json!({
            "name": name,
            "cik": cik,
            "ticker": field("ticker"),
            "exchange": field("exchange"),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Server;

    fn tool_for(server: &Server) -> CompanyResolutionTool {
        CompanyResolutionTool::with_base_url(reqwest::Client::new(), "test-key", server.url())
    }

    fn params(identifier: &str, kind: &str) -> Value {
        json!({"identifier": identifier, "kind": kind})
    }

    #[tokio::test]
    async fn test_resolve_by_ticker() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/mapping/ticker/AAPL")
            .match_query(mockito::Matcher::UrlEncoded("token".into(), "test-key".into()))
            .with_status(200)
            .with_body(
                r#"[{"name": "Apple Inc.", "ticker": "AAPL", "cik": "320193", "exchange": "NASDAQ"}]"#,
            )
            .create_async()
            .await;

        let response = tool_for(&server).call(params("AAPL", "ticker")).await;

        mock.assert_async().await;
        assert!(response.succeeded);
        let payload = response.payload.unwrap();
        assert_eq!(payload["name"], "Apple Inc.");
        assert_eq!(payload["cik"], "320193");
    }

    #[tokio::test]
    async fn test_resolve_numeric_cik_field() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/mapping/ticker/TSLA")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_body(r#"[{"name": "Tesla, Inc.", "ticker": "TSLA", "cik": 1318605}]"#)
            .create_async()
            .await;

        let response = tool_for(&server).call(params("TSLA", "ticker")).await;

        assert!(response.succeeded);
        assert_eq!(response.payload.unwrap()["cik"], "1318605");
    }

    #[tokio::test]
    async fn test_no_match_is_validation_error() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/mapping/ticker/ZZZZZ")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;

        let response = tool_for(&server).call(params("ZZZZZ", "ticker")).await;

        assert!(!response.succeeded);
        assert_eq!(
            response.error_kind,
            Some(crate::tools::ToolErrorKind::ValidationError)
        );
        assert!(response.error_message.unwrap().contains("ZZZZZ"));
    }

    #[tokio::test]
    async fn test_server_error_is_tool_error() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/mapping/name/Apple")
            .match_query(mockito::Matcher::Any)
            .with_status(503)
            .with_body("maintenance")
            .create_async()
            .await;

        let response = tool_for(&server).call(params("Apple", "name")).await;

        assert!(!response.succeeded);
        assert_eq!(
            response.error_kind,
            Some(crate::tools::ToolErrorKind::ToolError)
        );
    }

    #[tokio::test]
    async fn test_malformed_params_is_validation_error() {
        let server = Server::new_async().await;
        let response = tool_for(&server).call(json!({"wrong": true})).await;

        assert!(!response.succeeded);
        assert_eq!(
            response.error_kind,
            Some(crate::tools::ToolErrorKind::ValidationError)
        );
    }

    #[tokio::test]
    async fn test_missing_api_key_is_tool_error() {
        let server = Server::new_async().await;
        let tool =
            CompanyResolutionTool::with_base_url(reqwest::Client::new(), "", server.url());
        let response = tool.call(params("AAPL", "ticker")).await;

        assert!(!response.succeeded);
        assert_eq!(
            response.error_kind,
            Some(crate::tools::ToolErrorKind::ToolError)
        );
    }
}
