//! Completion-backed analysis tools
//!
//! `compare` and `synthesize` route through the same tool contract as the
//! retrieval intents but delegate to the completion service instead of a
//! data endpoint. Both work strictly from the concrete inputs the
//! coordinator resolved for them; the synthesis prompt forbids inventing
//! figures that are not in the gathered context.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::llm::{CompletionClient, CompletionError};
use crate::orchestrator::intent::{CompareParams, SynthesizeParams, ValueSource};
use crate::tools::{parse_params, Tool, ToolResponse};

/// Per-source character cap so analysis prompts stay bounded
const MAX_SOURCE_CHARS: usize = 12_000;

const COMPARE_SYSTEM_PROMPT: &str = "You are a financial filing analyst. Compare the two \
    excerpts below with respect to the stated question. Ground every statement in the \
    excerpts; if they do not answer the question, say so plainly.";

const SYNTHESIZE_SYSTEM_PROMPT: &str = "You are a financial filing analyst. Answer the \
    user's question using ONLY the numbered context excerpts. Cite the excerpt numbers you \
    rely on. If the context does not contain the answer, say exactly that instead of \
    guessing. Never invent figures.";

fn truncated(text: &str) -> &str {
    match text.char_indices().nth(MAX_SOURCE_CHARS) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

fn completion_failure(tool: &str, error: CompletionError) -> ToolResponse {
    ToolResponse::tool_error(format!("{tool}: {error}"))
}

/// Compares two prior step outputs through the completion service
pub struct CompareTool {
    completion: Arc<dyn CompletionClient>,
}

impl CompareTool {
    /// Create the tool over a completion client
    pub fn new(completion: Arc<dyn CompletionClient>) -> Self {
        Self { completion }
    }
}

#[async_trait]
impl Tool for CompareTool {
    fn name(&self) -> &'static str {
        "compare"
    }

    async fn call(&self, params: Value) -> ToolResponse {
        let params: CompareParams = match parse_params(self.name(), params) {
            Ok(params) => params,
            Err(response) => return response,
        };
        let (left, right) = match (params.left.as_literal(), params.right.as_literal()) {
            (Some(left), Some(right)) => (left, right),
            _ => return ToolResponse::validation_error("compare inputs are unresolved"),
        };

        let user = format!(
            "Question: {}\n\n--- Excerpt A ---\n{}\n\n--- Excerpt B ---\n{}",
            params.question,
            truncated(left),
            truncated(right)
        );

        match self
            .completion
            .complete(COMPARE_SYSTEM_PROMPT, &user, false)
            .await
        {
            Ok(text) => ToolResponse::ok(json!(text)),
            Err(e) => completion_failure(self.name(), e),
        }
    }
}

/// Produces the final answer from the gathered context
pub struct SynthesizeTool {
    completion: Arc<dyn CompletionClient>,
}

impl SynthesizeTool {
    /// Create the tool over a completion client
    pub fn new(completion: Arc<dyn CompletionClient>) -> Self {
        Self { completion }
    }
}

#[async_trait]
impl Tool for SynthesizeTool {
    fn name(&self) -> &'static str {
        "synthesize"
    }

    async fn call(&self, params: Value) -> ToolResponse {
        let params: SynthesizeParams = match parse_params(self.name(), params) {
            Ok(params) => params,
            Err(response) => return response,
        };
        if params.sources.is_empty() {
            return ToolResponse::validation_error("synthesize needs at least one source");
        }

        let mut context_block = String::new();
        for (idx, source) in params.sources.iter().enumerate() {
            let text = match source {
                ValueSource::Literal(text) => text,
                ValueSource::StepOutput { .. } => {
                    return ToolResponse::validation_error("synthesize sources are unresolved")
                }
            };
            context_block.push_str(&format!("[{}] {}\n\n", idx + 1, truncated(text)));
        }

        let user = format!(
            "Question: {}\n\nContext excerpts:\n{}",
            params.question, context_block
        );

        match self
            .completion
            .complete(SYNTHESIZE_SYSTEM_PROMPT, &user, false)
            .await
        {
            Ok(text) => ToolResponse::ok(json!(text)),
            Err(e) => completion_failure(self.name(), e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct RecordingCompletion {
        reply: String,
        prompts: Mutex<Vec<String>>,
    }

    impl RecordingCompletion {
        fn new(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: reply.to_string(),
                prompts: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl CompletionClient for RecordingCompletion {
        async fn complete(
            &self,
            _system: &str,
            user: &str,
            _force_json: bool,
        ) -> Result<String, CompletionError> {
            self.prompts.lock().unwrap().push(user.to_string());
            Ok(self.reply.clone())
        }
    }

    struct FailingCompletion;

    #[async_trait]
    impl CompletionClient for FailingCompletion {
        async fn complete(
            &self,
            _system: &str,
            _user: &str,
            _force_json: bool,
        ) -> Result<String, CompletionError> {
            Err(CompletionError::RateLimited {
                status: 429,
                body: "slow down".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn test_synthesize_numbers_sources() {
        let completion = RecordingCompletion::new("Revenue grew 2% year over year.");
        let tool = SynthesizeTool::new(completion.clone());

        let response = tool
            .call(json!({
                "question": "How did revenue change?",
                "sources": ["revenue 2023: 383B", "revenue 2022: 394B"]
            }))
            .await;

        assert!(response.succeeded);
        assert_eq!(
            response.payload.unwrap(),
            json!("Revenue grew 2% year over year.")
        );

        let prompts = completion.prompts.lock().unwrap();
        assert!(prompts[0].contains("[1] revenue 2023"));
        assert!(prompts[0].contains("[2] revenue 2022"));
    }

    #[tokio::test]
    async fn test_synthesize_rejects_unresolved_source() {
        let tool = SynthesizeTool::new(RecordingCompletion::new("x"));
        let response = tool
            .call(json!({
                "question": "q",
                "sources": [{"step": 3}]
            }))
            .await;

        assert!(!response.succeeded);
        assert_eq!(
            response.error_kind,
            Some(crate::tools::ToolErrorKind::ValidationError)
        );
    }

    #[tokio::test]
    async fn test_synthesize_requires_sources() {
        let tool = SynthesizeTool::new(RecordingCompletion::new("x"));
        let response = tool.call(json!({"question": "q", "sources": []})).await;

        assert!(!response.succeeded);
    }

    #[tokio::test]
    async fn test_compare_includes_both_excerpts() {
        let completion = RecordingCompletion::new("A discloses more risk than B.");
        let tool = CompareTool::new(completion.clone());

        let response = tool
            .call(json!({
                "question": "Which year lists more risks?",
                "left": "2023 risk factors",
                "right": "2022 risk factors"
            }))
            .await;

        assert!(response.succeeded);
        let prompts = completion.prompts.lock().unwrap();
        assert!(prompts[0].contains("Excerpt A"));
        assert!(prompts[0].contains("2022 risk factors"));
    }

    #[tokio::test]
    async fn test_completion_failure_is_tool_error() {
        let tool = SynthesizeTool::new(Arc::new(FailingCompletion));
        let response = tool
            .call(json!({"question": "q", "sources": ["ctx"]}))
            .await;

        assert!(!response.succeeded);
        assert_eq!(
            response.error_kind,
            Some(crate::tools::ToolErrorKind::ToolError)
        );
        assert!(response.error_message.unwrap().contains("rate limit"));
    }
}
