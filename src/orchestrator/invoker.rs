//! Tool invoker
//!
//! Executes one plan step: routes the intent, substitutes step-output
//! references with concrete values, enforces the per-step deadline, and
//! converts whatever happens into a Result Record. Only a routing miss
//! escapes as an error; every other failure is recorded, classified, and
//! handed to the decision procedure.

use std::time::Duration;

use serde_json::json;

use crate::orchestrator::context::{ContextStore, FailureKind, ResolvedEntity, ResultRecord};
use crate::orchestrator::intent::{StepAction, ValueSource};
use crate::orchestrator::plan::Step;
use crate::orchestrator::router::{RoutingError, ToolRouter};
use crate::tools::Tool;

/// Executes steps against the injected tool set
pub struct ToolInvoker {
    router: ToolRouter,
    step_timeout: Duration,
}

impl ToolInvoker {
    /// Create an invoker over a router with a per-step deadline
    pub fn new(router: ToolRouter, step_timeout: Duration) -> Self {
        Self {
            router,
            step_timeout,
        }
    }

    /// Execute one step and produce its Result Record
    ///
    /// A `RoutingError` (unknown intent) is a configuration fault and is
    /// the only way this returns `Err`. Unresolved references, tool
    /// failures, and deadline misses all come back as failed records.
    pub async fn invoke(
        &self,
        step: &Step,
        context: &mut ContextStore,
    ) -> Result<ResultRecord, RoutingError> {
        let intent = step.action.intent();
        let tool = self.router.route(intent)?;

        // Repeated resolution of an identifier already resolved this query
        // is served from the entity cache without an invocation.
        if let StepAction::ResolveEntity(params) = &step.action {
            if let Some(entity) = context.entity(&params.identifier) {
                tracing::debug!(
                    position = step.position,
                    identifier = %params.identifier,
                    "Entity cache hit, skipping resolution call"
                );
                let payload = serde_json::to_value(entity)
                    .unwrap_or_else(|_| json!({ "cik": entity.cik }));
                return Ok(ResultRecord::succeeded(Some(payload)));
            }
        }

        // Substitute references before the tool sees the parameters.
        let action = match resolve_action(&step.action, context) {
            Ok(action) => action,
            Err(record) => return Ok(record),
        };

        tracing::debug!(
            position = step.position,
            intent = %intent,
            tool = tool.name(),
            "Invoking tool"
        );

        let response = match tokio::time::timeout(self.step_timeout, tool.call(action.params_json()))
            .await
        {
            Ok(response) => response,
            Err(_) => {
                tracing::warn!(
                    position = step.position,
                    intent = %intent,
                    timeout_secs = self.step_timeout.as_secs(),
                    "Tool invocation timed out"
                );
                return Ok(ResultRecord::failed(
                    FailureKind::Timeout,
                    format!(
                        "{} did not answer within {} seconds",
                        tool.name(),
                        self.step_timeout.as_secs()
                    ),
                ));
            }
        };

        let record = if response.succeeded {
            ResultRecord::succeeded(response.payload)
        } else {
            let kind = response
                .error_kind
                .map(FailureKind::from)
                .unwrap_or(FailureKind::ToolError);
            ResultRecord::failed(
                kind,
                response
                    .error_message
                    .unwrap_or_else(|| format!("{} failed without detail", tool.name())),
            )
        };

        // A fresh successful resolution feeds the entity cache.
        if let (StepAction::ResolveEntity(params), Some(payload)) =
            (&step.action, record.payload.as_ref())
        {
            if let Some(entity) = ResolvedEntity::from_payload(payload) {
                context.cache_entity(params.identifier.clone(), entity);
            }
        }

        tracing::debug!(
            position = step.position,
            intent = %intent,
            status = ?record.status,
            "Step recorded"
        );

        Ok(record)
    }
}

/// Clone the action with every step-output reference replaced by a literal
///
/// A reference that cannot be resolved (missing, failed, or empty
/// upstream record) fails the step up front with kind
/// `unresolved-reference`; the tool is never called.
fn resolve_action(action: &StepAction, context: &ContextStore) -> Result<StepAction, ResultRecord> {
    let mut resolved = action.clone();
    for source in resolved.sources_mut() {
        if let ValueSource::StepOutput { step, field } = source {
            match context.resolve_output(*step, field.as_deref()) {
                Ok(value) => *source = ValueSource::Literal(value),
                Err(err) => {
                    return Err(ResultRecord::failed(
                        FailureKind::UnresolvedReference,
                        err.to_string(),
                    ));
                }
            }
        }
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::IdentifierKind;
    use crate::orchestrator::intent::{
        ExtractSectionParams, Intent, ResolveEntityParams, StepAction,
    };
    use crate::orchestrator::plan::StepStatus;
    use crate::tools::{Tool, ToolResponse};
    use async_trait::async_trait;
    use serde_json::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct FixedTool {
        response: ToolResponse,
        calls: AtomicUsize,
    }

    impl FixedTool {
        fn new(response: ToolResponse) -> Arc<Self> {
            Arc::new(Self {
                response,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Tool for FixedTool {
        fn name(&self) -> &'static str {
            "fixed"
        }

        async fn call(&self, _params: Value) -> ToolResponse {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.response.clone()
        }
    }

    struct SlowTool;

    #[async_trait]
    impl Tool for SlowTool {
        fn name(&self) -> &'static str {
            "slow"
        }

        async fn call(&self, _params: Value) -> ToolResponse {
            tokio::time::sleep(Duration::from_secs(60)).await;
            ToolResponse::empty()
        }
    }

    fn resolve_step(position: usize, identifier: &str) -> Step {
        Step {
            position,
            action: StepAction::ResolveEntity(ResolveEntityParams {
                identifier: identifier.to_string(),
                kind: IdentifierKind::Ticker,
            }),
            fallback: None,
            status: StepStatus::Pending,
        }
    }

    fn extract_step(position: usize, document: ValueSource) -> Step {
        Step {
            position,
            action: StepAction::ExtractSection(ExtractSectionParams {
                document,
                section: "1A".to_string(),
            }),
            fallback: None,
            status: StepStatus::Pending,
        }
    }

    fn invoker_with(intent: Intent, tool: Arc<dyn Tool>) -> ToolInvoker {
        let mut router = ToolRouter::new();
        router.register(intent, tool);
        ToolInvoker::new(router, Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_invoke_success_records_payload() {
        let tool = FixedTool::new(ToolResponse::ok(serde_json::json!({"cik": "123"})));
        let invoker = invoker_with(Intent::ResolveEntity, tool.clone());
        let mut context = ContextStore::new();

        let record = invoker
            .invoke(&resolve_step(1, "AAPL"), &mut context)
            .await
            .unwrap();

        assert_eq!(record.status, StepStatus::Succeeded);
        assert_eq!(record.payload, Some(serde_json::json!({"cik": "123"})));
        assert_eq!(tool.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_invoke_unknown_intent_is_routing_error() {
        let invoker = ToolInvoker::new(ToolRouter::new(), Duration::from_secs(5));
        let mut context = ContextStore::new();

        let result = invoker.invoke(&resolve_step(1, "AAPL"), &mut context).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_invoke_timeout_is_recorded_not_thrown() {
        let mut router = ToolRouter::new();
        router.register(Intent::ExtractSection, Arc::new(SlowTool));
        let invoker = ToolInvoker::new(router, Duration::from_millis(20));
        let mut context = ContextStore::new();

        let step = extract_step(1, ValueSource::Literal("https://example.test/f.htm".into()));
        let record = invoker.invoke(&step, &mut context).await.unwrap();

        assert_eq!(record.status, StepStatus::Failed);
        assert_eq!(record.error.unwrap().kind, FailureKind::Timeout);
    }

    #[tokio::test]
    async fn test_invoke_unresolved_reference_skips_tool() {
        let tool = FixedTool::new(ToolResponse::ok(serde_json::json!("text")));
        let invoker = invoker_with(Intent::ExtractSection, tool.clone());
        let mut context = ContextStore::new();

        // References step 9, which has no record
        let step = extract_step(
            1,
            ValueSource::StepOutput {
                step: 9,
                field: None,
            },
        );
        let record = invoker.invoke(&step, &mut context).await.unwrap();

        assert_eq!(record.status, StepStatus::Failed);
        assert_eq!(
            record.error.unwrap().kind,
            FailureKind::UnresolvedReference
        );
        assert_eq!(tool.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_invoke_resolves_reference_to_literal() {
        let tool = FixedTool::new(ToolResponse::ok(serde_json::json!("section text")));
        let invoker = invoker_with(Intent::ExtractSection, tool.clone());
        let mut context = ContextStore::new();
        context
            .record(
                2,
                ResultRecord::succeeded(Some(serde_json::json!({
                    "url": "https://example.test/filing.htm"
                }))),
            )
            .unwrap();

        let step = extract_step(
            3,
            ValueSource::StepOutput {
                step: 2,
                field: Some("url".to_string()),
            },
        );
        let record = invoker.invoke(&step, &mut context).await.unwrap();

        assert_eq!(record.status, StepStatus::Succeeded);
        assert_eq!(tool.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_entity_cache_prevents_second_invocation() {
        let tool = FixedTool::new(ToolResponse::ok(serde_json::json!({
            "name": "Apple Inc.",
            "cik": "0000320193",
            "ticker": "AAPL"
        })));
        let invoker = invoker_with(Intent::ResolveEntity, tool.clone());
        let mut context = ContextStore::new();

        let first = invoker
            .invoke(&resolve_step(1, "AAPL"), &mut context)
            .await
            .unwrap();
        assert_eq!(first.status, StepStatus::Succeeded);

        let second = invoker
            .invoke(&resolve_step(4, "AAPL"), &mut context)
            .await
            .unwrap();
        assert_eq!(second.status, StepStatus::Succeeded);
        assert_eq!(second.payload.unwrap()["cik"], "0000320193");

        // Only the first step actually reached the tool
        assert_eq!(tool.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_invoke_failure_classification_passes_through() {
        let tool = FixedTool::new(ToolResponse::validation_error("no company matched"));
        let invoker = invoker_with(Intent::ResolveEntity, tool);
        let mut context = ContextStore::new();

        let record = invoker
            .invoke(&resolve_step(1, "ZZZZZ"), &mut context)
            .await
            .unwrap();

        assert_eq!(record.status, StepStatus::Failed);
        let error = record.error.unwrap();
        assert_eq!(error.kind, FailureKind::ValidationError);
        assert!(error.message.contains("no company matched"));
    }
}
