//! Tool router
//!
//! Pure lookup from a step's declared intent to a registered tool. The
//! mapping is injected at construction time so independent queries and
//! tests run with independent tool sets; there is no process-wide
//! registry.

use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

use crate::orchestrator::intent::Intent;
use crate::tools::Tool;

/// An intent with no registered handler
///
/// Always a configuration fault: the planner's vocabulary and the
/// registry are supposed to be built from the same closed set. Never
/// retried and never converted into a step failure.
#[derive(Error, Debug, PartialEq)]
#[error("no tool registered for intent '{0}'")]
pub struct RoutingError(pub Intent);

/// Injected mapping from intent to tool
#[derive(Clone, Default)]
pub struct ToolRouter {
    handlers: HashMap<Intent, Arc<dyn Tool>>,
}

impl ToolRouter {
    /// An empty router; handlers are added with [`register`](Self::register)
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind an intent to a tool, replacing any previous binding
    pub fn register(&mut self, intent: Intent, tool: Arc<dyn Tool>) {
        self.handlers.insert(intent, tool);
    }

    /// Look up the tool for an intent
    pub fn route(&self, intent: Intent) -> Result<Arc<dyn Tool>, RoutingError> {
        self.handlers
            .get(&intent)
            .cloned()
            .ok_or(RoutingError(intent))
    }

    /// Number of registered handlers
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether no handlers are registered
    #[allow(dead_code)] // Paired with len()
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{ToolResponse, Tool};
    use async_trait::async_trait;
    use serde_json::Value;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &'static str {
            "echo"
        }

        async fn call(&self, params: Value) -> ToolResponse {
            ToolResponse::ok(params)
        }
    }

    #[test]
    fn test_route_registered_intent() {
        let mut router = ToolRouter::new();
        router.register(Intent::ResolveEntity, Arc::new(EchoTool));

        let tool = router.route(Intent::ResolveEntity).unwrap();
        assert_eq!(tool.name(), "echo");
    }

    #[test]
    fn test_route_unregistered_intent_is_error() {
        let router = ToolRouter::new();
        let result = router.route(Intent::Synthesize);
        assert_eq!(result.err().unwrap(), RoutingError(Intent::Synthesize));
    }

    #[test]
    fn test_register_replaces_binding() {
        let mut router = ToolRouter::new();
        router.register(Intent::Compare, Arc::new(EchoTool));
        router.register(Intent::Compare, Arc::new(EchoTool));
        assert_eq!(router.len(), 1);
    }
}
