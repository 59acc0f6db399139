//! Shared application state
//!
//! Holds the pieces every query needs: the execution settings, the shared
//! HTTP client, the completion client, and the injected tool registry.
//! Each query builds its own coordinator (and owns its own context
//! store), so queries share clients but never mutable state.

use std::sync::Arc;
use std::time::Duration;

use crate::config::{Config, ExecutionConfig};
use crate::llm::{CompletionClient, OpenAiClient};
use crate::orchestrator::coordinator::ExecutionCoordinator;
use crate::orchestrator::invoker::ToolInvoker;
use crate::orchestrator::planner::PlanGenerator;
use crate::orchestrator::router::ToolRouter;
use crate::tools;

/// Shared application state
pub struct AppState {
    execution: ExecutionConfig,
    completion: Arc<dyn CompletionClient>,
    router: ToolRouter,
}

impl AppState {
    /// Build state from configuration, wiring the production tool set
    pub fn from_config(config: &Config) -> Self {
        let http = reqwest::Client::new();
        let completion: Arc<dyn CompletionClient> = Arc::new(OpenAiClient::new(
            http.clone(),
            config.planner.api_key.clone(),
            config.planner.model.clone(),
        ));
        let router = tools::build_registry(http, &config.tools.sec_api_key, completion.clone());

        Self {
            execution: config.execution.clone(),
            completion,
            router,
        }
    }

    /// Build state from explicit parts (tests inject their own tool set)
    pub fn new(
        execution: ExecutionConfig,
        completion: Arc<dyn CompletionClient>,
        router: ToolRouter,
    ) -> Self {
        Self {
            execution,
            completion,
            router,
        }
    }

    /// Current execution settings
    pub fn execution(&self) -> &ExecutionConfig {
        &self.execution
    }

    /// Replace the execution settings (validated by the API layer)
    pub fn set_execution(&mut self, execution: ExecutionConfig) {
        self.execution = execution;
    }

    /// Build a coordinator for one query from the current settings
    pub fn coordinator(&self) -> ExecutionCoordinator {
        ExecutionCoordinator::new(
            PlanGenerator::new(self.completion.clone()),
            ToolInvoker::new(
                self.router.clone(),
                Duration::from_secs(self.execution.step_timeout_secs),
            ),
            self.execution.replan_ceiling,
        )
    }
}
