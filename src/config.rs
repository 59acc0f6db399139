//! Application configuration
//!
//! Centralized configuration management with environment variable support
//! and sensible defaults.

use std::env;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Server configuration
    pub server: ServerConfig,
    /// Planning collaborator configuration
    pub planner: PlannerConfig,
    /// Retrieval tool configuration
    pub tools: ToolsConfig,
    /// Execution configuration for the orchestration loop
    pub execution: ExecutionConfig,
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to bind the server to
    pub port: u16,
    /// Host address to bind to
    pub host: String,
}

/// Planning collaborator configuration
#[derive(Debug, Clone)]
pub struct PlannerConfig {
    /// API key for the completion service (may be empty; validated at call time)
    pub api_key: String,
    /// Model used for planning and synthesis
    pub model: String,
}

/// Retrieval tool configuration
#[derive(Debug, Clone)]
pub struct ToolsConfig {
    /// API key for the filing data services (may be empty; validated at call time)
    pub sec_api_key: String,
}

/// Execution configuration for the orchestration loop
#[derive(Debug, Clone)]
pub struct ExecutionConfig {
    /// Upper bound for a single tool invocation (in seconds)
    pub step_timeout_secs: u64,
    /// Maximum number of replans before the query is aborted
    pub replan_ceiling: u32,
    /// Maximum query length in characters
    pub max_query_length: usize,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            step_timeout_secs: 30,
            replan_ceiling: 3,
            max_query_length: 10_000,
        }
    }
}

impl Config {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        Self {
            server: ServerConfig {
                port: env::var("PORT")
                    .ok()
                    .and_then(|p| p.parse().ok())
                    .unwrap_or(8080),
                host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            },
            planner: PlannerConfig {
                api_key: env::var("OPENAI_API_KEY").unwrap_or_default(),
                model: env::var("PLANNER_MODEL").unwrap_or_else(|_| "gpt-4-turbo".to_string()),
            },
            tools: ToolsConfig {
                sec_api_key: env::var("SEC_API_KEY").unwrap_or_default(),
            },
            execution: ExecutionConfig {
                step_timeout_secs: env::var("STEP_TIMEOUT_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(30),
                replan_ceiling: env::var("REPLAN_CEILING")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(3),
                max_query_length: env::var("MAX_QUERY_LENGTH")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(10_000),
            },
        }
    }

    /// Server address in "host:port" format
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_default_config() {
        std::env::remove_var("PORT");
        std::env::remove_var("HOST");
        std::env::remove_var("STEP_TIMEOUT_SECS");
        std::env::remove_var("REPLAN_CEILING");

        let config = Config::from_env();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.execution.step_timeout_secs, 30);
        assert_eq!(config.execution.replan_ceiling, 3);
        assert_eq!(config.server_addr(), "0.0.0.0:8080");
    }

    #[test]
    #[serial]
    fn test_config_from_env_overrides() {
        std::env::set_var("PORT", "9999");
        std::env::set_var("REPLAN_CEILING", "5");

        let config = Config::from_env();
        assert_eq!(config.server.port, 9999);
        assert_eq!(config.execution.replan_ceiling, 5);

        std::env::remove_var("PORT");
        std::env::remove_var("REPLAN_CEILING");
    }

    #[test]
    #[serial]
    fn test_invalid_port_falls_back_to_default() {
        std::env::set_var("PORT", "not-a-port");
        let config = Config::from_env();
        assert_eq!(config.server.port, 8080);
        std::env::remove_var("PORT");
    }
}
