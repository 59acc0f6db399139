//! Language-model completion collaborator
//!
//! The orchestration core consumes the completion service through the
//! narrow `CompletionClient` trait: one call in, one text completion out.
//! Planning forces JSON mode so the response can be validated against the
//! plan schema before anything acts on it.

pub mod openai;
pub mod types;

use async_trait::async_trait;
use thiserror::Error;

pub use openai::OpenAiClient;

/// Errors surfaced by the completion service
#[derive(Error, Debug)]
pub enum CompletionError {
    /// API key missing or empty
    #[error("completion API key is not set")]
    MissingApiKey,

    /// Transport-level failure (connect, TLS, read)
    #[error("completion request failed: {0}")]
    Http(String),

    /// The service rejected the request with a rate limit
    #[error("completion service rate limit exceeded (HTTP {status}): {body}")]
    RateLimited {
        /// HTTP status code (429)
        status: u16,
        /// Response body text
        body: String,
    },

    /// Non-success HTTP status from the service
    #[error("completion service returned HTTP {status}: {body}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Response body text
        body: String,
    },

    /// Response body could not be parsed into the expected shape
    #[error("failed to parse completion response: {0}")]
    Parse(String),

    /// Response parsed but contained no usable text
    #[error("completion response contained no text")]
    Empty,
}

/// Narrow interface to the completion service
///
/// Implementations must be cheap to share (`Arc<dyn CompletionClient>`)
/// and must not retry internally; bounding and retry policy belong to the
/// caller.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Request one completion for a system + user prompt pair
    ///
    /// When `force_json` is set the service is asked for a JSON object
    /// response; the caller still validates the result before use.
    async fn complete(
        &self,
        system: &str,
        user: &str,
        force_json: bool,
    ) -> Result<String, CompletionError>;
}
