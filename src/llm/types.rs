//! Chat-completions API types
//!
//! Structs that mirror the OpenAI-style chat-completions JSON format.
//! Used to serialize requests and deserialize API responses into typed
//! Rust structs.

use serde::{Deserialize, Serialize};

/// Request structure for the chat-completions endpoint
#[derive(Serialize, Debug)]
pub struct ChatRequest {
    /// Model name, e.g. "gpt-4-turbo"
    pub model: String,
    /// Ordered conversation messages
    pub messages: Vec<ChatMessage>,
    /// Sampling temperature; planning uses a low value
    pub temperature: f32,
    /// Optional response format (e.g. force a JSON object)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ResponseFormat>,
}

/// A single chat message
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ChatMessage {
    /// Role: "system", "user", or "assistant"
    pub role: String,
    /// Message text
    pub content: String,
}

/// Response format hint for the model
#[derive(Serialize, Debug)]
pub struct ResponseFormat {
    /// Format type, e.g. "json_object"
    #[serde(rename = "type")]
    pub format_type: String,
}

/// Top-level chat-completions response
#[derive(Deserialize, Debug)]
pub struct ChatResponse {
    /// Candidate completions from the model
    pub choices: Vec<ChatChoice>,
}

/// A single candidate completion
#[derive(Deserialize, Debug)]
pub struct ChatChoice {
    /// The completion message
    pub message: ChatMessage,
    /// Why the model stopped generating (if applicable)
    #[serde(default)]
    #[allow(dead_code)] // Part of API response format, may be used in future
    pub finish_reason: Option<String>,
}
