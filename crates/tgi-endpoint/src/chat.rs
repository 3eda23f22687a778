//! Messages API payloads exchanged with the serving container.

use serde::{Deserialize, Serialize};

use crate::errors::{EndpointError, EndpointResult};

/// Placeholder model name; TGI serves a single model and ignores it.
pub const PLACEHOLDER_MODEL: &str = "tgi";

/// Role of a message in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System message (sets context/behavior)
    System,
    /// User message (input)
    User,
    /// Assistant message (model output)
    Assistant,
}

/// A single conversation turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Role of the message sender
    pub role: Role,
    /// Content of the message
    pub content: String,
}

impl ChatMessage {
    /// Create a new system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    /// Create a new user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Create a new assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Sampling knobs merged into every request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationParams {
    /// Sampling temperature.
    pub temperature: f32,
    /// Nucleus sampling threshold.
    pub top_p: f32,
    /// Maximum tokens to generate.
    pub max_tokens: u32,
    /// Stop sequences.
    pub stop: Vec<String>,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: 0.6,
            top_p: 0.9,
            max_tokens: 512,
            stop: vec!["<|eot_id|>".to_string()],
        }
    }
}

/// Wire request for the Messages API.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    /// Placeholder model name.
    pub model: String,
    /// Conversation so far.
    pub messages: Vec<ChatMessage>,
    /// Nucleus sampling threshold.
    pub top_p: f32,
    /// Sampling temperature.
    pub temperature: f32,
    /// Maximum tokens to generate.
    pub max_tokens: u32,
    /// Stop sequences.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub stop: Vec<String>,
}

impl ChatRequest {
    /// Build a request from messages and generation parameters.
    pub fn new(messages: Vec<ChatMessage>, params: &GenerationParams) -> Self {
        Self {
            model: PLACEHOLDER_MODEL.to_string(),
            messages,
            top_p: params.top_p,
            temperature: params.temperature,
            max_tokens: params.max_tokens,
            stop: params.stop.clone(),
        }
    }
}

/// Wire response of the Messages API.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponse {
    /// Generated alternatives.
    #[serde(default)]
    pub choices: Vec<Choice>,
    /// Token usage, when reported.
    pub usage: Option<Usage>,
}

/// One generated alternative.
#[derive(Debug, Clone, Deserialize)]
pub struct Choice {
    /// Generated message.
    pub message: ChoiceMessage,
    /// Why generation stopped.
    pub finish_reason: Option<String>,
}

/// Message inside a [`Choice`].
#[derive(Debug, Clone, Deserialize)]
pub struct ChoiceMessage {
    /// Role, usually "assistant".
    pub role: Option<String>,
    /// Generated text.
    #[serde(default)]
    pub content: String,
}

/// Token usage reported by the container.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct Usage {
    /// Prompt tokens.
    #[serde(default)]
    pub prompt_tokens: u32,
    /// Generated tokens.
    #[serde(default)]
    pub completion_tokens: u32,
    /// Sum of both.
    #[serde(default)]
    pub total_tokens: u32,
}

impl ChatResponse {
    /// Text of the first choice with surrounding whitespace stripped.
    ///
    /// # Errors
    /// Returns [`EndpointError::EmptyResponse`] when there are no choices.
    pub fn text(&self) -> EndpointResult<&str> {
        self.choices
            .first()
            .map(|c| c.message.content.trim())
            .ok_or(EndpointError::EmptyResponse)
    }
}

/// Parse a raw response body and extract the generated text.
///
/// # Errors
/// Returns [`EndpointError::Serialization`] for a body that is not a Messages
/// API response and [`EndpointError::EmptyResponse`] when it has no choices.
pub fn extract_text(body: &str) -> EndpointResult<String> {
    let response: ChatResponse = serde_json::from_str(body)?;
    response.text().map(str::to_string)
}
