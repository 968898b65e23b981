use serde::{Deserialize, Serialize};

use crate::error::{Result, StreamError};

/// Parameters sent when opening a chat stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatStreamRequest {
    /// The user's message (required)
    pub message: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_type: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,

    /// Ask the backend to wrap reasoning and answer in sentinel markers.
    /// When off, phases are inferred from boilerplate phrases in the text.
    #[serde(default)]
    pub enable_thinking_markers: bool,
}

impl ChatStreamRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            model_type: None,
            temperature: None,
            max_tokens: None,
            user_id: None,
            system_prompt: None,
            enable_thinking_markers: true,
        }
    }

    pub fn with_model_type(mut self, model_type: impl Into<String>) -> Self {
        self.model_type = Some(model_type.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }

    pub fn with_thinking_markers(mut self, enabled: bool) -> Self {
        self.enable_thinking_markers = enabled;
        self
    }

    /// Validate the request before any connection is opened
    pub fn validate(&self) -> Result<()> {
        if self.message.trim().is_empty() {
            return Err(StreamError::InvalidRequest("Message is empty".into()));
        }

        if let Some(temp) = self.temperature
            && !(0.0..=2.0).contains(&temp)
        {
            return Err(StreamError::InvalidRequest(format!(
                "Invalid temperature: {}. Must be between 0.0 and 2.0",
                temp
            )));
        }

        if let Some(max_tokens) = self.max_tokens
            && (max_tokens == 0 || max_tokens > 1_000_000)
        {
            return Err(StreamError::InvalidRequest(format!(
                "Invalid maxTokens: {}. Must be between 1 and 1,000,000",
                max_tokens
            )));
        }

        Ok(())
    }
}
