use serde::{Deserialize, Serialize};

/// One application-level message reconstructed from a frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedMessage {
    pub content: String,
    pub finished: bool,
    pub finish_reason: Option<String>,
    pub token_usage: Option<u64>,
    pub stream_id: String,
    pub model_type: String,
}

impl DecodedMessage {
    /// Plain text message used when a payload is not structured
    pub fn text(content: impl Into<String>, stream_id: &str, model_type: &str) -> Self {
        Self {
            content: content.into(),
            finished: false,
            finish_reason: None,
            token_usage: None,
            stream_id: stream_id.to_string(),
            model_type: model_type.to_string(),
        }
    }
}

/// Payload object as it appears on the wire
///
/// Only the shape is strict; every field has a default so that minimal
/// payloads such as `{"content":"x","finished":false}` still parse.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WireMessage {
    pub stream_id: Option<String>,
    pub model_type: Option<String>,
    pub content: String,
    pub finished: bool,
    pub finish_reason: Option<String>,
    pub token_usage: Option<u64>,
}

impl WireMessage {
    /// Fill in missing identifiers from the session defaults
    pub fn into_decoded(self, default_stream_id: &str, default_model_type: &str) -> DecodedMessage {
        DecodedMessage {
            content: self.content,
            finished: self.finished,
            finish_reason: self.finish_reason,
            token_usage: self.token_usage,
            stream_id: self
                .stream_id
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| default_stream_id.to_string()),
            model_type: self
                .model_type
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| default_model_type.to_string()),
        }
    }
}
