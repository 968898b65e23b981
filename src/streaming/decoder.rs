use crate::models::{DecodedMessage, WireMessage};
use crate::streaming::buffer::Frame;

/// OpenAI-style end-of-stream payload
const DONE_PAYLOAD: &str = "[DONE]";

/// SSE field names that carry no payload of their own
const NON_DATA_FIELDS: [&str; 3] = ["event:", "id:", "retry:"];

/// Turns frames into messages; never fails
///
/// Anything that is not a well-formed payload object degrades to a plain
/// text message so the session keeps going.
pub struct FrameDecoder {
    default_stream_id: String,
    default_model_type: String,
    decoded: u64,
    degraded: u64,
    skipped: u64,
}

impl FrameDecoder {
    pub fn new(default_stream_id: impl Into<String>, default_model_type: impl Into<String>) -> Self {
        Self {
            default_stream_id: default_stream_id.into(),
            default_model_type: default_model_type.into(),
            decoded: 0,
            degraded: 0,
            skipped: 0,
        }
    }

    /// Decode a frame, or `None` when the frame carries nothing to deliver
    pub fn decode(&mut self, frame: &Frame) -> Option<DecodedMessage> {
        let Some(payload) = extract_payload(&frame.raw) else {
            self.skipped += 1;
            return None;
        };

        if payload.trim() == DONE_PAYLOAD {
            self.decoded += 1;
            let mut msg = self.synthetic(String::new());
            msg.finished = true;
            return Some(msg);
        }

        match serde_json::from_str::<WireMessage>(&payload) {
            Ok(wire) => {
                self.decoded += 1;
                Some(wire.into_decoded(&self.default_stream_id, &self.default_model_type))
            }
            Err(e) => {
                self.degraded += 1;
                tracing::debug!(
                    error = %e,
                    size = payload.len(),
                    "Payload is not a structured message, delivering as text"
                );
                Some(self.synthetic(payload))
            }
        }
    }

    /// Messages delivered from a structured payload
    pub fn decoded_count(&self) -> u64 {
        self.decoded
    }

    /// Messages that fell back to plain text
    pub fn degraded_count(&self) -> u64 {
        self.degraded
    }

    /// Empty, comment-only or field-only frames
    pub fn skipped_count(&self) -> u64 {
        self.skipped
    }

    fn synthetic(&self, content: String) -> DecodedMessage {
        DecodedMessage::text(content, &self.default_stream_id, &self.default_model_type)
    }
}

/// Payload text of a frame
///
/// With `data:` lines present only their values are used (joined by
/// newlines); otherwise the frame is taken verbatim unless it consists of
/// comments and bare SSE fields only.
fn extract_payload(raw: &str) -> Option<String> {
    let mut data_lines = Vec::new();
    let mut has_other_text = false;

    for line in raw.lines() {
        let trimmed = line.trim_start();
        if let Some(value) = trimmed.strip_prefix("data:") {
            data_lines.push(value.strip_prefix(' ').unwrap_or(value));
        } else if trimmed.is_empty()
            || trimmed.starts_with(':')
            || NON_DATA_FIELDS.iter().any(|field| trimmed.starts_with(field))
        {
            continue;
        } else {
            has_other_text = true;
        }
    }

    if !data_lines.is_empty() {
        let payload = data_lines.join("\n");
        return if payload.trim().is_empty() {
            None
        } else {
            Some(payload)
        };
    }

    if has_other_text {
        Some(raw.trim().to_string())
    } else {
        None
    }
}
