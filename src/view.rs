use crate::event::{SessionEvent, StreamEvent};
use crate::models::SessionId;
use crate::streaming::TextUpdate;

/// Notice shown in place of the message status when a stream fails
pub const FAILURE_NOTICE: &str = "Sorry, something went wrong while generating the response. Please try again.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseStatus {
    Waiting,
    Thinking,
    Answering,
    Complete,
    Failed,
    Cancelled,
}

/// Render state of one assistant message, folded from its session's events
///
/// Events from any other session are ignored, so late events of a
/// superseded stream never land in the current message.
#[derive(Debug, Clone)]
pub struct ResponseView {
    session_id: SessionId,
    pub thinking: String,
    pub answer: String,
    pub status: ResponseStatus,
    /// Set when the stream failed; partial content above is kept
    pub notice: Option<String>,
    pub token_usage: Option<u64>,
}

impl ResponseView {
    pub fn new(session_id: SessionId) -> Self {
        Self {
            session_id,
            thinking: String::new(),
            answer: String::new(),
            status: ResponseStatus::Waiting,
            notice: None,
            token_usage: None,
        }
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Apply an event; returns false when it belongs to another session
    /// or arrives after the view is final
    pub fn apply(&mut self, event: &SessionEvent) -> bool {
        if event.session_id != self.session_id || self.is_final() {
            return false;
        }

        match &event.event {
            StreamEvent::Thinking(update) => {
                apply_update(&mut self.thinking, update);
                if self.status == ResponseStatus::Waiting {
                    self.status = ResponseStatus::Thinking;
                }
            }
            StreamEvent::Answer(update) => {
                apply_update(&mut self.answer, update);
                self.status = ResponseStatus::Answering;
            }
            StreamEvent::Complete(completion) => {
                self.thinking = completion.thinking.clone();
                self.answer = completion.answer.clone();
                self.token_usage = completion.token_usage;
                self.status = ResponseStatus::Complete;
            }
            StreamEvent::Error { message } => {
                tracing::debug!(session_id = %self.session_id, error = %message, "Response failed");
                self.notice = Some(FAILURE_NOTICE.to_string());
                self.status = ResponseStatus::Failed;
            }
            StreamEvent::Cancelled => {
                self.status = ResponseStatus::Cancelled;
            }
        }
        true
    }

    pub fn is_final(&self) -> bool {
        matches!(
            self.status,
            ResponseStatus::Complete | ResponseStatus::Failed | ResponseStatus::Cancelled
        )
    }
}

fn apply_update(target: &mut String, update: &TextUpdate) {
    if update.rewritten {
        target.clone_from(&update.text);
    } else {
        target.push_str(&update.delta);
    }
}
