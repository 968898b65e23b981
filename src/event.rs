use tokio::sync::mpsc;

use crate::models::SessionId;
use crate::streaming::{ClassifiedEvent, Completion, TextUpdate};

/// What a session reports to its consumer
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Thinking(TextUpdate),
    Answer(TextUpdate),
    Complete(Completion),
    /// Fatal transport or buffer failure; content already delivered stays valid
    Error { message: String },
    /// The consumer cancelled the session
    Cancelled,
}

impl StreamEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StreamEvent::Complete(_) | StreamEvent::Error { .. } | StreamEvent::Cancelled
        )
    }
}

impl From<ClassifiedEvent> for StreamEvent {
    fn from(event: ClassifiedEvent) -> Self {
        match event {
            ClassifiedEvent::Thinking(update) => StreamEvent::Thinking(update),
            ClassifiedEvent::Answer(update) => StreamEvent::Answer(update),
            ClassifiedEvent::Complete(completion) => StreamEvent::Complete(completion),
        }
    }
}

/// An event tagged with the session that produced it
///
/// Payloads are owned snapshots, never views into session buffers.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionEvent {
    pub session_id: SessionId,
    pub event: StreamEvent,
}

/// Receives the events of a session, in arrival order
///
/// Called from the session's read loop; implementations should return
/// quickly. Calling `SessionHandle::cancel` from inside `on_event` is allowed.
pub trait EventSink: Send + Sync + 'static {
    fn on_event(&self, event: SessionEvent);
}

impl<F> EventSink for F
where
    F: Fn(SessionEvent) + Send + Sync + 'static,
{
    fn on_event(&self, event: SessionEvent) {
        self(event)
    }
}

/// Forwards events into an unbounded tokio channel
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<SessionEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn on_event(&self, event: SessionEvent) {
        if self.tx.send(event).is_err() {
            tracing::debug!("Event receiver dropped");
        }
    }
}
