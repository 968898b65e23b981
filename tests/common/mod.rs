#![allow(dead_code)]

use answer_stream::error::{Result, StreamError};
use answer_stream::transport::{ChunkStream, OpenFuture, Transport, until_cancelled};
use answer_stream::{ChatStreamRequest, SessionEvent};
use bytes::Bytes;
use futures::stream;
use futures::StreamExt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::sync::CancellationToken;

/// One step of a scripted response
#[derive(Debug, Clone)]
pub enum Step {
    Chunk(Vec<u8>),
    Fail(String),
    /// Keep the connection open without sending anything
    Hang,
}

pub fn chunk(text: &str) -> Step {
    Step::Chunk(text.as_bytes().to_vec())
}

/// A complete `data:` frame with a content payload
pub fn frame(content: &str) -> String {
    format!(
        "data: {}\n\n",
        serde_json::json!({ "streamId": "s-1", "modelType": "test", "content": content, "finished": false })
    )
}

pub fn finished_frame() -> String {
    format!(
        "data: {}\n\n",
        serde_json::json!({ "streamId": "s-1", "modelType": "test", "content": "", "finished": true, "finishReason": "stop", "tokenUsage": 17 })
    )
}

/// Transport that replays a fixed script
pub struct ScriptedTransport {
    steps: Vec<Step>,
    open_error: Option<String>,
    /// Accept the request but never produce a response
    stall_open: bool,
    opened: AtomicUsize,
}

impl ScriptedTransport {
    pub fn new(steps: Vec<Step>) -> Arc<Self> {
        Arc::new(Self {
            steps,
            open_error: None,
            stall_open: false,
            opened: AtomicUsize::new(0),
        })
    }

    pub fn refusing(message: &str) -> Arc<Self> {
        Arc::new(Self {
            steps: Vec::new(),
            open_error: Some(message.to_string()),
            stall_open: false,
            opened: AtomicUsize::new(0),
        })
    }

    pub fn stalled() -> Arc<Self> {
        Arc::new(Self {
            steps: Vec::new(),
            open_error: None,
            stall_open: true,
            opened: AtomicUsize::new(0),
        })
    }

    /// One chunk per byte of `text`
    pub fn bytewise(text: &str) -> Arc<Self> {
        Self::new(text.bytes().map(|b| Step::Chunk(vec![b])).collect())
    }

    pub fn open_count(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

impl Transport for ScriptedTransport {
    fn open(&self, _request: &ChatStreamRequest, cancel: CancellationToken) -> OpenFuture {
        self.opened.fetch_add(1, Ordering::SeqCst);
        let steps = self.steps.clone();
        let open_error = self.open_error.clone();
        let stall_open = self.stall_open;

        Box::pin(async move {
            if stall_open {
                std::future::pending::<()>().await;
            }
            if let Some(message) = open_error {
                return Err(StreamError::Transport(message));
            }

            let hang = matches!(steps.last(), Some(Step::Hang));
            let items: Vec<Result<Bytes>> = steps
                .into_iter()
                .filter_map(|step| match step {
                    Step::Chunk(bytes) => Some(Ok(Bytes::from(bytes))),
                    Step::Fail(message) => Some(Err(StreamError::Transport(message))),
                    Step::Hang => None,
                })
                .collect();

            let chunks: ChunkStream = if hang {
                until_cancelled(stream::iter(items).chain(stream::pending()), cancel)
            } else {
                until_cancelled(stream::iter(items), cancel)
            };
            Ok(chunks)
        })
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Receive events until (and including) the terminal one
pub async fn collect_until_terminal(rx: &mut UnboundedReceiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        let terminal = event.event.is_terminal();
        events.push(event);
        if terminal {
            break;
        }
    }
    events
}
