//! Session lifecycle: one read loop per stream, one terminal event per session.
//!
//! [`StreamClient::start`] spawns the loop
//! `Transport -> FrameBuffer -> FrameDecoder -> PhaseClassifier -> EventSink`
//! on the current tokio runtime and hands back a [`SessionHandle`]. Every
//! stage runs synchronously inside one loop iteration; the only suspension
//! point is the transport read. A heartbeat task runs next to the loop for
//! as long as the session is live.

use parking_lot::ReentrantMutex;
use std::cell::Cell;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::HttpTransport;
use crate::config::ClientConfig;
use crate::error::{Result, StreamError};
use crate::event::{EventSink, SessionEvent, StreamEvent};
use crate::metrics::StreamMetrics;
use crate::models::{ChatStreamRequest, SessionId};
use crate::registry::SessionRegistry;
use crate::streaming::{DetectionStrategy, Frame, FrameBuffer, FrameDecoder, PhaseClassifier};
use crate::transport::Transport;

/// Model name used for synthetic messages when the request names none
const DEFAULT_MODEL_TYPE: &str = "default";

/// Starts stream sessions against one backend
pub struct StreamClient {
    config: ClientConfig,
    transport: Arc<dyn Transport>,
    registry: SessionRegistry,
    metrics: Arc<StreamMetrics>,
}

impl StreamClient {
    pub fn new(config: ClientConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            config,
            transport,
            registry: SessionRegistry::new(),
            metrics: Arc::new(StreamMetrics::new()),
        }
    }

    /// Client backed by the reqwest transport
    pub fn with_http(config: ClientConfig) -> Result<Self> {
        config.validate()?;
        let transport = HttpTransport::new(&config)?;
        Ok(Self::new(config, Arc::new(transport)))
    }

    /// Open a stream and start delivering its events to `sink`
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self, request: ChatStreamRequest, sink: impl EventSink) -> Result<SessionHandle> {
        request.validate()?;

        if self.config.cancel_superseded {
            let superseded = self.registry.cancel_all();
            if superseded > 0 {
                info!(count = superseded, "Cancelled superseded sessions");
            }
        }

        let shared = Arc::new(SessionShared {
            id: SessionId::new_v4(),
            cancel: CancellationToken::new(),
            finished: CancellationToken::new(),
            sink: Box::new(sink),
            terminal: ReentrantMutex::new(Cell::new(false)),
            metrics: self.metrics.clone(),
            started_at: Instant::now(),
            bytes_received: AtomicU64::new(0),
            heartbeats: AtomicU64::new(0),
        });
        let handle = SessionHandle {
            shared: shared.clone(),
        };

        self.metrics.record_started();
        self.registry.insert(handle.clone());
        info!(
            session_id = %shared.id,
            transport = self.transport.name(),
            markers = request.enable_thinking_markers,
            "Session started"
        );

        let session = SessionTask {
            shared,
            transport: self.transport.clone(),
            request,
            idle_timeout: self.config.idle_timeout(),
            heartbeat_interval: self.config.heartbeat_interval(),
            max_buffer_bytes: self.config.max_buffer_bytes,
        };
        let registry = self.registry.clone();
        tokio::spawn(async move {
            let id = session.shared.id;
            let finished = session.shared.finished.clone();
            session.run().await;
            registry.remove(&id);
            finished.cancel();
        });

        Ok(handle)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn metrics(&self) -> &StreamMetrics {
        &self.metrics
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Cancel every live session
    pub fn cancel_all(&self) -> usize {
        self.registry.cancel_all()
    }
}

/// State shared between the read loop, the heartbeat and handles
struct SessionShared {
    id: SessionId,
    /// Stops the transport read and the heartbeat
    cancel: CancellationToken,
    /// Fires once the read loop has exited
    finished: CancellationToken,
    sink: Box<dyn EventSink>,
    /// Set once a terminal event went out; held while the sink runs so a
    /// concurrent `cancel` waits for an in-flight callback. Reentrant so the
    /// sink itself may cancel.
    terminal: ReentrantMutex<Cell<bool>>,
    metrics: Arc<StreamMetrics>,
    started_at: Instant,
    bytes_received: AtomicU64,
    heartbeats: AtomicU64,
}

impl SessionShared {
    /// Deliver an event unless the session is already terminal
    fn deliver(&self, event: StreamEvent) -> bool {
        let terminal = self.terminal.lock();
        if terminal.get() {
            return false;
        }

        if event.is_terminal() {
            terminal.set(true);
            match &event {
                StreamEvent::Complete(_) => self.metrics.record_completed(),
                StreamEvent::Error { .. } => self.metrics.record_failed(),
                StreamEvent::Cancelled => self.metrics.record_cancelled(),
                _ => {}
            }
        }

        self.sink.on_event(SessionEvent {
            session_id: self.id,
            event,
        });
        true
    }

    fn is_terminal(&self) -> bool {
        self.terminal.lock().get()
    }
}

/// Handle to a running session; cheap to clone
#[derive(Clone)]
pub struct SessionHandle {
    shared: Arc<SessionShared>,
}

impl SessionHandle {
    pub fn id(&self) -> SessionId {
        self.shared.id
    }

    /// Stop the session
    ///
    /// Delivers `Cancelled` unless a terminal event already went out. Once
    /// this returns no further event fires for the session.
    pub fn cancel(&self) {
        if self.shared.deliver(StreamEvent::Cancelled) {
            info!(session_id = %self.shared.id, "Session cancelled");
        }
        self.shared.cancel.cancel();
    }

    /// Release the session; safe to call any number of times
    pub fn close(&self) {
        if !self.shared.cancel.is_cancelled() {
            self.cancel();
        }
    }

    /// Whether a terminal event has been delivered
    pub fn is_terminal(&self) -> bool {
        self.shared.is_terminal()
    }

    /// Wait until the read loop and its heartbeat have shut down
    pub async fn wait(&self) {
        self.shared.finished.cancelled().await;
    }

    pub fn elapsed(&self) -> Duration {
        self.shared.started_at.elapsed()
    }

    pub fn bytes_received(&self) -> u64 {
        self.shared.bytes_received.load(Ordering::Relaxed)
    }

    pub fn heartbeats(&self) -> u64 {
        self.shared.heartbeats.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("id", &self.shared.id)
            .field("terminal", &self.is_terminal())
            .finish()
    }
}

/// Everything the read loop owns
struct SessionTask {
    shared: Arc<SessionShared>,
    transport: Arc<dyn Transport>,
    request: ChatStreamRequest,
    idle_timeout: Duration,
    heartbeat_interval: Duration,
    max_buffer_bytes: usize,
}

impl SessionTask {
    async fn run(self) {
        let heartbeat_stop = self.shared.cancel.child_token();
        let heartbeat = spawn_heartbeat(
            self.shared.clone(),
            self.heartbeat_interval,
            heartbeat_stop.clone(),
        );
        // Stops the heartbeat on every exit path
        let heartbeat_guard = heartbeat_stop.drop_guard();

        let mut decoder = FrameDecoder::new(
            self.shared.id.to_string(),
            self.request
                .model_type
                .clone()
                .unwrap_or_else(|| DEFAULT_MODEL_TYPE.to_string()),
        );

        if let Err(e) = self.read_loop(&mut decoder).await {
            warn!(session_id = %self.shared.id, error = %e, "Session failed");
            self.shared.deliver(StreamEvent::Error {
                message: e.to_string(),
            });
        }

        self.shared.metrics.record_frames(
            decoder.decoded_count(),
            decoder.degraded_count(),
            decoder.skipped_count(),
        );
        drop(heartbeat_guard);
        if let Err(e) = heartbeat.await {
            debug!(error = %e, "Heartbeat task ended abnormally");
        }

        debug!(
            session_id = %self.shared.id,
            elapsed_ms = self.shared.started_at.elapsed().as_millis() as u64,
            bytes = self.shared.bytes_received.load(Ordering::Relaxed),
            "Session loop exited"
        );
    }

    async fn read_loop(&self, decoder: &mut FrameDecoder) -> Result<()> {
        let cancel = &self.shared.cancel;

        let open = tokio::time::timeout(
            self.idle_timeout,
            self.transport.open(&self.request, cancel.clone()),
        );
        let mut chunks = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(()),
            opened = open => match opened {
                Ok(opened) => opened?,
                Err(_) => {
                    return Err(StreamError::Transport(format!(
                        "No response received within {}s",
                        self.idle_timeout.as_secs()
                    )));
                }
            },
        };

        let mut buffer = FrameBuffer::with_limit(self.max_buffer_bytes);
        let mut classifier = PhaseClassifier::new(DetectionStrategy::from_markers_flag(
            self.request.enable_thinking_markers,
        ));

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                next = tokio::time::timeout(self.idle_timeout, chunks.next()) => next,
            };

            let chunk = match next {
                Err(_) => {
                    return Err(StreamError::Transport(format!(
                        "No data received for {}s",
                        self.idle_timeout.as_secs()
                    )));
                }
                Ok(Some(chunk)) => chunk?,
                Ok(None) => {
                    if cancel.is_cancelled() {
                        break;
                    }
                    debug!(session_id = %self.shared.id, "Stream closed by peer");
                    if let Some(frame) = buffer.finish() {
                        self.handle_frame(&frame, decoder, &mut classifier);
                    }
                    for event in classifier.finish() {
                        self.shared.deliver(event.into());
                    }
                    return Ok(());
                }
            };

            self.shared
                .bytes_received
                .fetch_add(chunk.len() as u64, Ordering::Relaxed);
            self.shared.metrics.record_bytes(chunk.len());

            for frame in buffer.feed(&chunk) {
                if !self.handle_frame(&frame, decoder, &mut classifier) {
                    break;
                }
            }

            if classifier.state().is_terminal() || self.shared.is_terminal() {
                break;
            }
            buffer.check_overflow()?;
        }

        buffer.reset();
        Ok(())
    }

    /// Decode, classify and deliver one frame; false once nothing more may be delivered
    fn handle_frame(
        &self,
        frame: &Frame,
        decoder: &mut FrameDecoder,
        classifier: &mut PhaseClassifier,
    ) -> bool {
        let Some(message) = decoder.decode(frame) else {
            return true;
        };

        for event in classifier.process(message) {
            if !self.shared.deliver(event.into()) {
                return false;
            }
        }
        !classifier.state().is_terminal()
    }
}

/// Informational ticker; never touches the stream
fn spawn_heartbeat(
    shared: Arc<SessionShared>,
    period: Duration,
    stop: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        loop {
            tokio::select! {
                _ = stop.cancelled() => break,
                _ = ticker.tick() => {
                    shared.heartbeats.fetch_add(1, Ordering::Relaxed);
                    shared.metrics.record_heartbeat();
                    debug!(
                        session_id = %shared.id,
                        elapsed_ms = shared.started_at.elapsed().as_millis() as u64,
                        bytes = shared.bytes_received.load(Ordering::Relaxed),
                        "Stream heartbeat"
                    );
                }
            }
        }
    })
}
