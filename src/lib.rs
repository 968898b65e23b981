//! # Answer Stream
//!
//! Client-side consumer for an assistant's streamed answer.
//!
//! ## Overview
//!
//! A chat backend answers with a long-lived chunked response made of
//! blank-line delimited frames. This library:
//! - Reassembles frames from arbitrarily fragmented network chunks
//! - Decodes frame payloads, degrading malformed ones to plain text
//! - Splits content into a "thinking" and an "answer" phase, using sentinel
//!   markers or, for legacy backends, boilerplate phrases
//! - Delivers ordered, session-tagged events with exactly one terminal event
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use answer_stream::{ChannelSink, ChatStreamRequest, ClientConfig, StreamClient};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let client = StreamClient::with_http(ClientConfig::from_env()?)?;
//! let (sink, mut events) = ChannelSink::new();
//!
//! let session = client.start(ChatStreamRequest::new("Why is the sky blue?"), sink)?;
//! while let Some(event) = events.recv().await {
//!     println!("{:?}", event.event);
//!     if event.event.is_terminal() {
//!         break;
//!     }
//! }
//! session.close();
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`config`] - Configuration loading and validation
//! - [`error`] - Error types and handling
//! - [`models`] - Request and wire message types
//! - [`transport`] / [`client`] - Streaming HTTP transport
//! - [`streaming`] - Frame buffer, decoder and phase classifier
//! - [`session`] - Session lifecycle, cancellation and heartbeat
//! - [`view`] - Folding events into render state

pub mod client;
pub mod config;
pub mod error;
pub mod event;
pub mod metrics;
pub mod models;
pub mod registry;
pub mod session;
pub mod streaming;
pub mod transport;
pub mod view;

pub use config::ClientConfig;
pub use error::{Result, StreamError};
pub use event::{ChannelSink, EventSink, SessionEvent, StreamEvent};
pub use models::{ChatStreamRequest, DecodedMessage, SessionId};
pub use session::{SessionHandle, StreamClient};
pub use transport::Transport;
pub use view::ResponseView;
