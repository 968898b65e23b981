pub mod message;
pub mod request;

pub use message::{DecodedMessage, WireMessage};
pub use request::ChatStreamRequest;

/// Identifier attached to every event a session delivers
pub type SessionId = uuid::Uuid;
