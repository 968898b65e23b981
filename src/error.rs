use thiserror::Error;

#[derive(Error, Debug)]
pub enum StreamError {
    /// Connection refused or reset, non-success status, or a stalled stream
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Frame buffer overflow: {buffered} bytes buffered without a frame boundary (limit {limit})")]
    BufferOverflow { buffered: usize, limit: usize },

    #[error("Invalid stream request: {0}")]
    InvalidRequest(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

pub type Result<T> = std::result::Result<T, StreamError>;
