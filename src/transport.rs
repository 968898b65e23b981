use bytes::Bytes;
use futures::{Stream, StreamExt};
use std::future::Future;
use std::pin::Pin;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::models::ChatStreamRequest;

/// Raw chunks of a streamed response, in arrival order
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Type alias for the future returned by `Transport::open`
pub type OpenFuture = Pin<Box<dyn Future<Output = Result<ChunkStream>> + Send>>;

/// Opens a streamed response for a chat request
///
/// Reading the returned stream yields the next chunk, ends when the peer
/// closes the connection, and ends early (without an error) once `cancel`
/// fires. Connection failures surface as `StreamError::Transport`.
pub trait Transport: Send + Sync {
    fn open(&self, request: &ChatStreamRequest, cancel: CancellationToken) -> OpenFuture;

    /// Get the transport name for logging
    fn name(&self) -> &str;
}

/// Make a chunk stream end as soon as `cancel` fires
pub fn until_cancelled<S>(stream: S, cancel: CancellationToken) -> ChunkStream
where
    S: Stream<Item = Result<Bytes>> + Send + 'static,
{
    Box::pin(stream.take_until(cancel.cancelled_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    #[tokio::test]
    async fn test_until_cancelled_ends_pending_stream() {
        let cancel = CancellationToken::new();
        let chunks = stream::iter(vec![Ok(Bytes::from_static(b"data: a\n\n"))])
            .chain(stream::pending());
        let mut chunks = until_cancelled(chunks, cancel.clone());

        assert!(chunks.next().await.is_some());
        cancel.cancel();
        assert!(chunks.next().await.is_none());
    }
}
