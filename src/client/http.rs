use futures::{StreamExt, stream};
use reqwest::Client;
use reqwest::header::{ACCEPT, CACHE_CONTROL, HeaderMap, HeaderName, HeaderValue};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::ClientConfig;
use crate::error::{Result, StreamError};
use crate::models::ChatStreamRequest;
use crate::transport::{ChunkStream, OpenFuture, Transport, until_cancelled};

/// Streams chat responses over HTTP with reqwest
pub struct HttpTransport {
    client: Client,
    url: String,
    headers: HeaderMap,
}

impl HttpTransport {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        // No overall request timeout: streams are long-lived, idle time is
        // bounded per read by the session instead.
        let client = Client::builder()
            .connect_timeout(config.connect_timeout())
            .build()
            .map_err(|e| StreamError::ConfigError(format!("Failed to create HTTP client: {}", e)))?;

        let mut headers = HeaderMap::new();
        for (name, value) in &config.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| StreamError::ConfigError(format!("Invalid header {}: {}", name, e)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| StreamError::ConfigError(format!("Invalid header value: {}", e)))?;
            headers.insert(name, value);
        }

        Ok(Self {
            client,
            url: config.stream_url(),
            headers,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Transport for HttpTransport {
    fn open(&self, request: &ChatStreamRequest, cancel: CancellationToken) -> OpenFuture {
        let client = self.client.clone();
        let url = self.url.clone();
        let headers = self.headers.clone();
        let request = request.clone();

        Box::pin(async move {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!("Stream open cancelled before the response arrived");
                    let empty: ChunkStream = Box::pin(stream::empty());
                    Ok(empty)
                }
                opened = Self::open_impl(client, url, headers, request, cancel.clone()) => opened,
            }
        })
    }

    fn name(&self) -> &str {
        "HTTP"
    }
}

impl HttpTransport {
    async fn open_impl(
        client: Client,
        url: String,
        headers: HeaderMap,
        request: ChatStreamRequest,
        cancel: CancellationToken,
    ) -> Result<ChunkStream> {
        info!(
            url = %url,
            model = request.model_type.as_deref().unwrap_or("default"),
            markers = request.enable_thinking_markers,
            "Opening chat stream"
        );

        let response = client
            .post(&url)
            .headers(headers)
            .header(ACCEPT, "text/event-stream")
            .header(CACHE_CONTROL, "no-cache")
            .json(&request)
            .send()
            .await
            .map_err(|e| StreamError::Transport(format!("Stream request failed: {}", e)))?;

        let status = response.status();
        info!("Chat backend responded with status: {}", status);

        if !status.is_success() {
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(StreamError::Transport(format!(
                "Chat backend error {}: {}",
                status, error_body
            )));
        }

        let chunks = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| StreamError::Transport(format!("Stream read failed: {}", e))));

        Ok(until_cancelled(chunks, cancel))
    }
}
