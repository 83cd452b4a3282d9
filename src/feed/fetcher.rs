use crate::feed::parser::{parse_feed, Feed};
use crate::pipeline::FeedSource;
use async_trait::async_trait;
use futures::StreamExt;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

const MAX_FEED_SIZE: usize = 10 * 1024 * 1024; // 10MB

/// Errors that can occur while fetching and parsing a feed.
#[derive(Debug, Error)]
pub enum FeedError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Request exceeded the client timeout
    #[error("Request timed out")]
    Timeout,
    /// Feed could not be parsed as RSS, Atom or JSON Feed
    #[error("Parse error: {0}")]
    Parse(String),
    /// Server returned 429 Too Many Requests after max retries
    #[error("Rate limited after {0} retries")]
    RateLimited(u32),
    /// Response body exceeded the 10MB size limit
    #[error("Response too large")]
    ResponseTooLarge,
    /// Response was incomplete (received fewer bytes than Content-Length)
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
    /// The run was cancelled or hit its overall deadline
    #[error("Feed fetch cancelled")]
    Cancelled,
}

/// Fetches feeds over HTTP.
///
/// 429 and 5xx responses, plus truncated bodies, are retried with
/// exponential backoff (1s, 2s, 4s, ...) up to `max_retries` times.
/// Other 4xx responses fail immediately.
#[derive(Clone)]
pub struct HttpFeedSource {
    client: reqwest::Client,
    timeout: Duration,
    max_retries: u32,
}

impl HttpFeedSource {
    pub fn new(client: reqwest::Client, timeout: Duration, max_retries: u32) -> Self {
        Self {
            client,
            timeout,
            max_retries,
        }
    }

    async fn fetch_bytes(&self, feed_url: &str) -> Result<Vec<u8>, FeedError> {
        let mut retry_count = 0;

        loop {
            let response = tokio::time::timeout(self.timeout, self.client.get(feed_url).send())
                .await
                .map_err(|_| FeedError::Timeout)?
                .map_err(FeedError::Network)?;

            let status = response.status();

            if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                if retry_count >= self.max_retries {
                    return Err(if status.is_server_error() {
                        FeedError::HttpStatus(status.as_u16())
                    } else {
                        FeedError::RateLimited(self.max_retries)
                    });
                }

                let delay_secs = 2u64.pow(retry_count);
                tracing::warn!(
                    feed = %feed_url,
                    status = %status,
                    retry = retry_count,
                    delay_secs = delay_secs,
                    "Feed request failed, backing off"
                );

                tokio::time::sleep(Duration::from_secs(delay_secs)).await;
                retry_count += 1;
                continue;
            }

            if !status.is_success() {
                return Err(FeedError::HttpStatus(status.as_u16()));
            }

            match read_limited_bytes(response, MAX_FEED_SIZE).await {
                Ok(bytes) => return Ok(bytes),
                Err(FeedError::IncompleteResponse { expected, received })
                    if retry_count < self.max_retries =>
                {
                    let delay_secs = 2u64.pow(retry_count);
                    tracing::debug!(
                        feed = %feed_url,
                        expected = expected,
                        received = received,
                        attempt = retry_count + 1,
                        delay_secs = delay_secs,
                        "Retrying incomplete download"
                    );

                    tokio::time::sleep(Duration::from_secs(delay_secs)).await;
                    retry_count += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl FeedSource for HttpFeedSource {
    async fn fetch_and_parse(
        &self,
        cancel: &CancellationToken,
        feed_url: &str,
    ) -> Result<Feed, FeedError> {
        let bytes = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(FeedError::Cancelled),
            bytes = self.fetch_bytes(feed_url) => bytes?,
        };

        let feed = parse_feed(&bytes).map_err(|e| FeedError::Parse(e.to_string()))?;

        tracing::debug!(
            feed = %feed_url,
            title = %feed.title,
            items = feed.items.len(),
            "Parsed feed"
        );

        Ok(feed)
    }
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FeedError> {
    let expected_length = response.content_length();

    if let Some(len) = expected_length {
        if len as usize > limit {
            return Err(FeedError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(FeedError::Network)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FeedError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    if let Some(expected) = expected_length {
        if (bytes.len() as u64) < expected {
            return Err(FeedError::IncompleteResponse {
                expected,
                received: bytes.len(),
            });
        }
    }

    Ok(bytes)
}
