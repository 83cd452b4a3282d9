use super::{ContentError, RateLimiter};
use crate::pipeline::{BulkFetcher, Extractor, UrlResult};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Bulk fetcher fanning URLs out over an [`Extractor`].
///
/// At most `concurrency` extractions run at once and request starts are
/// spaced by the shared [`RateLimiter`]. Results come back in input order.
pub struct ParallelScraper {
    extractor: Arc<dyn Extractor>,
    concurrency: usize,
    limiter: RateLimiter,
}

impl ParallelScraper {
    /// A `concurrency` of 0 is treated as 1.
    pub fn new(extractor: Arc<dyn Extractor>, concurrency: usize, rate_limit: Duration) -> Self {
        Self {
            extractor,
            concurrency: concurrency.max(1),
            limiter: RateLimiter::new(rate_limit),
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    async fn scrape_one(&self, cancel: &CancellationToken, url: &str) -> UrlResult {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return UrlResult::failure(url, ContentError::Cancelled),
            _ = self.limiter.acquire() => {}
        }

        match self.extractor.fetch_and_extract_text(cancel, url).await {
            Ok(extraction) if extraction.body_found => UrlResult::success(url, extraction.text),
            Ok(_) => UrlResult::failure(url, ContentError::NoBody),
            Err(e) => UrlResult::failure(url, e),
        }
    }
}

#[async_trait]
impl BulkFetcher for ParallelScraper {
    async fn scrape_in_parallel(
        &self,
        cancel: &CancellationToken,
        urls: &[String],
    ) -> Vec<UrlResult> {
        if urls.is_empty() {
            return Vec::new();
        }

        let total = urls.len();
        let completed = AtomicUsize::new(0);

        tracing::info!(
            total = total,
            concurrency = self.concurrency,
            rate_limit_ms = self.limiter.interval().as_millis() as u64,
            "Scraping URLs in parallel"
        );

        let completed = &completed;
        let results: Vec<UrlResult> = stream::iter(urls.to_vec())
            .map(|url: String| async move {
                let result = self.scrape_one(cancel, &url).await;

                let done = completed.fetch_add(1, Ordering::Relaxed).saturating_add(1);
                match &result.error {
                    None => tracing::debug!(url = %url, done = done, total = total, "Extracted"),
                    Some(e) => tracing::debug!(
                        url = %url,
                        error = %e,
                        done = done,
                        total = total,
                        "Extraction failed"
                    ),
                }

                result
            })
            .buffered(self.concurrency) // preserves input order
            .collect()
            .await;

        results
    }
}
