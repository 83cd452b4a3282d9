use super::{BulkFetcher, FeedSource, UrlResult};
use crate::feed::FeedError;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Errors that end a run before any scraping happens.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("Feed processing failed for {feed_url}: {source}")]
    Feed {
        feed_url: String,
        #[source]
        source: FeedError,
    },
    #[error("No URLs to process were extracted from feed {feed_url}")]
    NoUrls { feed_url: String },
}

/// Per-invocation settings for [`Runner::scrape_and_run`].
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub feed_url: String,
    pub client_timeout: Duration,
    /// The whole run is bounded by `client_timeout * overall_timeout_multiplier`.
    /// Values below 1 are treated as 1.
    pub overall_timeout_multiplier: u32,
}

impl RunnerConfig {
    pub fn overall_timeout(&self) -> Duration {
        self.client_timeout
            .saturating_mul(self.overall_timeout_multiplier.max(1))
    }
}

/// Output of a completed run.
#[derive(Debug, Serialize)]
pub struct RunnerResult {
    pub feed_title: String,
    /// Usable results only: bulk successes, then retry successes.
    pub results: Vec<UrlResult>,
    /// Article URL -> article title, for every feed item that had both.
    pub titles_map: HashMap<String, String>,
    /// URLs from the feed that survived neither phase, in feed order.
    pub failed_urls: Vec<String>,
}

/// Drives a run: fetch feed, derive URLs, scrape, package.
pub struct Runner {
    feed_source: Arc<dyn FeedSource>,
    executor: Arc<dyn BulkFetcher>,
}

impl Runner {
    pub fn new(feed_source: Arc<dyn FeedSource>, executor: Arc<dyn BulkFetcher>) -> Self {
        Self {
            feed_source,
            executor,
        }
    }

    /// Runs the workflow under a deadline derived from `config`.
    ///
    /// Feed failures and empty feeds are fatal. Once scraping starts the run
    /// always completes: whatever the executor returns, even nothing, is the
    /// answer.
    ///
    /// # Errors
    ///
    /// - [`RunnerError::Feed`] if the feed could not be fetched or parsed
    /// - [`RunnerError::NoUrls`] if the feed yielded no article URLs
    pub async fn scrape_and_run(
        &self,
        cancel: &CancellationToken,
        config: &RunnerConfig,
    ) -> Result<RunnerResult, RunnerError> {
        let overall_timeout = config.overall_timeout();

        let run_cancel = cancel.child_token();
        // Cancelling on exit also stops the deadline task below.
        let _run_guard = run_cancel.clone().drop_guard();
        spawn_deadline(run_cancel.clone(), overall_timeout);

        tracing::info!(
            feed_url = %config.feed_url,
            overall_timeout_secs = overall_timeout.as_secs_f64(),
            "Parsing feed"
        );

        let feed = match self
            .feed_source
            .fetch_and_parse(&run_cancel, &config.feed_url)
            .await
        {
            Ok(feed) => feed,
            Err(source) => {
                tracing::error!(
                    feed_url = %config.feed_url,
                    error = %source,
                    "Feed processing failed"
                );
                return Err(RunnerError::Feed {
                    feed_url: config.feed_url.clone(),
                    source,
                });
            }
        };

        let urls = feed.links();
        let titles_map = feed.titles_map();

        tracing::info!(extracted_count = urls.len(), "Extracted URLs from feed");

        if urls.is_empty() {
            return Err(RunnerError::NoUrls {
                feed_url: config.feed_url.clone(),
            });
        }

        tracing::info!(total_urls = urls.len(), "Running parallel scrape");

        let results: Vec<UrlResult> = self
            .executor
            .scrape_in_parallel(&run_cancel, &urls)
            .await
            .into_iter()
            .filter(UrlResult::is_usable)
            .collect();
        let failed_urls = missing_urls(&urls, &results);

        if !failed_urls.is_empty() {
            tracing::warn!(
                failed = failed_urls.len(),
                total = urls.len(),
                "Some URLs produced no usable content"
            );
        }

        Ok(RunnerResult {
            feed_title: feed.title,
            results,
            titles_map,
            failed_urls,
        })
    }
}

fn spawn_deadline(run_cancel: CancellationToken, overall_timeout: Duration) {
    tokio::spawn(async move {
        tokio::select! {
            _ = run_cancel.cancelled() => {}
            _ = tokio::time::sleep(overall_timeout) => {
                tracing::warn!(
                    overall_timeout_secs = overall_timeout.as_secs_f64(),
                    "Overall timeout reached, cancelling run"
                );
                run_cancel.cancel();
            }
        }
    });
}

fn missing_urls(urls: &[String], results: &[UrlResult]) -> Vec<String> {
    let present: HashSet<&str> = results
        .iter()
        .filter(|r| r.is_usable())
        .map(|r| r.url.as_str())
        .collect();

    urls.iter()
        .filter(|url| !present.contains(url.as_str()))
        .cloned()
        .collect()
}
