use super::retry::{cooldown, retry_failed};
use super::{classify, BulkFetcher, Classified, Extractor, UrlResult};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Phase name attached to content extraction log events.
pub const PHASE_CONTENT: &str = "ContentExtraction";

/// Pauses applied between the bulk and retry phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Unconditional pause after the bulk phase completes.
    pub initial_delay: Duration,
    /// Pause before the first sequential retry.
    pub retry_delay: Duration,
}

/// A [`BulkFetcher`] that salvages bulk failures with a slower second pass.
///
/// The bulk phase is delegated wholesale to the wrapped fetcher. Failed URLs
/// are then re-attempted one by one through the single-item [`Extractor`].
/// Holds no state between calls.
pub struct ReliableScraper {
    bulk: Arc<dyn BulkFetcher>,
    extractor: Arc<dyn Extractor>,
    policy: RetryPolicy,
}

impl ReliableScraper {
    pub fn new(
        bulk: Arc<dyn BulkFetcher>,
        extractor: Arc<dyn Extractor>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            bulk,
            extractor,
            policy,
        }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }
}

#[async_trait]
impl BulkFetcher for ReliableScraper {
    /// Scrapes `urls` in bulk, then retries failures sequentially.
    ///
    /// Returns success-only results: bulk successes in input order followed
    /// by retry successes in attempt order. Returns an empty list when
    /// nothing usable survived either phase. Repeated URLs are scraped once,
    /// at their first position.
    async fn scrape_in_parallel(
        &self,
        cancel: &CancellationToken,
        urls: &[String],
    ) -> Vec<UrlResult> {
        let unique = dedup_urls(urls);
        if unique.len() < urls.len() {
            tracing::debug!(
                phase = PHASE_CONTENT,
                dropped = urls.len() - unique.len(),
                "Dropped repeated URLs"
            );
        }
        let urls = unique.as_slice();

        tracing::info!(
            phase = PHASE_CONTENT,
            total = urls.len(),
            "Phase 1: extracting content in parallel"
        );

        let results = self.bulk.scrape_in_parallel(cancel, urls).await;

        tracing::info!(
            phase = PHASE_CONTENT,
            delay_ms = self.policy.initial_delay.as_millis() as u64,
            "Parallel extraction finished, cooling down before next step"
        );
        if !cooldown(cancel, self.policy.initial_delay).await {
            tracing::warn!(phase = PHASE_CONTENT, "Run cancelled during cooldown");
        }

        let Classified {
            mut successful,
            failed_urls,
        } = classify(results);
        let initial_successful = successful.len();

        if !failed_urls.is_empty() {
            let retried = retry_failed(
                self.extractor.as_ref(),
                cancel,
                &failed_urls,
                self.policy.retry_delay,
            )
            .await;
            successful.extend(retried);
        }

        if successful.is_empty() {
            tracing::error!(
                phase = PHASE_CONTENT,
                total = urls.len(),
                "No usable web content could be extracted, check the URLs"
            );
            return Vec::new();
        }

        tracing::info!(
            phase = PHASE_CONTENT,
            successful = successful.len(),
            total = urls.len(),
            initial_successful = initial_successful,
            retry_successful = successful.len() - initial_successful,
            "Content extraction results"
        );

        successful
    }
}

fn dedup_urls(urls: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    urls.iter()
        .filter(|url| seen.insert(url.as_str()))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::ContentError;
    use crate::pipeline::Extraction;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use std::sync::Mutex;

    enum BulkOutcome {
        Content(&'static str),
        Error,
    }

    struct FixedBulk {
        outcomes: HashMap<&'static str, BulkOutcome>,
    }

    #[async_trait]
    impl BulkFetcher for FixedBulk {
        async fn scrape_in_parallel(
            &self,
            _cancel: &CancellationToken,
            urls: &[String],
        ) -> Vec<UrlResult> {
            urls.iter()
                .map(|url| match self.outcomes.get(url.as_str()) {
                    Some(BulkOutcome::Content(text)) => UrlResult::success(url.as_str(), *text),
                    _ => UrlResult::failure(url.as_str(), ContentError::HttpStatus(503)),
                })
                .collect()
        }
    }

    #[derive(Default)]
    struct RecordingExtractor {
        bodies: HashMap<&'static str, &'static str>,
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Extractor for RecordingExtractor {
        async fn fetch_and_extract_text(
            &self,
            _cancel: &CancellationToken,
            url: &str,
        ) -> Result<Extraction, ContentError> {
            self.calls.lock().unwrap().push(url.to_string());
            match self.bodies.get(url) {
                Some(text) => Ok(Extraction {
                    text: text.to_string(),
                    body_found: !text.is_empty(),
                }),
                None => Err(ContentError::Timeout),
            }
        }
    }

    fn policy() -> RetryPolicy {
        RetryPolicy {
            initial_delay: Duration::from_secs(5),
            retry_delay: Duration::from_secs(3),
        }
    }

    fn urls(list: &[&str]) -> Vec<String> {
        list.iter().map(|u| u.to_string()).collect()
    }

    fn result_urls(results: &[UrlResult]) -> Vec<&str> {
        results.iter().map(|r| r.url.as_str()).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_bulk_successes_skip_retry() {
        let bulk = FixedBulk {
            outcomes: HashMap::from([
                ("A", BulkOutcome::Content("a")),
                ("B", BulkOutcome::Content("b")),
            ]),
        };
        let extractor = Arc::new(RecordingExtractor::default());
        let scraper = ReliableScraper::new(Arc::new(bulk), extractor.clone(), policy());

        let results = scraper
            .scrape_in_parallel(&CancellationToken::new(), &urls(&["A", "B"]))
            .await;

        assert_eq!(result_urls(&results), vec!["A", "B"]);
        assert!(extractor.calls.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_bulk_order_then_retry_order() {
        let bulk = FixedBulk {
            outcomes: HashMap::from([
                ("A", BulkOutcome::Content("a")),
                ("B", BulkOutcome::Error),
                ("C", BulkOutcome::Content("c")),
            ]),
        };
        let extractor = Arc::new(RecordingExtractor {
            bodies: HashMap::from([("B", "b on retry")]),
            ..Default::default()
        });
        let scraper = ReliableScraper::new(Arc::new(bulk), extractor.clone(), policy());

        let results = scraper
            .scrape_in_parallel(&CancellationToken::new(), &urls(&["A", "B", "C"]))
            .await;

        assert_eq!(result_urls(&results), vec!["A", "C", "B"]);
        assert!(results.iter().all(|r| r.error.is_none()));
        assert_eq!(results[2].content, "b on retry");
        assert_eq!(*extractor.calls.lock().unwrap(), vec!["B".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_phase_failing_yields_empty_list() {
        let bulk = FixedBulk {
            outcomes: HashMap::from([("X", BulkOutcome::Content(""))]),
        };
        let extractor = Arc::new(RecordingExtractor {
            bodies: HashMap::from([("X", "")]),
            ..Default::default()
        });
        let scraper = ReliableScraper::new(Arc::new(bulk), extractor.clone(), policy());

        let results = scraper
            .scrape_in_parallel(&CancellationToken::new(), &urls(&["X"]))
            .await;

        assert!(results.is_empty());
        assert_eq!(extractor.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delays_applied_between_phases() {
        let bulk = FixedBulk {
            outcomes: HashMap::from([("A", BulkOutcome::Error)]),
        };
        let extractor = Arc::new(RecordingExtractor {
            bodies: HashMap::from([("A", "a")]),
            ..Default::default()
        });
        let scraper = ReliableScraper::new(Arc::new(bulk), extractor, policy());
        let start = tokio::time::Instant::now();

        scraper
            .scrape_in_parallel(&CancellationToken::new(), &urls(&["A"]))
            .await;

        assert!(start.elapsed() >= Duration::from_secs(8));
    }

    #[tokio::test(start_paused = true)]
    async fn test_initial_delay_applies_without_failures() {
        let bulk = FixedBulk {
            outcomes: HashMap::from([("A", BulkOutcome::Content("a"))]),
        };
        let scraper = ReliableScraper::new(
            Arc::new(bulk),
            Arc::new(RecordingExtractor::default()),
            policy(),
        );
        let start = tokio::time::Instant::now();

        scraper
            .scrape_in_parallel(&CancellationToken::new(), &urls(&["A"]))
            .await;

        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(5));
        assert!(elapsed < Duration::from_secs(8));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_run_returns_bulk_successes_only() {
        let bulk = FixedBulk {
            outcomes: HashMap::from([("A", BulkOutcome::Content("a")), ("B", BulkOutcome::Error)]),
        };
        let extractor = Arc::new(RecordingExtractor {
            bodies: HashMap::from([("B", "b")]),
            ..Default::default()
        });
        let scraper = ReliableScraper::new(Arc::new(bulk), extractor.clone(), policy());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let results = scraper.scrape_in_parallel(&cancel, &urls(&["A", "B"])).await;

        assert_eq!(result_urls(&results), vec!["A"]);
        assert!(extractor.calls.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_salvages_subset_when_bulk_fails_everything() {
        let bulk = FixedBulk {
            outcomes: HashMap::from([
                ("C", BulkOutcome::Error),
                ("B", BulkOutcome::Error),
                ("A", BulkOutcome::Error),
            ]),
        };
        let extractor = Arc::new(RecordingExtractor {
            bodies: HashMap::from([("C", "c on retry"), ("A", "a on retry")]),
            ..Default::default()
        });
        let scraper = ReliableScraper::new(Arc::new(bulk), extractor.clone(), policy());

        let results = scraper
            .scrape_in_parallel(&CancellationToken::new(), &urls(&["C", "B", "A"]))
            .await;

        assert_eq!(result_urls(&results), vec!["C", "A"]);
        assert_eq!(
            *extractor.calls.lock().unwrap(),
            vec!["C".to_string(), "B".to_string(), "A".to_string()]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_urls_scraped_once() {
        let bulk = FixedBulk {
            outcomes: HashMap::from([("A", BulkOutcome::Content("a")), ("B", BulkOutcome::Error)]),
        };
        let extractor = Arc::new(RecordingExtractor {
            bodies: HashMap::from([("B", "b")]),
            ..Default::default()
        });
        let scraper = ReliableScraper::new(Arc::new(bulk), extractor.clone(), policy());

        let results = scraper
            .scrape_in_parallel(&CancellationToken::new(), &urls(&["A", "B", "A", "B"]))
            .await;

        assert_eq!(result_urls(&results), vec!["A", "B"]);
        assert_eq!(*extractor.calls.lock().unwrap(), vec!["B".to_string()]);
    }
}
