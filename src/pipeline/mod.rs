//! Two-phase reliable fetch pipeline.
//!
//! The pipeline turns a feed URL into extracted article text:
//!
//! - **Bulk phase**: every URL is handed to a [`BulkFetcher`] at once
//! - **Classification**: [`classify`] splits bulk output into usable results and failed URLs
//! - **Retry phase**: failed URLs are re-attempted one at a time through an [`Extractor`]
//!   after a cooldown
//! - **Workflow**: [`Runner`] fetches the feed, derives the URL list and packages the
//!   merged results with feed metadata
//!
//! Collaborators are injected as `Arc<dyn Trait>` so tests can swap in mocks.
//! Every call takes a [`CancellationToken`] standing in for the run's deadline.

mod classify;
mod reliable;
mod retry;
mod runner;

pub use classify::{classify, Classified};
pub use reliable::{ReliableScraper, RetryPolicy, PHASE_CONTENT};
pub use retry::retry_failed;
pub use runner::{Runner, RunnerConfig, RunnerError, RunnerResult};

use crate::content::ContentError;
use crate::feed::{Feed, FeedError};
use async_trait::async_trait;
use serde::{Serialize, Serializer};
use tokio_util::sync::CancellationToken;

/// Outcome of fetching and extracting a single URL.
///
/// Produced once per input URL by either the bulk phase or the retry phase.
#[derive(Debug, Serialize)]
pub struct UrlResult {
    pub url: String,
    pub content: String,
    #[serde(serialize_with = "serialize_error")]
    pub error: Option<ContentError>,
}

impl UrlResult {
    pub fn success(url: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            content: content.into(),
            error: None,
        }
    }

    pub fn failure(url: impl Into<String>, error: ContentError) -> Self {
        Self {
            url: url.into(),
            content: String::new(),
            error: Some(error),
        }
    }

    /// A result is usable only when it carries no error and non-empty content.
    pub fn is_usable(&self) -> bool {
        self.error.is_none() && !self.content.is_empty()
    }
}

fn serialize_error<S: Serializer>(
    error: &Option<ContentError>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match error {
        Some(e) => serializer.serialize_some(&e.to_string()),
        None => serializer.serialize_none(),
    }
}

/// Text pulled out of a single page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    pub text: String,
    /// False when only metadata (title, source line) was located, not a main body.
    pub body_found: bool,
}

/// Fetches a feed document and parses it.
#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch_and_parse(
        &self,
        cancel: &CancellationToken,
        feed_url: &str,
    ) -> Result<Feed, FeedError>;
}

/// Fetches one URL and extracts its main text.
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn fetch_and_extract_text(
        &self,
        cancel: &CancellationToken,
        url: &str,
    ) -> Result<Extraction, ContentError>;
}

/// Fetches many URLs concurrently.
///
/// Implementations must return exactly one result per input URL, in input order.
#[async_trait]
pub trait BulkFetcher: Send + Sync {
    async fn scrape_in_parallel(&self, cancel: &CancellationToken, urls: &[String])
        -> Vec<UrlResult>;
}
