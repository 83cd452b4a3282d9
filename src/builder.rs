//! Wires concrete collaborators into the pipeline.
//!
//! One HTTP client is shared by the feed source and the extractor. The same
//! extractor instance backs both the bulk fan-out and the sequential retry.
use crate::config::Config;
use crate::content::{ContentError, JinaExtractor, ParallelScraper};
use crate::feed::HttpFeedSource;
use crate::pipeline::{BulkFetcher, Extractor, FeedSource, ReliableScraper, Runner};
use reqwest::redirect::Policy;
use secrecy::SecretString;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

const MAX_REDIRECTS: usize = 3;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
    #[error("Invalid extractor settings: {0}")]
    Extractor(#[from] ContentError),
}

fn redirect_policy() -> Policy {
    Policy::custom(|attempt| {
        if attempt.previous().len() >= MAX_REDIRECTS {
            return attempt.error("Too many redirects (max 3)");
        }

        let url = attempt.url();
        if attempt.previous().iter().any(|prev| prev.as_str() == url.as_str()) {
            return attempt.error("Redirect loop detected");
        }

        tracing::debug!(
            to = %url,
            hop = attempt.previous().len() + 1,
            "Following redirect"
        );

        attempt.follow()
    })
}

/// HTTP client shared by every collaborator of a run.
pub fn http_client(timeout: Duration) -> Result<reqwest::Client, BuildError> {
    let client = reqwest::Client::builder()
        .redirect(redirect_policy())
        .pool_max_idle_per_host(4)
        .pool_idle_timeout(Duration::from_secs(30))
        .tcp_keepalive(Duration::from_secs(60))
        .timeout(timeout)
        .build()?;
    Ok(client)
}

/// Picks the reader API key: the env value wins over the config file.
/// Blank values count as unset.
fn pick_api_key(env_key: Option<String>, config_key: Option<&str>) -> Option<SecretString> {
    env_key
        .filter(|k| !k.trim().is_empty())
        .or_else(|| {
            config_key
                .filter(|k| !k.trim().is_empty())
                .map(str::to_string)
        })
        .map(SecretString::from)
}

/// Single-item extractor configured from `config`.
///
/// # Errors
///
/// [`ContentError::InsecureBaseUrl`] if `jina_base_url` is plain HTTP and
/// not localhost.
pub fn build_extractor(
    client: reqwest::Client,
    config: &Config,
) -> Result<JinaExtractor, ContentError> {
    let api_key = pick_api_key(
        std::env::var("JINA_API_KEY").ok(),
        config.jina_api_key.as_deref(),
    );

    let mut extractor = JinaExtractor::new(client, config.client_timeout(), config.max_retries)
        .with_api_key(api_key);

    if let Some(base_url) = &config.jina_base_url {
        extractor = extractor.with_base_url(base_url)?;
    }

    Ok(extractor)
}

/// Bulk fan-out wrapped with the cooldown-and-retry second pass.
pub fn build_reliable_scraper(
    client: reqwest::Client,
    config: &Config,
) -> Result<ReliableScraper, ContentError> {
    let extractor: Arc<dyn Extractor> = Arc::new(build_extractor(client, config)?);
    let bulk: Arc<dyn BulkFetcher> = Arc::new(ParallelScraper::new(
        extractor.clone(),
        config.concurrency,
        config.rate_limit(),
    ));

    Ok(ReliableScraper::new(bulk, extractor, config.retry_policy()))
}

/// Full feed-to-text runner over the reliable scraper.
pub fn build_runner(config: &Config) -> Result<Runner, BuildError> {
    let client = http_client(config.client_timeout())?;

    let feed_source: Arc<dyn FeedSource> = Arc::new(HttpFeedSource::new(
        client.clone(),
        config.client_timeout(),
        config.max_retries,
    ));
    let executor: Arc<dyn BulkFetcher> = Arc::new(build_reliable_scraper(client, config)?);

    tracing::debug!(
        concurrency = config.concurrency,
        rate_limit_ms = config.rate_limit_ms,
        max_retries = config.max_retries,
        "Built runner"
    );

    Ok(Runner::new(feed_source, executor))
}
