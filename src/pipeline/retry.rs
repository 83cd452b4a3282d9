use super::{Extractor, UrlResult};
use crate::content::ContentError;
use crate::util::condense_error;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Sleeps for `delay`, waking early if the run is cancelled.
///
/// Returns `false` when the wait was cut short by cancellation.
pub(crate) async fn cooldown(cancel: &CancellationToken, delay: Duration) -> bool {
    if delay.is_zero() {
        return !cancel.is_cancelled();
    }

    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}

/// Re-attempts failed URLs one at a time through the single-item extractor.
///
/// Waits `retry_delay` first so a struggling origin gets a breather, then
/// walks `failed_urls` in order. Only successes are returned, in attempt
/// order; a URL that fails again is logged and dropped. Never fails as a
/// whole. Stops issuing new attempts once `cancel` fires and returns what
/// has been salvaged so far.
pub async fn retry_failed(
    extractor: &dyn Extractor,
    cancel: &CancellationToken,
    failed_urls: &[String],
    retry_delay: Duration,
) -> Vec<UrlResult> {
    tracing::warn!(
        count = failed_urls.len(),
        delay_ms = retry_delay.as_millis() as u64,
        "Some URLs failed extraction, retrying sequentially after cooldown"
    );

    let mut retried = Vec::new();

    if !cooldown(cancel, retry_delay).await {
        tracing::warn!(
            skipped = failed_urls.len(),
            "Run cancelled during retry cooldown, skipping retries"
        );
        return retried;
    }

    tracing::info!("Starting sequential retry of failed URLs");

    for (attempted, url) in failed_urls.iter().enumerate() {
        if cancel.is_cancelled() {
            tracing::warn!(
                skipped = failed_urls.len() - attempted,
                "Run cancelled, abandoning remaining retries"
            );
            break;
        }

        tracing::info!(url = %url, "Retrying");

        match retry_one(extractor, cancel, url).await {
            Ok(content) => {
                tracing::info!(url = %url, "URL extracted on retry");
                retried.push(UrlResult::success(url.as_str(), content));
            }
            Err(e) => {
                tracing::error!(
                    url = %url,
                    error = %condense_error(&e.to_string()),
                    "URL failed again on retry"
                );
            }
        }
    }

    retried
}

async fn retry_one(
    extractor: &dyn Extractor,
    cancel: &CancellationToken,
    url: &str,
) -> Result<String, ContentError> {
    let extraction = extractor.fetch_and_extract_text(cancel, url).await?;

    if extraction.text.is_empty() || !extraction.body_found {
        return Err(ContentError::NoBody);
    }

    Ok(extraction.text)
}
