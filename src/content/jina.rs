use crate::pipeline::{Extraction, Extractor};
use crate::util::validate_url;
use async_trait::async_trait;
use futures::StreamExt;
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_JINA_BASE_URL: &str = "https://r.jina.ai";

const MAX_CONTENT_SIZE: usize = 5 * 1024 * 1024; // 5MB

/// CSS selectors targeting main article content across common blog platforms.
/// Order matters: more specific selectors first, generic fallbacks last.
const TARGET_SELECTORS: &str =
    "article, .entry-content, .post-content, .article-content, .post-body, main .content, main";

/// Below this many bytes the selector-scoped response is treated as a miss
/// and the page is fetched again without the selector.
const MIN_CONTENT_LEN: usize = 200;

/// Marker the reader service puts between its metadata header and the body.
const BODY_MARKER: &str = "Markdown Content:";

#[derive(Debug, Error)]
pub enum ContentError {
    #[error("Request timed out")]
    Timeout,
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    #[error("Response too large (exceeds {0} bytes)")]
    ResponseTooLarge(usize),
    #[error("Invalid UTF-8 in response")]
    InvalidUtf8,
    #[error("Invalid URL")]
    InvalidUrl,
    #[error("Insecure base URL: HTTPS required (except localhost for testing)")]
    InsecureBaseUrl,
    #[error("No article body could be extracted")]
    NoBody,
    #[error("Extraction cancelled")]
    Cancelled,
}

impl ContentError {
    /// Returns true if this error is transient and the request should be retried.
    fn is_retryable(&self) -> bool {
        match self {
            ContentError::Timeout | ContentError::Network(_) => true,
            ContentError::HttpStatus(status) => *status >= 500,
            ContentError::ResponseTooLarge(_)
            | ContentError::InvalidUtf8
            | ContentError::InvalidUrl
            | ContentError::InsecureBaseUrl
            | ContentError::NoBody
            | ContentError::Cancelled => false,
        }
    }
}

/// Extracts article text through the jina.ai reader service.
///
/// The service returns a markdown rendering of the page preceded by a
/// short metadata header (title, source URL, publish time).
#[derive(Clone)]
pub struct JinaExtractor {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<SecretString>,
    timeout: Duration,
    max_retries: u32,
}

/// Masks the API key.
impl std::fmt::Debug for JinaExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JinaExtractor")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("timeout", &self.timeout)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

impl JinaExtractor {
    pub fn new(client: reqwest::Client, timeout: Duration, max_retries: u32) -> Self {
        Self {
            client,
            base_url: DEFAULT_JINA_BASE_URL.to_string(),
            api_key: None,
            timeout,
            max_retries,
        }
    }

    /// Points the extractor at another reader deployment.
    ///
    /// HTTPS is required so an API key is never sent in clear text; plain
    /// HTTP is accepted for localhost only.
    pub fn with_base_url(mut self, base_url: &str) -> Result<Self, ContentError> {
        let base = base_url.trim_end_matches('/');

        if !base.starts_with("https://") {
            let is_localhost =
                base.starts_with("http://127.0.0.1") || base.starts_with("http://localhost");
            if !is_localhost {
                tracing::error!(base_url = %base, "Rejecting non-HTTPS base URL (HTTPS required except for localhost)");
                return Err(ContentError::InsecureBaseUrl);
            }
            tracing::warn!(base_url = %base, "Using non-HTTPS reader base URL (localhost only)");
        }

        self.base_url = base.to_string();
        Ok(self)
    }

    pub fn with_api_key(mut self, api_key: Option<SecretString>) -> Self {
        self.api_key = api_key;
        self
    }

    /// Fetches `url` through the reader and reports whether a body was found.
    pub async fn fetch_content(&self, url: &str) -> Result<Extraction, ContentError> {
        let parsed_url = validate_url(url).map_err(|e| {
            tracing::debug!(url = %url, error = %e, "Rejected article URL");
            ContentError::InvalidUrl
        })?;

        let reader_url = format!("{}/{}", self.base_url, parsed_url.as_str());

        // First attempt is scoped to common article containers
        let mut content = self.fetch_with_retry(&reader_url, true).await?;

        if content.len() < MIN_CONTENT_LEN {
            tracing::debug!(
                url = %url,
                content_len = content.len(),
                "Target selector returned minimal content, retrying without selector"
            );
            content = self.fetch_with_retry(&reader_url, false).await?;
        }

        let text = strip_boilerplate(&content);
        let body_found = has_body(&text);

        Ok(Extraction { text, body_found })
    }

    async fn fetch_with_retry(
        &self,
        reader_url: &str,
        use_selector: bool,
    ) -> Result<String, ContentError> {
        let mut retry_count = 0;

        loop {
            match self.fetch_once(reader_url, use_selector).await {
                Ok(content) => return Ok(content),
                Err(e) if e.is_retryable() && retry_count < self.max_retries => {
                    let delay = 1u64 << retry_count; // 1s, 2s, 4s
                    tracing::debug!(
                        error = %e,
                        retry = retry_count + 1,
                        delay_secs = delay,
                        "Retrying reader fetch after transient error"
                    );
                    tokio::time::sleep(Duration::from_secs(delay)).await;
                    retry_count += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn fetch_once(&self, reader_url: &str, use_selector: bool) -> Result<String, ContentError> {
        let mut request = self.client.get(reader_url);

        if use_selector {
            request = request.header("X-Target-Selector", TARGET_SELECTORS);
        }

        // Custom deployments (tests, self-hosted) never receive the key
        let is_official =
            reader_url.starts_with("https://r.jina.ai/") || reader_url.starts_with("https://api.jina.ai/");
        if let Some(key) = &self.api_key {
            if is_official {
                request = request.header("Authorization", format!("Bearer {}", key.expose_secret()));
            }
        }

        let response = tokio::time::timeout(self.timeout, request.send())
            .await
            .map_err(|_| ContentError::Timeout)?
            .map_err(ContentError::Network)?;

        if !response.status().is_success() {
            return Err(ContentError::HttpStatus(response.status().as_u16()));
        }

        read_limited_text(response, MAX_CONTENT_SIZE).await
    }
}

#[async_trait]
impl Extractor for JinaExtractor {
    async fn fetch_and_extract_text(
        &self,
        cancel: &CancellationToken,
        url: &str,
    ) -> Result<Extraction, ContentError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ContentError::Cancelled),
            result = self.fetch_content(url) => result,
        }
    }
}

/// True when the reader found more than its metadata header.
fn has_body(text: &str) -> bool {
    match text.find(BODY_MARKER) {
        Some(idx) => !text[idx + BODY_MARKER.len()..].trim().is_empty(),
        None => !text.trim().is_empty(),
    }
}

/// Lines the reader passes through that are never part of an article.
fn is_cruft_line(trimmed: &str) -> bool {
    trimmed.starts_with("[Skip to content]")
        || trimmed.starts_with("Email (Required)")
        || trimmed.contains("Proudly powered by WordPress")
        || matches!(
            trimmed,
            "Loading Comments..." | "Write a Comment..." | "%d" | "Menu"
        )
}

/// Removes navigation remnants, comment scaffolding and runs of 3+
/// month-archive links ("*   [March 2024](...)") from reader output.
fn strip_boilerplate(content: &str) -> String {
    let mut kept: Vec<&str> = Vec::new();
    let mut archive_run = 0;

    for line in content.lines().filter(|l| !is_cruft_line(l.trim())) {
        if is_archive_link(line) {
            archive_run += 1;
        } else {
            if archive_run >= 3 {
                let len = kept.len() - archive_run;
                kept.truncate(len);
            }
            archive_run = 0;
        }
        kept.push(line);
    }

    if archive_run >= 3 {
        let len = kept.len() - archive_run;
        kept.truncate(len);
    }

    kept.join("\n")
}

const MONTHS: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

fn is_archive_link(line: &str) -> bool {
    let Some(rest) = line.trim().strip_prefix('*') else {
        return false;
    };
    let Some(label) = rest.trim_start().strip_prefix('[') else {
        return false;
    };

    MONTHS.iter().any(|month| {
        label
            .strip_prefix(month)
            .and_then(|after| after.strip_prefix(' '))
            .and_then(|after| after.get(..4))
            .is_some_and(|year| year.chars().all(|c| c.is_ascii_digit()))
    })
}

async fn read_limited_text(
    response: reqwest::Response,
    limit: usize,
) -> Result<String, ContentError> {
    if let Some(len) = response.content_length() {
        if len as usize > limit {
            return Err(ContentError::ResponseTooLarge(limit));
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(ContentError::Network)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(ContentError::ResponseTooLarge(limit));
        }
        bytes.extend_from_slice(&chunk);
    }

    String::from_utf8(bytes).map_err(|_| ContentError::InvalidUtf8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{header_exists, method, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const ARTICLE: &str = "Title: Rust 2024\n\nURL Source: https://example.com/article\n\nMarkdown Content:\n# Rust 2024\n\nThe new edition stabilises a long list of features that have been baking on nightly for a while, and this article walks through the ones that matter most for day to day code.";

    async fn extractor_for(server: &MockServer) -> JinaExtractor {
        JinaExtractor::new(reqwest::Client::new(), Duration::from_secs(5), 1)
            .with_base_url(&server.uri())
            .unwrap()
    }

    #[tokio::test]
    async fn test_fetch_content_success() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path_regex(".*"))
            .and(header_exists("X-Target-Selector"))
            .respond_with(ResponseTemplate::new(200).set_body_string(ARTICLE))
            .expect(1)
            .mount(&mock_server)
            .await;

        let extraction = extractor_for(&mock_server)
            .await
            .fetch_content("https://example.com/article")
            .await
            .unwrap();

        assert!(extraction.body_found);
        assert!(extraction.text.contains("new edition"));
    }

    #[tokio::test]
    async fn test_short_selector_result_falls_back() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header_exists("X-Target-Selector"))
            .respond_with(ResponseTemplate::new(200).set_body_string("Title: x"))
            .expect(1)
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(ARTICLE))
            .expect(1)
            .mount(&mock_server)
            .await;

        let extraction = extractor_for(&mock_server)
            .await
            .fetch_content("https://example.com/article")
            .await
            .unwrap();

        assert!(extraction.body_found);
    }

    #[tokio::test]
    async fn test_metadata_only_has_no_body() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "Title: Paywalled\n\nURL Source: https://example.com/article\n\nMarkdown Content:\n\n",
            ))
            .mount(&mock_server)
            .await;

        let extraction = extractor_for(&mock_server)
            .await
            .fetch_content("https://example.com/article")
            .await
            .unwrap();

        assert!(!extraction.body_found);
        assert!(extraction.text.contains("Paywalled"));
    }

    #[tokio::test]
    async fn test_invalid_url_rejected() {
        let extractor = JinaExtractor::new(reqwest::Client::new(), Duration::from_secs(5), 0);
        assert!(matches!(
            extractor.fetch_content("not-a-valid-url").await,
            Err(ContentError::InvalidUrl)
        ));
    }

    #[tokio::test]
    async fn test_private_targets_rejected() {
        let extractor = JinaExtractor::new(reqwest::Client::new(), Duration::from_secs(5), 0);
        for url in ["http://localhost/a", "http://192.168.1.1/a", "http://10.0.0.1/a"] {
            assert!(matches!(
                extractor.fetch_content(url).await,
                Err(ContentError::InvalidUrl)
            ));
        }
    }

    #[tokio::test]
    async fn test_http_404_not_retried() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&mock_server)
            .await;

        let result = extractor_for(&mock_server)
            .await
            .fetch_content("https://example.com/article")
            .await;

        assert!(matches!(result, Err(ContentError::HttpStatus(404))));
    }

    #[tokio::test]
    async fn test_http_500_retried_then_fails() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .expect(2) // Initial request + 1 retry
            .mount(&mock_server)
            .await;

        let result = extractor_for(&mock_server)
            .await
            .fetch_content("https://example.com/article")
            .await;

        assert!(matches!(result, Err(ContentError::HttpStatus(500))));
    }

    #[tokio::test]
    async fn test_cancelled_extraction() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(ARTICLE)
                    .set_delay(Duration::from_secs(10)),
            )
            .mount(&mock_server)
            .await;

        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = extractor_for(&mock_server)
            .await
            .fetch_and_extract_text(&cancel, "https://example.com/article")
            .await;

        assert!(matches!(result, Err(ContentError::Cancelled)));
    }

    #[test]
    fn test_http_base_url_rejected() {
        let result = JinaExtractor::new(reqwest::Client::new(), Duration::from_secs(5), 0)
            .with_base_url("http://evil.com");
        assert!(matches!(result, Err(ContentError::InsecureBaseUrl)));
    }

    #[test]
    fn test_https_base_url_trailing_slash_trimmed() {
        let extractor = JinaExtractor::new(reqwest::Client::new(), Duration::from_secs(5), 0)
            .with_base_url("https://reader.example.com/")
            .unwrap();
        assert_eq!(extractor.base_url, "https://reader.example.com");
    }

    #[test]
    fn test_debug_masks_api_key() {
        let extractor = JinaExtractor::new(reqwest::Client::new(), Duration::from_secs(5), 0)
            .with_api_key(Some(SecretString::from("super-secret-key-12345")));
        let debug_output = format!("{:?}", extractor);
        assert!(!debug_output.contains("super-secret-key-12345"));
        assert!(debug_output.contains("[REDACTED]"));
    }

    #[test]
    fn test_has_body() {
        assert!(has_body("Title: t\n\nMarkdown Content:\nBody text"));
        assert!(!has_body("Title: t\n\nMarkdown Content:\n   \n"));
        assert!(has_body("plain text without header"));
        assert!(!has_body("  \n "));
    }

    #[test]
    fn test_strip_cruft_lines() {
        let input = "[Skip to content](https://example.com/#content)\nMenu\n# Article\n\nContent\n\nLoading Comments...\nWrite a Comment...\nEmail (Required) Name Website\nProudly powered by WordPress";
        assert_eq!(strip_boilerplate(input), "# Article\n\nContent\n");
    }

    #[test]
    fn test_strip_archive_runs() {
        let input = "Article content\n\n*   [January 2024](https://example.com/2024/01/)\n*   [February 2024](https://example.com/2024/02/)\n*   [March 2024](https://example.com/2024/03/)\nTail";
        let result = strip_boilerplate(input);
        assert!(!result.contains("January 2024"));
        assert!(!result.contains("March 2024"));
        assert!(result.contains("Article content"));
        assert!(result.contains("Tail"));
    }

    #[test]
    fn test_short_archive_list_preserved() {
        let input = "Related:\n*   [January 2024](https://example.com/2024/01/)\n*   [February 2024](https://example.com/2024/02/)\nMore";
        assert_eq!(strip_boilerplate(input), input);
    }

    #[test]
    fn test_is_archive_link() {
        assert!(is_archive_link("*   [January 2024](https://example.com/)"));
        assert!(is_archive_link("  *   [December 2023](https://example.com/)"));
        assert!(!is_archive_link("*   [Some Article](https://example.com/)"));
        assert!(!is_archive_link("January 2024"));
        assert!(!is_archive_link("*   January 2024"));
        assert!(!is_archive_link("*   [May](https://example.com/)"));
    }
}
