use super::UrlResult;

/// Bulk output split into usable results and the URLs that need another attempt.
#[derive(Debug, Default)]
pub struct Classified {
    /// Usable results, in their original relative order.
    pub successful: Vec<UrlResult>,
    /// URLs whose attempt errored or came back empty, in their original relative order.
    pub failed_urls: Vec<String>,
}

/// Partitions bulk fetch output.
///
/// A result with an error or with empty content counts as failed: an empty
/// body is no more useful downstream than an error.
pub fn classify(results: Vec<UrlResult>) -> Classified {
    let mut classified = Classified::default();

    for result in results {
        if result.is_usable() {
            classified.successful.push(result);
        } else {
            classified.failed_urls.push(result.url);
        }
    }

    classified
}
