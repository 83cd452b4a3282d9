//! Article text extraction: the reader-service extractor and the bulk
//! fan-out built on top of it.

mod jina;
mod limiter;
mod parallel;

pub use jina::{ContentError, JinaExtractor, DEFAULT_JINA_BASE_URL};
pub use limiter::RateLimiter;
pub use parallel::ParallelScraper;
