//! Feed retrieval for RSS/Atom/JSON feeds.
//!
//! - [`parser`] - Feed parsing using the `feed-rs` crate, plus link and title derivation
//! - [`fetcher`] - HTTP fetching with retry, size limits and cancellation
//!
//! # Example
//!
//! ```ignore
//! use textpipe::feed::HttpFeedSource;
//! use textpipe::pipeline::FeedSource;
//!
//! let source = HttpFeedSource::new(client, Duration::from_secs(15), 2);
//! let feed = source.fetch_and_parse(&cancel, "https://example.com/rss").await?;
//! let urls = feed.links();
//! ```

mod fetcher;
mod parser;

pub use fetcher::{FeedError, HttpFeedSource};
pub use parser::{parse_feed, Feed, FeedItem};
