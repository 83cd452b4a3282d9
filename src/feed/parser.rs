use crate::util::strip_control_chars;
use feed_rs::parser;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use url::Url;

/// A parsed syndication feed, reduced to what the pipeline needs.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Feed {
    pub title: String,
    pub items: Vec<FeedItem>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct FeedItem {
    pub link: Option<String>,
    pub title: Option<String>,
}

impl Feed {
    /// Article URLs in feed order.
    ///
    /// Links are trimmed, non-http(s) or relative links are dropped, and
    /// duplicates keep their first position so every URL is scraped once.
    pub fn links(&self) -> Vec<String> {
        let mut seen = HashSet::new();

        self.items
            .iter()
            .filter_map(|item| usable_link(item.link.as_deref()))
            .filter(|link| seen.insert(*link))
            .map(str::to_string)
            .collect()
    }

    /// Maps each usable article URL to its title. The first titled item wins.
    pub fn titles_map(&self) -> HashMap<String, String> {
        let mut titles = HashMap::new();

        for item in &self.items {
            let (Some(link), Some(title)) = (usable_link(item.link.as_deref()), &item.title)
            else {
                continue;
            };
            titles
                .entry(link.to_string())
                .or_insert_with(|| title.clone());
        }

        titles
    }
}

fn usable_link(link: Option<&str>) -> Option<&str> {
    let link = link?.trim();
    let parsed = Url::parse(link).ok()?;
    match parsed.scheme() {
        "http" | "https" if parsed.host_str().is_some() => Some(link),
        _ => None,
    }
}

/// Parses RSS, Atom or JSON Feed bytes.
pub fn parse_feed(bytes: &[u8]) -> Result<Feed, parser::ParseFeedError> {
    let feed = parser::parse(bytes)?;

    let title = feed
        .title
        .map(|t| strip_control_chars(t.content.trim()).into_owned())
        .unwrap_or_default();

    let items = feed
        .entries
        .into_iter()
        .map(|entry| {
            let link = entry.links.first().map(|l| l.href.clone());
            let title = entry
                .title
                .map(|t| strip_control_chars(t.content.trim()).into_owned())
                .filter(|t| !t.is_empty());
            FeedItem { link, title }
        })
        .collect();

    Ok(Feed { title, items })
}
