//! Data models for the most viewed feed and the articles built from it.
//!
//! - [`MostViewedFeed`]: the index document as served by the site
//! - [`FeedEntry`]: one raw entry of the daily or weekly list
//! - [`Article`]: the normalized record every later stage works on
//! - [`ArticleFailure`] / [`RunReport`]: per-article outcomes of a run

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// The "most viewed" index document.
///
/// ```json
/// { "list": { "daily": [ ... ], "weekly": [ ... ] } }
/// ```
#[derive(Debug, Deserialize)]
pub struct MostViewedFeed {
    pub list: MostViewedList,
}

#[derive(Debug, Deserialize)]
pub struct MostViewedList {
    pub daily: Vec<FeedEntry>,
    pub weekly: Vec<FeedEntry>,
}

/// A raw feed entry before its page has been scraped.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedEntry {
    /// Article page URL, possibly relative to the feed URL.
    pub url: String,
    pub headline: String,
    /// Parsed for completeness; nothing downstream reads it.
    #[allow(dead_code)]
    #[serde(default)]
    pub short_headline: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    pub photo: FeedPhoto,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedPhoto {
    pub url: String,
}

/// A normalized article, ready for filtering and packaging.
///
/// This is also the shape of the JSON debug snapshot written per article.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Article {
    /// Headline; the dedup key and the base of every output file name.
    pub title: String,
    /// Summary shown on the cover page. May be empty.
    pub description: String,
    /// Absolute URL of the cover photo.
    pub photo_url: String,
    /// Scraped paragraphs, each prefixed with a newline.
    pub content: String,
}

/// The pipeline step an article failed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Scrape,
    Cover,
    Package,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Scrape => "scrape",
            Stage::Cover => "cover",
            Stage::Package => "package",
        };
        f.write_str(name)
    }
}

/// Why one article produced no e-book.
#[derive(Debug, Clone)]
pub struct ArticleFailure {
    pub title: String,
    /// Page URL for scrape failures, photo URL for later stages.
    pub url: String,
    pub stage: Stage,
    pub reason: String,
}

/// Outcome of a full run.
#[derive(Debug, Default)]
pub struct RunReport {
    /// Articles listed by the feed, before filtering.
    pub indexed: usize,
    /// Articles left after dedup and the empty-content filter.
    pub kept: usize,
    /// Paths of the e-books written, in processing order.
    pub written: Vec<PathBuf>,
    pub failures: Vec<ArticleFailure>,
}
