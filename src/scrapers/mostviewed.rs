//! Most viewed index.
//!
//! The site publishes its most viewed articles as one JSON document with a
//! daily and a weekly list. Each entry carries the headline, summary and
//! photo, but not the body, so every entry's page is scraped as it is read.
//!
//! # Ordering
//!
//! Daily entries come first, then weekly ones, each list in feed order.

use crate::error::{Error, Result};
use crate::fetch::Fetch;
use crate::models::{Article, ArticleFailure, FeedEntry, MostViewedFeed, Stage};
use crate::outputs::OutputNames;
use crate::outputs::json::write_snapshot;
use crate::scrapers::content::ContentScraper;
use std::path::Path;
use tracing::{error, info, instrument, warn};
use url::Url;

/// Articles built from the feed, plus the entries that could not be built.
#[derive(Debug, Default)]
pub struct IndexListing {
    /// Built articles, daily entries first, each list in feed order.
    pub articles: Vec<Article>,
    /// Entries whose URL or page could not be turned into an article.
    pub failures: Vec<ArticleFailure>,
}

/// Parse the feed body.
pub fn parse_feed(body: &str) -> Result<MostViewedFeed> {
    Ok(serde_json::from_str(body)?)
}

/// Reads the most viewed feed and turns its entries into [`Article`]s.
pub struct IndexFetcher<'a, F> {
    fetcher: &'a F,
    scraper: &'a ContentScraper,
    snapshot_dir: Option<&'a Path>,
    fail_fast: bool,
}

impl<'a, F: Fetch> IndexFetcher<'a, F> {
    pub fn new(fetcher: &'a F, scraper: &'a ContentScraper) -> Self {
        Self {
            fetcher,
            scraper,
            snapshot_dir: None,
            fail_fast: false,
        }
    }

    /// Write a JSON snapshot of each built article into `dir`.
    pub fn snapshots(mut self, dir: &'a Path) -> Self {
        self.snapshot_dir = Some(dir);
        self
    }

    /// Return the first entry failure as an error instead of recording it.
    pub fn fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    /// Fetch the feed at `index_url` and build one article per entry.
    ///
    /// Entries are read daily list first, then weekly, and each entry's page
    /// is scraped before the next one is touched. When snapshots are enabled,
    /// every built article is dumped to the snapshot directory.
    ///
    /// # Arguments
    ///
    /// * `index_url` - Absolute URL of the most viewed feed; relative entry
    ///   URLs are resolved against it
    ///
    /// # Returns
    ///
    /// An [`IndexListing`] with the built articles in feed order and one
    /// [`ArticleFailure`] per entry that could not be built.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `index_url` is not a valid URL
    /// - The feed cannot be fetched or is not the expected JSON document
    /// - An entry fails while fail-fast is on
    #[instrument(level = "info", skip(self))]
    pub async fn fetch(&self, index_url: &str) -> Result<IndexListing> {
        let base = Url::parse(index_url).map_err(|source| Error::Url {
            url: index_url.to_string(),
            source,
        })?;
        let body = self.fetcher.text(index_url).await?;
        let feed = parse_feed(&body)?;
        info!(
            daily = feed.list.daily.len(),
            weekly = feed.list.weekly.len(),
            "Indexed most viewed articles"
        );

        let mut listing = IndexListing::default();
        let mut names = self.snapshot_dir.map(OutputNames::new);
        for entry in feed.list.daily.iter().chain(feed.list.weekly.iter()) {
            match self.build_article(entry, &base).await {
                Ok(article) => {
                    if let Some(names) = names.as_mut() {
                        let paths = names.paths_for(&article.title);
                        write_snapshot(&article, &paths.snapshot).await;
                    }
                    listing.articles.push(article);
                }
                Err(e) if self.fail_fast => {
                    error!(error = %e, headline = %entry.headline, "Article failed; aborting run");
                    return Err(e);
                }
                Err(e) => {
                    warn!(error = %e, headline = %entry.headline, "Article failed; skipping");
                    listing.failures.push(ArticleFailure {
                        title: entry.headline.clone(),
                        url: entry.url.clone(),
                        stage: Stage::Scrape,
                        reason: e.to_string(),
                    });
                }
            }
        }

        info!(
            built = listing.articles.len(),
            failed = listing.failures.len(),
            "Fetched article contents"
        );
        Ok(listing)
    }

    async fn build_article(&self, entry: &FeedEntry, base: &Url) -> Result<Article> {
        let url = resolve(base, &entry.url)?;
        let photo_url = resolve(base, &entry.photo.url)?;
        let content = self.scraper.scrape(self.fetcher, &url).await?;

        Ok(Article {
            title: entry.headline.clone(),
            description: entry.summary.clone().unwrap_or_default(),
            photo_url,
            content,
        })
    }
}

/// Resolve a possibly relative feed URL against the feed's own URL.
fn resolve(base: &Url, raw: &str) -> Result<String> {
    base.join(raw.trim())
        .map(String::from)
        .map_err(|source| Error::Url {
            url: raw.to_string(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::testing::StubFetcher;

    const INDEX: &str = "https://cn.nytimes.com/async/mostviewed/all/?lang=zh-hans";

    fn page(paragraph: &str) -> String {
        format!(
            r#"<div class="article-partial"><p class="article-paragraph">{paragraph}</p></div>"#
        )
    }

    fn entry(slug: &str, headline: &str) -> String {
        format!(
            r#"{{"url": "https://cn.nytimes.com/{slug}/", "headline": "{headline}",
                "short_headline": "s", "summary": "about {slug}",
                "photo": {{"url": "https://static01.nyt.com/{slug}.jpg"}}}}"#
        )
    }

    fn feed(daily: &[String], weekly: &[String]) -> String {
        format!(
            r#"{{"list": {{"daily": [{}], "weekly": [{}]}}}}"#,
            daily.join(","),
            weekly.join(",")
        )
    }

    #[tokio::test]
    async fn test_fetch_orders_daily_then_weekly() {
        let body = feed(
            &[entry("d1", "D1"), entry("d2", "D2")],
            &[entry("w1", "W1"), entry("w2", "W2"), entry("w3", "W3")],
        );
        let mut fetcher = StubFetcher::new().with(INDEX, body);
        for slug in ["d1", "d2", "w1", "w2", "w3"] {
            fetcher = fetcher.with(&format!("https://cn.nytimes.com/{slug}/"), page(slug));
        }
        let scraper = ContentScraper::default();

        let listing = IndexFetcher::new(&fetcher, &scraper).fetch(INDEX).await.unwrap();

        let titles: Vec<&str> = listing.articles.iter().map(|a| a.title.as_str()).collect();
        assert_eq!(titles, vec!["D1", "D2", "W1", "W2", "W3"]);
        assert!(listing.failures.is_empty());

        let first = &listing.articles[0];
        assert_eq!(first.description, "about d1");
        assert_eq!(first.photo_url, "https://static01.nyt.com/d1.jpg");
        assert_eq!(first.content, "\nd1");
    }

    #[tokio::test]
    async fn test_fetch_resolves_relative_urls() {
        let body = r#"{"list": {"daily": [{
            "url": "/world/20250506/a/",
            "headline": "A",
            "photo": {"url": "//static01.nyt.com/a.jpg"}
        }], "weekly": []}}"#;
        let fetcher = StubFetcher::new()
            .with(INDEX, body)
            .with("https://cn.nytimes.com/world/20250506/a/", page("body"));
        let scraper = ContentScraper::default();

        let listing = IndexFetcher::new(&fetcher, &scraper).fetch(INDEX).await.unwrap();

        let article = &listing.articles[0];
        assert_eq!(article.photo_url, "https://static01.nyt.com/a.jpg");
        assert_eq!(article.description, "");
    }

    #[tokio::test]
    async fn test_fetch_rejects_malformed_feed() {
        let fetcher = StubFetcher::new().with(INDEX, "{not json");
        let scraper = ContentScraper::default();

        let err = IndexFetcher::new(&fetcher, &scraper).fetch(INDEX).await.unwrap_err();
        assert!(matches!(err, Error::Parse(_)));
    }

    #[tokio::test]
    async fn test_fetch_rejects_missing_weekly_list() {
        let fetcher = StubFetcher::new().with(INDEX, r#"{"list": {"daily": []}}"#);
        let scraper = ContentScraper::default();

        let err = IndexFetcher::new(&fetcher, &scraper).fetch(INDEX).await.unwrap_err();
        assert!(matches!(err, Error::Parse(_)));
    }

    #[tokio::test]
    async fn test_fetch_propagates_index_failure() {
        let fetcher = StubFetcher::new().failing(INDEX, 503);
        let scraper = ContentScraper::default();

        let err = IndexFetcher::new(&fetcher, &scraper).fetch(INDEX).await.unwrap_err();
        assert!(matches!(err, Error::Status { status: 503, .. }));
    }

    #[tokio::test]
    async fn test_failed_entry_is_recorded_and_skipped() {
        let body = feed(&[entry("d1", "D1"), entry("d2", "D2")], &[]);
        let fetcher = StubFetcher::new()
            .with(INDEX, body)
            .failing("https://cn.nytimes.com/d1/", 500)
            .with("https://cn.nytimes.com/d2/", page("d2"));
        let scraper = ContentScraper::default();

        let listing = IndexFetcher::new(&fetcher, &scraper).fetch(INDEX).await.unwrap();

        assert_eq!(listing.articles.len(), 1);
        assert_eq!(listing.articles[0].title, "D2");
        assert_eq!(listing.failures.len(), 1);
        assert_eq!(listing.failures[0].title, "D1");
        assert_eq!(listing.failures[0].stage, Stage::Scrape);
    }

    #[tokio::test]
    async fn test_fail_fast_aborts_on_first_entry_failure() {
        let body = feed(&[entry("d1", "D1"), entry("d2", "D2")], &[]);
        let fetcher = StubFetcher::new()
            .with(INDEX, body)
            .failing("https://cn.nytimes.com/d1/", 500)
            .with("https://cn.nytimes.com/d2/", page("d2"));
        let scraper = ContentScraper::default();

        let err = IndexFetcher::new(&fetcher, &scraper)
            .fail_fast(true)
            .fetch(INDEX)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Status { status: 500, .. }));
        assert!(!fetcher.requests().contains(&"https://cn.nytimes.com/d2/".to_string()));
    }

    #[tokio::test]
    async fn test_snapshots_are_written() {
        let dir = tempfile::tempdir().unwrap();
        let body = feed(&[entry("d1", "头条/新闻")], &[]);
        let fetcher = StubFetcher::new()
            .with(INDEX, body)
            .with("https://cn.nytimes.com/d1/", page("d1"));
        let scraper = ContentScraper::default();

        IndexFetcher::new(&fetcher, &scraper)
            .snapshots(dir.path())
            .fetch(INDEX)
            .await
            .unwrap();

        let snapshot = dir.path().join("头条_新闻.json");
        let article: Article =
            serde_json::from_str(&std::fs::read_to_string(snapshot).unwrap()).unwrap();
        assert_eq!(article.title, "头条/新闻");
        assert_eq!(article.content, "\nd1");
    }

    #[tokio::test]
    async fn test_snapshots_of_colliding_titles_are_kept_apart() {
        let dir = tempfile::tempdir().unwrap();
        let body = feed(&[entry("d1", "A/B")], &[entry("w1", "A_B")]);
        let fetcher = StubFetcher::new()
            .with(INDEX, body)
            .with("https://cn.nytimes.com/d1/", page("d1"))
            .with("https://cn.nytimes.com/w1/", page("w1"));
        let scraper = ContentScraper::default();

        IndexFetcher::new(&fetcher, &scraper)
            .snapshots(dir.path())
            .fetch(INDEX)
            .await
            .unwrap();

        let read = |name: &str| -> Article {
            serde_json::from_str(&std::fs::read_to_string(dir.path().join(name)).unwrap()).unwrap()
        };
        assert_eq!(read("A_B.json").title, "A/B");
        assert_eq!(read("A_B-2.json").title, "A_B");
    }
}
