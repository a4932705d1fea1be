//! Article page scraper.
//!
//! Pulls the body text out of an article page. The body lives in paragraphs
//! matching `.article-partial .article-paragraph`; everything else on the
//! page (navigation, captions, related links) is ignored.

use crate::error::{Error, Result};
use crate::fetch::Fetch;
use crate::utils::truncate_for_log;
use scraper::{Html, Selector};
use tracing::{debug, info, instrument};

/// Extracts paragraph text from article pages.
#[derive(Debug, Clone)]
pub struct ContentScraper {
    selector: Selector,
}

impl ContentScraper {
    pub fn new(selector: &str) -> Result<Self> {
        let selector =
            Selector::parse(selector).map_err(|_| Error::Selector(selector.to_string()))?;
        Ok(Self { selector })
    }

    /// Fetch `url` and return its paragraph text.
    ///
    /// An empty string means the page had no matching paragraphs, which is
    /// not an error here; the filter stage drops such articles.
    #[instrument(level = "info", skip(self, fetcher))]
    pub async fn scrape<F: Fetch>(&self, fetcher: &F, url: &str) -> Result<String> {
        let html = fetcher.text(url).await?;
        let content = self.extract(&html);
        info!(bytes = content.len(), "Parsed article page");
        debug!(preview = %truncate_for_log(&content, 120), "Article content");
        Ok(content)
    }

    /// Concatenate the text of every matching element in document order,
    /// each prefixed with a newline.
    pub fn extract(&self, html: &str) -> String {
        let document = Html::parse_document(html);
        document
            .select(&self.selector)
            .fold(String::new(), |mut content, paragraph| {
                content.push('\n');
                content.extend(paragraph.text());
                content
            })
    }
}

#[cfg(test)]
impl Default for ContentScraper {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_CONTENT_SELECTOR).unwrap()
    }
}
