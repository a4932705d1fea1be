//! Scrapers for the most viewed feed and the article pages it links to.
//!
//! Scraping happens in two phases:
//!
//! 1. **Indexing**: read the most viewed JSON feed ([`mostviewed`])
//! 2. **Fetching**: download each linked page and keep its body text ([`content`])
//!
//! Both phases run one request at a time, in feed order.

pub mod content;
pub mod mostviewed;
