//! Dedup and empty-content filtering.

use crate::models::Article;
use itertools::Itertools;
use tracing::{debug, instrument};

/// Keep the first article of each title, then drop those whose content is
/// blank once trimmed. Surviving articles keep their relative order.
#[instrument(level = "info", skip_all, fields(input = articles.len()))]
pub fn filter_articles(articles: Vec<Article>) -> Vec<Article> {
    let kept: Vec<Article> = articles
        .into_iter()
        .unique_by(|a| a.title.clone())
        .filter(|a| !a.content.trim().is_empty())
        .collect();
    debug!(kept = kept.len(), "Filtered articles");
    kept
}
