//! The end-to-end run: index, filter, then cover and e-book per article.
//!
//! Articles are processed strictly one after another. A failing article is
//! recorded in the [`RunReport`] and the run moves on to the next one, unless
//! `fail_fast` is set, in which case the first failure ends the run.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::fetch::Fetch;
use crate::filter::filter_articles;
use crate::models::{Article, ArticleFailure, RunReport, Stage};
use crate::outputs::{ArticlePaths, OutputNames};
use crate::outputs::cover::download_cover;
use crate::outputs::epub::EbookPackager;
use crate::scrapers::content::ContentScraper;
use crate::scrapers::mostviewed::IndexFetcher;
use std::path::PathBuf;
use tracing::{error, info, instrument, warn};

/// Run the whole pipeline once.
///
/// Reads the feed at `config.index_url`, filters the articles, then for each
/// kept article downloads its cover and writes `{title}.epub` into
/// `config.scratch_dir`. Titles that map to the same file name get distinct
/// numbered files.
///
/// # Arguments
///
/// * `fetcher` - Source of every page, feed and image body
/// * `config` - Resolved run configuration
///
/// # Returns
///
/// A [`RunReport`] with the written e-books and every article that failed
/// during scraping, cover download or packaging.
///
/// # Errors
///
/// Returns an error if:
/// - The content selector is invalid
/// - The feed cannot be fetched or parsed
/// - Any article fails while `config.fail_fast` is set
#[instrument(level = "info", skip_all, fields(index_url = %config.index_url))]
pub async fn run<F: Fetch>(fetcher: &F, config: &Config) -> Result<RunReport> {
    let scraper = ContentScraper::new(&config.content_selector)?;
    let mut indexer = IndexFetcher::new(fetcher, &scraper).fail_fast(config.fail_fast);
    if config.write_snapshots {
        indexer = indexer.snapshots(&config.scratch_dir);
    }

    let listing = indexer.fetch(&config.index_url).await?;
    let mut report = RunReport {
        indexed: listing.articles.len() + listing.failures.len(),
        failures: listing.failures,
        ..RunReport::default()
    };

    let articles = filter_articles(listing.articles);
    report.kept = articles.len();
    info!(count = report.kept, "Articles to package");

    let packager = EbookPackager::new(config.language.clone());
    let mut names = OutputNames::new(&config.scratch_dir);
    for article in &articles {
        let paths = names.paths_for(&article.title);
        match process_article(fetcher, &packager, article, paths).await {
            Ok(path) => report.written.push(path),
            Err((stage, e)) if config.fail_fast => {
                error!(title = %article.title, %stage, error = %e, "Article failed; aborting run");
                return Err(e);
            }
            Err((stage, e)) => {
                warn!(title = %article.title, %stage, error = %e, "Article failed; skipping");
                report.failures.push(ArticleFailure {
                    title: article.title.clone(),
                    url: article.photo_url.clone(),
                    stage,
                    reason: e.to_string(),
                });
            }
        }
    }

    info!(
        written = report.written.len(),
        failed = report.failures.len(),
        "Run finished"
    );
    Ok(report)
}

/// Download the cover and package one article, tagging any error with the
/// stage it came from.
#[instrument(level = "info", skip_all, fields(title = %article.title))]
async fn process_article<F: Fetch>(
    fetcher: &F,
    packager: &EbookPackager,
    article: &Article,
    paths: ArticlePaths,
) -> std::result::Result<PathBuf, (Stage, Error)> {
    download_cover(fetcher, &article.photo_url, &paths.cover)
        .await
        .map_err(|e| (Stage::Cover, e))?;

    packager
        .package(article, &paths.cover, &paths.ebook)
        .await
        .map_err(|e| (Stage::Package, e))?;

    Ok(paths.ebook)
}
