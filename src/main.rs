//! # NYT Reader
//!
//! Downloads the most viewed articles of the simplified Chinese edition of
//! the New York Times and turns each one into a standalone EPUB with a cover
//! page and a single chapter.
//!
//! ## Usage
//!
//! ```sh
//! nyt_reader --scratch-dir ./books
//! ```
//!
//! ## Architecture
//!
//! The application is a sequential pipeline:
//! 1. **Indexing**: Read the most viewed JSON feed (daily, then weekly)
//! 2. **Fetching**: Scrape each listed article page for its paragraphs
//! 3. **Filtering**: Drop duplicate titles and articles without text
//! 4. **Output**: Download a cover image and write one `.epub` per article

use clap::Parser;
use std::error::Error;
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod cli;
mod config;
mod error;
mod fetch;
mod filter;
mod models;
mod outputs;
mod pipeline;
mod scrapers;
mod utils;

use cli::Cli;
use config::Config;
use fetch::{HttpFetcher, RetryFetch};
use utils::ensure_writable_dir;

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("nyt_reader starting up");

    let args = Cli::parse();
    debug!(?args, "Parsed CLI arguments");

    let config = Config::load(&args).await?;
    debug!(?config, "Resolved configuration");

    // Early check: fail before any network traffic if output can't be written
    if let Err(e) = ensure_writable_dir(&config.scratch_dir).await {
        error!(
            path = %config.scratch_dir.display(),
            error = %e,
            "Scratch directory is not writable (fix perms or choose a different path)"
        );
        return Err(e.into());
    }

    let http = HttpFetcher::new(config.request_timeout())?;
    let fetcher = RetryFetch::new(http, &config.retry);

    let report = pipeline::run(&fetcher, &config).await?;

    info!(
        indexed = report.indexed,
        kept = report.kept,
        written = report.written.len(),
        failed = report.failures.len(),
        "{} articles downloaded, {} e-books written",
        report.kept,
        report.written.len()
    );
    for path in &report.written {
        info!(path = %path.display(), "Wrote e-book");
    }
    for failure in &report.failures {
        warn!(
            title = %failure.title,
            url = %failure.url,
            stage = %failure.stage,
            reason = %failure.reason,
            "Article not converted"
        );
    }

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        "Execution complete"
    );

    Ok(())
}
