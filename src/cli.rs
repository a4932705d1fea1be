//! Command-line interface definitions for NYT Reader.
//!
//! Every option is optional: a bare `nyt_reader` fetches the most viewed list
//! and writes its e-books to the system temp directory. Flags override the
//! YAML file given with `--config`.

use clap::Parser;
use std::path::PathBuf;

/// Command-line arguments for the NYT Reader application.
///
/// # Examples
///
/// ```sh
/// # Plain run, output in the temp directory
/// nyt_reader
///
/// # Custom output directory, retrying flaky requests
/// nyt_reader --scratch-dir ./books --max-retries 3
///
/// # Settings from a file
/// nyt_reader --config ./nyt_reader.yaml
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Optional path to a YAML config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Directory for JSON snapshots, cover images and e-books
    #[arg(short, long, env = "NYT_READER_SCRATCH_DIR")]
    pub scratch_dir: Option<PathBuf>,

    /// Most viewed feed to read instead of the built-in one
    #[arg(long)]
    pub index_url: Option<String>,

    /// Retry transient network failures up to this many times
    #[arg(long)]
    pub max_retries: Option<usize>,

    /// Stop at the first article that fails instead of skipping it
    #[arg(long)]
    pub fail_fast: bool,
}
