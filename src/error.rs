//! Error type shared by every pipeline stage.
//!
//! Each variant maps to one failure class of the pipeline: network fetches,
//! malformed feed documents, filesystem writes, and EPUB packaging.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("failed to fetch {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("malformed JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid URL {url:?}: {source}")]
    Url {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("invalid CSS selector {0:?}")]
    Selector(String),

    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{url} did not return a JPEG, PNG, GIF or WebP image")]
    InvalidImage { url: String },

    #[error("failed to package e-book: {0}")]
    Packaging(String),

    #[error("invalid config file {}: {source}", path.display())]
    Config {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether retrying the same request could succeed.
    ///
    /// Transport failures, `429 Too Many Requests` and server errors qualify;
    /// everything else is a property of the response or of local state.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Fetch { source, .. } => !source.is_builder() && !source.is_redirect(),
            Error::Status { status, .. } => *status == 429 || (500..600).contains(status),
            _ => false,
        }
    }
}
