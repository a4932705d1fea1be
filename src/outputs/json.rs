//! Per-article JSON debug snapshots.
//!
//! Each normalized [`Article`] is dumped to `{scratch}/{title}.json` as soon as
//! it is built, so a run can be inspected after the fact. Snapshots are a side
//! channel: a failed write is logged and the pipeline carries on.

use crate::error::{Error, Result};
use crate::models::Article;
use std::path::Path;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument, warn};

/// Write the snapshot, logging instead of returning any failure.
///
/// A partially written file is removed so a stale snapshot never looks valid.
#[instrument(level = "debug", skip_all, fields(path = %path.display()))]
pub async fn write_snapshot(article: &Article, path: &Path) {
    match try_write_snapshot(article, path).await {
        Ok(()) => debug!("Wrote article snapshot"),
        Err(e) => {
            warn!(error = %e, title = %article.title, "Failed to write article snapshot");
            if let Err(e) = fs::remove_file(path).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(error = %e, "Failed to remove partial snapshot");
                }
            }
        }
    }
}

async fn try_write_snapshot(article: &Article, path: &Path) -> Result<()> {
    let json = encode(article, path)?;
    let mut file = fs::File::create(path)
        .await
        .map_err(|e| Error::io(path, e))?;
    file.write_all(&json).await.map_err(|e| Error::io(path, e))?;
    file.flush().await.map_err(|e| Error::io(path, e))?;
    Ok(())
}

/// Serialize the snapshot body. Encoding failures are reported against the
/// snapshot path, not as malformed input.
fn encode(article: &Article, path: &Path) -> Result<Vec<u8>> {
    serde_json::to_vec_pretty(article).map_err(|e| Error::io(path, e.into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn article() -> Article {
        Article {
            title: "标题".to_string(),
            description: "摘要".to_string(),
            photo_url: "https://example.com/p.jpg".to_string(),
            content: "\n第一段\n第二段".to_string(),
        }
    }

    #[tokio::test]
    async fn test_snapshot_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("标题.json");

        write_snapshot(&article(), &path).await;

        let written: Article =
            serde_json::from_str(&fs::read_to_string(&path).await.unwrap()).unwrap();
        assert_eq!(written, article());
    }

    #[tokio::test]
    async fn test_snapshot_failure_does_not_propagate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("a.json");

        write_snapshot(&article(), &path).await;

        assert!(!path.exists());
    }

    #[test]
    fn test_encode_failure_names_the_snapshot() {
        let path = Path::new("/scratch/标题.json");
        let source: std::io::Error = serde_json::from_str::<Article>("{").unwrap_err().into();
        let err = Error::io(path, source);

        assert!(matches!(&err, Error::Io { path: p, .. } if p == path));
        assert!(!err.to_string().contains("malformed JSON"));
        assert!(encode(&article(), path).is_ok());
    }
}
