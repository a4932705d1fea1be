//! Cover image download.

use crate::error::{Error, Result};
use crate::fetch::Fetch;
use crate::utils::ImageFormat;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, instrument, warn};

/// Download `photo_url` to `dest`, replacing any file already there.
///
/// The body is written to a sibling temp file first and renamed into place,
/// so `dest` never holds a partial download.
///
/// # Arguments
///
/// * `fetcher` - Source of the image bytes
/// * `photo_url` - Absolute URL of the cover photo
/// * `dest` - Final path of the image file
///
/// # Errors
///
/// Returns an error if:
/// - The image cannot be fetched
/// - The body is not a JPEG, PNG, GIF or WebP image
/// - The file cannot be written or moved into place
#[instrument(level = "info", skip(fetcher), fields(dest = %dest.display()))]
pub async fn download_cover<F: Fetch>(fetcher: &F, photo_url: &str, dest: &Path) -> Result<()> {
    let bytes = fetcher.bytes(photo_url).await?;
    let format = ImageFormat::sniff(&bytes).ok_or_else(|| Error::InvalidImage {
        url: photo_url.to_string(),
    })?;

    let part = partial_path(dest);
    if let Err(e) = fs::write(&part, &bytes).await {
        remove_partial(&part).await;
        return Err(Error::io(&part, e));
    }
    if let Err(e) = fs::rename(&part, dest).await {
        remove_partial(&part).await;
        return Err(Error::io(dest, e));
    }

    info!(bytes = bytes.len(), media_type = format.media_type(), "Saved cover image");
    Ok(())
}

async fn remove_partial(part: &Path) {
    if let Err(e) = fs::remove_file(part).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(error = %e, path = %part.display(), "Failed to remove partial cover");
        }
    }
}

fn partial_path(dest: &Path) -> PathBuf {
    let name = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "cover".to_string());
    dest.with_file_name(format!(".{name}.part"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::testing::{PIXEL_PNG, StubFetcher};

    #[tokio::test]
    async fn test_download_writes_image() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("标题_cover.jpg");
        let fetcher = StubFetcher::new().with("https://img.example.com/a.png", PIXEL_PNG);

        download_cover(&fetcher, "https://img.example.com/a.png", &dest)
            .await
            .unwrap();

        assert_eq!(fs::read(&dest).await.unwrap(), PIXEL_PNG);
        assert!(!partial_path(&dest).exists());
    }

    #[tokio::test]
    async fn test_download_overwrites_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("a_cover.jpg");
        fs::write(&dest, b"old contents that are longer than the image")
            .await
            .unwrap();
        let fetcher = StubFetcher::new().with("https://img.example.com/a.png", PIXEL_PNG);

        download_cover(&fetcher, "https://img.example.com/a.png", &dest)
            .await
            .unwrap();

        assert_eq!(fs::read(&dest).await.unwrap(), PIXEL_PNG);
    }

    #[tokio::test]
    async fn test_download_rejects_non_image() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("a_cover.jpg");
        let fetcher =
            StubFetcher::new().with("https://img.example.com/a.jpg", "<html>not found</html>");

        let err = download_cover(&fetcher, "https://img.example.com/a.jpg", &dest)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::InvalidImage { .. }));
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn test_download_fetch_failure() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("a_cover.jpg");
        let fetcher = StubFetcher::new().failing("https://img.example.com/a.jpg", 403);

        let err = download_cover(&fetcher, "https://img.example.com/a.jpg", &dest)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Status { status: 403, .. }));
    }

    #[tokio::test]
    async fn test_download_unwritable_destination() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("no_such_dir").join("a_cover.jpg");
        let fetcher = StubFetcher::new().with("https://img.example.com/a.png", PIXEL_PNG);

        let err = download_cover(&fetcher, "https://img.example.com/a.png", &dest)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Io { .. }));
    }

    #[tokio::test]
    async fn test_download_write_failure_leaves_no_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("no_such_dir").join("a_cover.jpg");
        let fetcher = StubFetcher::new().with("https://img.example.com/a.png", PIXEL_PNG);

        download_cover(&fetcher, "https://img.example.com/a.png", &dest)
            .await
            .unwrap_err();

        assert!(!partial_path(&dest).exists());
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn test_remove_partial_tolerates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let part = dir.path().join(".a_cover.jpg.part");
        fs::write(&part, b"half").await.unwrap();

        remove_partial(&part).await;
        assert!(!part.exists());
        remove_partial(&part).await;
    }
}
