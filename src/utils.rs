//! Utility functions for file naming, log formatting, image sniffing and
//! file system checks.

use crate::error::{Error, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::borrow::Cow;
use std::fs as stdfs;
use std::path::Path;
use tokio::fs;
use tracing::{info, instrument};

/// Longest file stem produced by [`sanitize_title`], in characters.
const MAX_STEM_CHARS: usize = 120;

static UNSAFE_FILENAME_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[/\\:*?"<>|\p{Cc}]"#).expect("static regex"));

/// Turn an article title into a flat, portable file stem.
///
/// Path separators, characters Windows rejects and control characters become
/// `_`. Leading dots are dropped so the result is never hidden or a relative
/// path component. CJK and other letters are kept as they are.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(sanitize_title("a/b: c?"), "a_b_ c_");
/// assert_eq!(sanitize_title("   "), "untitled");
/// ```
pub fn sanitize_title(title: &str) -> String {
    let replaced = UNSAFE_FILENAME_CHARS.replace_all(title, "_");
    let trimmed = replaced.trim().trim_start_matches('.').trim_start();
    let stem: String = trimmed.chars().take(MAX_STEM_CHARS).collect();
    let stem = stem.trim_end();
    if stem.is_empty() {
        "untitled".to_string()
    } else {
        stem.to_string()
    }
}

/// Truncate a string for logging purposes.
///
/// Cuts at a character boundary at or below `max` bytes and appends how many
/// bytes were dropped.
pub fn truncate_for_log(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}…(+{} bytes)", &s[..cut], s.len() - cut)
}

/// Drop characters XML 1.0 does not allow in documents.
///
/// Escaping handles markup characters, but C0 controls other than tab, line
/// feed and carriage return (and U+FFFE/U+FFFF) may not appear at all, even
/// as character references. Borrows when nothing needs removing.
pub fn xml_safe(text: &str) -> Cow<'_, str> {
    fn allowed(c: char) -> bool {
        matches!(c, '\t' | '\n' | '\r') || (c >= ' ' && c != '\u{FFFE}' && c != '\u{FFFF}')
    }

    if text.chars().all(allowed) {
        Cow::Borrowed(text)
    } else {
        Cow::Owned(text.chars().filter(|&c| allowed(c)).collect())
    }
}

/// A raster format accepted as an e-book cover.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Jpeg,
    Png,
    Gif,
    Webp,
}

impl ImageFormat {
    /// Recognise an image from its magic number.
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
            Some(ImageFormat::Jpeg)
        } else if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
            Some(ImageFormat::Png)
        } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
            Some(ImageFormat::Gif)
        } else if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
            Some(ImageFormat::Webp)
        } else {
            None
        }
    }

    pub fn media_type(self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Png => "image/png",
            ImageFormat::Gif => "image/gif",
            ImageFormat::Webp => "image/webp",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "jpg",
            ImageFormat::Png => "png",
            ImageFormat::Gif => "gif",
            ImageFormat::Webp => "webp",
        }
    }
}

/// Ensure a directory exists and is writable.
///
/// Creates the directory if needed, then creates and removes a probe file.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn ensure_writable_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path)
        .await
        .map_err(|e| Error::io(path, e))?;

    let probe_path = path.join("..__probe_write__");
    match stdfs::File::create(&probe_path) {
        Ok(_) => {
            let _ = stdfs::remove_file(&probe_path);
            info!("Scratch directory is writable");
            Ok(())
        }
        Err(e) => Err(Error::io(probe_path, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_title_replaces_separators() {
        assert_eq!(sanitize_title("a/b\\c"), "a_b_c");
        assert_eq!(sanitize_title("Q: why? <now> | \"here\" *"), "Q_ why_ _now_ _ _here_ _");
    }

    #[test]
    fn test_sanitize_title_keeps_cjk() {
        assert_eq!(sanitize_title("中国经济放缓"), "中国经济放缓");
        assert_eq!(sanitize_title("特朗普：关税"), "特朗普：关税");
    }

    #[test]
    fn test_sanitize_title_strips_dots_and_controls() {
        assert_eq!(sanitize_title("../etc/passwd"), "_etc_passwd");
        assert_eq!(sanitize_title("line\nbreak"), "line_break");
        assert_eq!(sanitize_title("  padded  "), "padded");
    }

    #[test]
    fn test_sanitize_title_empty() {
        assert_eq!(sanitize_title(""), "untitled");
        assert_eq!(sanitize_title("  ..  "), "untitled");
    }

    #[test]
    fn test_sanitize_title_caps_length() {
        let long = "长".repeat(500);
        assert_eq!(sanitize_title(&long).chars().count(), MAX_STEM_CHARS);
    }

    #[test]
    fn test_xml_safe_strips_forbidden_characters() {
        assert_eq!(xml_safe("T\u{1}"), "T");
        assert_eq!(xml_safe("\nx\u{8}y\u{B}\u{C}\u{1F}"), "\nxy");
        assert_eq!(xml_safe("a\u{FFFE}b\u{FFFF}"), "ab");
    }

    #[test]
    fn test_xml_safe_keeps_valid_text() {
        let text = "\t中文 & <tag>\r\n\u{7F}😀";
        assert!(matches!(xml_safe(text), Cow::Borrowed(t) if t == text));
    }

    #[test]
    fn test_truncate_for_log_short_string() {
        assert_eq!(truncate_for_log("Hello, world!", 100), "Hello, world!");
    }

    #[test]
    fn test_truncate_for_log_long_string() {
        let s = "a".repeat(500);
        let result = truncate_for_log(&s, 100);
        assert!(result.starts_with(&"a".repeat(100)));
        assert!(result.contains("…(+400 bytes)"));
    }

    #[test]
    fn test_truncate_for_log_multibyte() {
        // Each character is three bytes; byte 4 is not a boundary.
        let result = truncate_for_log("中文内容", 4);
        assert_eq!(result, "中…(+9 bytes)");
    }

    #[test]
    fn test_image_sniffing() {
        assert_eq!(ImageFormat::sniff(&[0xFF, 0xD8, 0xFF, 0xE0]), Some(ImageFormat::Jpeg));
        assert_eq!(ImageFormat::sniff(b"\x89PNG\r\n\x1a\n...."), Some(ImageFormat::Png));
        assert_eq!(ImageFormat::sniff(b"GIF89a..."), Some(ImageFormat::Gif));
        assert_eq!(ImageFormat::sniff(b"RIFF\0\0\0\0WEBPVP8 "), Some(ImageFormat::Webp));
        assert_eq!(ImageFormat::sniff(b"<!DOCTYPE html>"), None);
        assert_eq!(ImageFormat::sniff(b""), None);
    }

    #[test]
    fn test_image_format_names() {
        assert_eq!(ImageFormat::Jpeg.media_type(), "image/jpeg");
        assert_eq!(ImageFormat::Jpeg.extension(), "jpg");
        assert_eq!(ImageFormat::Png.extension(), "png");
    }

    #[tokio::test]
    async fn test_ensure_writable_dir_creates_missing() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        ensure_writable_dir(&nested).await.unwrap();
        assert!(nested.is_dir());
        assert!(!nested.join("..__probe_write__").exists());
    }
}
