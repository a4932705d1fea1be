//! Files written to the scratch directory.
//!
//! # Submodules
//!
//! - [`json`]: best-effort JSON debug snapshot per article
//! - [`cover`]: cover image download
//! - [`epub`]: EPUB packaging
//!
//! # Output Structure
//!
//! All files sit flat in one directory, named after the sanitized title:
//!
//! ```text
//! scratch_dir/
//! ├── 标题.json
//! ├── 标题_cover.jpg
//! └── 标题.epub
//! ```

pub mod cover;
pub mod epub;
pub mod json;

use crate::utils::sanitize_title;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

/// Paths of every file produced for one article title.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticlePaths {
    pub snapshot: PathBuf,
    pub cover: PathBuf,
    pub ebook: PathBuf,
}

impl ArticlePaths {
    fn from_stem(dir: &Path, stem: &str) -> Self {
        Self {
            snapshot: dir.join(format!("{stem}.json")),
            cover: dir.join(format!("{stem}_cover.jpg")),
            ebook: dir.join(format!("{stem}.epub")),
        }
    }
}

/// Allocates file stems in one output directory.
///
/// The same title always maps to the same stem. Distinct titles that
/// sanitize to the same stem (`A/B` and `A_B`) get a numeric suffix, so no
/// article overwrites another one's files. Stems are compared
/// case-insensitively to stay distinct on case-folding file systems.
#[derive(Debug)]
pub struct OutputNames {
    dir: PathBuf,
    by_title: HashMap<String, String>,
    taken: HashSet<String>,
}

impl OutputNames {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            by_title: HashMap::new(),
            taken: HashSet::new(),
        }
    }

    /// Paths for `title`, reserving a fresh stem the first time it is seen.
    pub fn paths_for(&mut self, title: &str) -> ArticlePaths {
        if let Some(stem) = self.by_title.get(title) {
            return ArticlePaths::from_stem(&self.dir, stem);
        }

        let base = sanitize_title(title);
        let mut stem = base.clone();
        let mut n = 2;
        while !self.taken.insert(stem.to_lowercase()) {
            stem = format!("{base}-{n}");
            n += 1;
        }
        self.by_title.insert(title.to_string(), stem.clone());
        ArticlePaths::from_stem(&self.dir, &stem)
    }
}
