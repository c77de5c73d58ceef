use crate::core::DirectoryEntry;
use indexmap::IndexSet;
use std::path::{Path, PathBuf};

pub const ALLOWED_EXTENSIONS: [&str; 3] = ["mp3", "m4a", "wav"];
pub const MIN_DURATION_SECS: u64 = 10;
pub const MAX_DURATION_SECS: u64 = 5 * 60;
pub const MAX_FILE_MB: u64 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Toggle {
    Added,
    Removed,
    Ignored,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SelectionError {
    #[error("only mp3, m4a and wav files can be selected")]
    UnsupportedExtension(PathBuf),
}

/// Files marked for cloning, kept in the order they were marked.
#[derive(Debug, Clone, Default)]
pub struct SelectionSet {
    paths: IndexSet<PathBuf>,
}

impl SelectionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or removes a file. Directories are ignored; files with other
    /// extensions are rejected without touching the set.
    pub fn toggle(&mut self, entry: &DirectoryEntry) -> Result<Toggle, SelectionError> {
        if entry.is_dir {
            return Ok(Toggle::Ignored);
        }
        if !is_allowed(&entry.path) {
            return Err(SelectionError::UnsupportedExtension(entry.path.clone()));
        }
        if self.paths.shift_remove(&entry.path) {
            Ok(Toggle::Removed)
        } else {
            self.paths.insert(entry.path.clone());
            Ok(Toggle::Added)
        }
    }

    pub fn is_selected(&self, path: &Path) -> bool {
        self.paths.contains(path)
    }

    pub fn ordered_paths(&self) -> Vec<PathBuf> {
        self.paths.iter().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PathBuf> {
        self.paths.iter()
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn clear(&mut self) {
        self.paths.clear();
    }
}

/// Upload limits for a clone sample, shown in the browser header.
pub fn requirements() -> String {
    format!(
        "audio: {} · {} s to {} min · max {} MB",
        ALLOWED_EXTENSIONS.join("/"),
        MIN_DURATION_SECS,
        MAX_DURATION_SECS / 60,
        MAX_FILE_MB
    )
}

pub fn is_allowed(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            ALLOWED_EXTENSIONS
                .iter()
                .any(|allowed| ext.eq_ignore_ascii_case(allowed))
        })
        .unwrap_or(false)
}
