use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::fs;
use tokio_stream::wrappers::ReadDirStream;
use tokio_stream::StreamExt;

pub const PARENT_NAME: &str = "..";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub name: String,
    pub path: PathBuf,
    pub is_dir: bool,
    pub is_parent: bool,
}

impl DirectoryEntry {
    async fn from_dir_entry(entry: fs::DirEntry) -> Result<Self, std::io::Error> {
        let path = entry.path();
        let mut is_dir = entry.file_type().await?.is_dir();
        if !is_dir {
            // Follow symlinks so a link to a directory can be entered.
            is_dir = fs::metadata(&path)
                .await
                .map(|metadata| metadata.is_dir())
                .unwrap_or(false);
        }
        Ok(Self {
            name: entry.file_name().to_string_lossy().to_string(),
            path,
            is_dir,
            is_parent: false,
        })
    }

    fn parent_of(path: &Path) -> Option<Self> {
        let parent = path.parent()?;
        if parent == path {
            return None;
        }
        Some(Self {
            name: PARENT_NAME.to_string(),
            path: parent.to_path_buf(),
            is_dir: true,
            is_parent: true,
        })
    }

    pub fn label(&self) -> String {
        if self.is_dir && !self.is_parent {
            format!("{}/", self.name)
        } else {
            self.name.clone()
        }
    }
}

/// One full, single-level snapshot of a directory.
#[derive(Debug, Clone)]
pub struct DirListing {
    pub path: PathBuf,
    pub entries: Vec<DirectoryEntry>,
    pub modified: Option<SystemTime>,
}

#[derive(Debug, thiserror::Error)]
pub enum ListError {
    #[error("not a directory: {}", .0.display())]
    NotADirectory(PathBuf),
    #[error("cannot open {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Lists `path` non-recursively: a `..` entry first (unless `path` is a root),
/// then directories, then files, each group ordered case-insensitively.
pub async fn list_directory(path: &Path) -> Result<DirListing, ListError> {
    let read_err = |source| ListError::Read {
        path: path.to_path_buf(),
        source,
    };
    let metadata = fs::metadata(path).await.map_err(read_err)?;
    if !metadata.is_dir() {
        return Err(ListError::NotADirectory(path.to_path_buf()));
    }

    let mut stream = ReadDirStream::new(fs::read_dir(path).await.map_err(read_err)?);
    let mut entries = Vec::new();
    while let Some(entry) = stream.next().await {
        let entry = entry.map_err(read_err)?;
        // Entries that vanish between readdir and stat are skipped.
        if let Ok(entry) = DirectoryEntry::from_dir_entry(entry).await {
            entries.push(entry);
        }
    }
    sort_entries(&mut entries);

    if let Some(parent) = DirectoryEntry::parent_of(path) {
        entries.insert(0, parent);
    }

    Ok(DirListing {
        path: path.to_path_buf(),
        entries,
        modified: metadata.modified().ok(),
    })
}

/// Modification time of a directory, used to decide whether a reload is needed.
pub async fn directory_modified(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).await.ok()?.modified().ok()
}

/// Lists `path` again unless its modification time still equals `since`.
/// `Ok(None)` means the listing taken at `since` is still current.
pub async fn reload_if_modified(
    path: &Path,
    since: Option<SystemTime>,
) -> Result<Option<DirListing>, ListError> {
    if let Some(since) = since {
        if directory_modified(path).await == Some(since) {
            return Ok(None);
        }
    }
    list_directory(path).await.map(Some)
}

pub fn sort_entries(entries: &mut [DirectoryEntry]) {
    entries.sort_by(|a, b| match (a.is_dir, b.is_dir) {
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        _ => a
            .name
            .to_lowercase()
            .cmp(&b.name.to_lowercase())
            .then_with(|| a.name.cmp(&b.name)),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs as std_fs;
    use std::time::Duration;
    use tempfile::TempDir;

    fn names(listing: &DirListing) -> Vec<&str> {
        listing.entries.iter().map(|entry| entry.name.as_str()).collect()
    }

    #[tokio::test]
    async fn files_sort_case_insensitively_after_parent() {
        let temp = TempDir::new().unwrap();
        for name in ["b.wav", "A.txt", "a.mp3"] {
            std_fs::write(temp.path().join(name), b"x").unwrap();
        }

        let listing = list_directory(temp.path()).await.unwrap();
        assert_eq!(names(&listing), vec!["..", "a.mp3", "A.txt", "b.wav"]);

        let parent = &listing.entries[0];
        assert!(parent.is_parent && parent.is_dir);
        assert_eq!(parent.path, temp.path().parent().unwrap());
    }

    #[tokio::test]
    async fn directories_come_before_files() {
        let temp = TempDir::new().unwrap();
        std_fs::write(temp.path().join("aaa.mp3"), b"x").unwrap();
        std_fs::create_dir(temp.path().join("Zeta")).unwrap();
        std_fs::create_dir(temp.path().join("beta")).unwrap();

        let listing = list_directory(temp.path()).await.unwrap();
        assert_eq!(names(&listing), vec!["..", "beta", "Zeta", "aaa.mp3"]);
        assert!(listing.entries[1].is_dir);
        assert!(!listing.entries[3].is_dir);
        assert_eq!(listing.entries[1].label(), "beta/");
    }

    #[tokio::test]
    async fn listing_is_single_level() {
        let temp = TempDir::new().unwrap();
        let child = temp.path().join("child");
        std_fs::create_dir(&child).unwrap();
        std_fs::write(child.join("nested.wav"), b"x").unwrap();

        let listing = list_directory(temp.path()).await.unwrap();
        assert_eq!(names(&listing), vec!["..", "child"]);
    }

    #[tokio::test]
    async fn listing_a_file_is_rejected() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("song.mp3");
        std_fs::write(&file, b"x").unwrap();

        let err = list_directory(&file).await.unwrap_err();
        assert!(matches!(err, ListError::NotADirectory(_)));
    }

    #[tokio::test]
    async fn missing_directory_is_a_read_error() {
        let temp = TempDir::new().unwrap();
        let err = list_directory(&temp.path().join("gone")).await.unwrap_err();
        assert!(matches!(err, ListError::Read { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn root_has_no_parent_entry() {
        let listing = list_directory(Path::new("/")).await.unwrap();
        assert!(listing.entries.iter().all(|entry| !entry.is_parent));
    }

    #[tokio::test]
    async fn modification_time_is_none_for_missing_paths() {
        let temp = TempDir::new().unwrap();
        assert!(directory_modified(temp.path()).await.is_some());
        assert!(directory_modified(&temp.path().join("gone")).await.is_none());
    }

    #[tokio::test]
    async fn untouched_directory_is_not_reloaded() {
        let temp = TempDir::new().unwrap();
        std_fs::write(temp.path().join("a.mp3"), b"x").unwrap();
        let listing = list_directory(temp.path()).await.unwrap();

        let reloaded = reload_if_modified(temp.path(), listing.modified).await.unwrap();
        assert!(reloaded.is_none());
    }

    #[tokio::test]
    async fn changed_directory_is_listed_again() {
        let temp = TempDir::new().unwrap();
        std_fs::write(temp.path().join("a.mp3"), b"x").unwrap();
        let listing = list_directory(temp.path()).await.unwrap();
        let since = listing.modified.unwrap();

        std_fs::write(temp.path().join("b.wav"), b"y").unwrap();
        // Coarse filesystem clocks may not tick between the two writes.
        std_fs::File::open(temp.path())
            .unwrap()
            .set_modified(since + Duration::from_secs(5))
            .unwrap();

        let reloaded = reload_if_modified(temp.path(), Some(since))
            .await
            .unwrap()
            .expect("a changed directory should be listed again");
        assert_eq!(names(&reloaded), vec!["..", "a.mp3", "b.wav"]);
    }

    #[tokio::test]
    async fn missing_timestamp_always_lists() {
        let temp = TempDir::new().unwrap();
        let reloaded = reload_if_modified(temp.path(), None).await.unwrap();
        assert!(reloaded.is_some());
    }
}
