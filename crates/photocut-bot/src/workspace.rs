//! Download directory bookkeeping.
//!
//! At most one downloaded source video is kept on disk, named
//! `<itemId>.mp4`. Excerpts are written next to it as `<itemId>_cut.mp4`
//! and removed once sent.
//!
//! The download directory may be shared with other files, so only files
//! this bot provably created are ever deleted. The retained id is recorded
//! in a marker file so a restart picks up where the last run stopped.

use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use photocut_core::is_valid_item_id;

const SOURCE_EXTENSION: &str = "mp4";
const EXCERPT_SUFFIX: &str = "_cut";

/// Holds the id of the retained source video.
const RETAINED_MARKER: &str = ".photocut-retained";

/// Tracks the single retained source video.
#[derive(Debug)]
pub struct SourceCache {
    dir: PathBuf,
    retained: Option<String>,
}

impl SourceCache {
    /// Creates the download directory if needed and adopts the source
    /// recorded by a previous run.
    ///
    /// A leftover excerpt of that source is deleted. Nothing else in the
    /// directory is touched.
    pub async fn open(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;

        let mut cache = Self {
            dir,
            retained: None,
        };

        let recorded = match tokio::fs::read_to_string(cache.marker_path()).await {
            Ok(content) => content.trim().to_string(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(cache),
            Err(e) => return Err(e),
        };

        if !is_valid_item_id(&recorded) {
            warn!(
                path = %cache.marker_path().display(),
                "ignoring malformed retained source marker"
            );
            return Ok(cache);
        }

        let excerpt = cache.excerpt_path(&recorded);
        if tokio::fs::try_exists(&excerpt).await? {
            remove_if_exists(&excerpt).await?;
            debug!(path = %excerpt.display(), "removed leftover excerpt");
        }

        info!(
            item_id = %recorded,
            downloaded = tokio::fs::try_exists(cache.source_path(&recorded)).await?,
            "adopted retained source video"
        );
        cache.retained = Some(recorded);
        Ok(cache)
    }

    /// Returns the download directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the id of the retained source, if any.
    pub fn retained(&self) -> Option<&str> {
        self.retained.as_deref()
    }

    /// Path of the source file for `item_id`.
    pub fn source_path(&self, item_id: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", item_id, SOURCE_EXTENSION))
    }

    /// Path of the excerpt file for `item_id`.
    pub fn excerpt_path(&self, item_id: &str) -> PathBuf {
        self.dir
            .join(format!("{}{}.{}", item_id, EXCERPT_SUFFIX, SOURCE_EXTENSION))
    }

    /// Makes `item_id` the retained source and returns its path.
    ///
    /// The previously retained file is deleted when it belongs to another
    /// item. The returned path may not exist yet.
    pub async fn retain(&mut self, item_id: &str) -> io::Result<PathBuf> {
        if let Some(previous) = self.retained.as_deref()
            && previous != item_id
        {
            remove_if_exists(&self.source_path(previous)).await?;
            info!(item_id = %previous, "deleted previous source video");
        }

        if self.retained.as_deref() != Some(item_id) {
            tokio::fs::write(self.marker_path(), item_id).await?;
            self.retained = Some(item_id.to_string());
        }
        Ok(self.source_path(item_id))
    }

    fn marker_path(&self) -> PathBuf {
        self.dir.join(RETAINED_MARKER)
    }
}

/// Deletes a file, treating "not found" as success.
pub async fn remove_if_exists(path: &Path) -> io::Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to delete file");
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[tokio::test]
    async fn open_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SourceCache::open(dir.path().join("downloads")).await.unwrap();
        assert!(cache.dir().is_dir());
        assert!(cache.retained().is_none());
    }

    #[tokio::test]
    async fn open_leaves_unrecorded_files_alone() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["holiday.mp4", "clip_cut.mp4", "notes.txt"] {
            fs::write(dir.path().join(name), "keep").unwrap();
        }

        let cache = SourceCache::open(dir.path()).await.unwrap();

        assert!(cache.retained().is_none());
        for name in ["holiday.mp4", "clip_cut.mp4", "notes.txt"] {
            assert!(dir.path().join(name).exists(), "{} was deleted", name);
        }
    }

    #[tokio::test]
    async fn open_adopts_recorded_source() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(RETAINED_MARKER), "AF1QipA\n").unwrap();
        fs::write(dir.path().join("AF1QipA.mp4"), "video").unwrap();
        fs::write(dir.path().join("AF1QipA_cut.mp4"), "excerpt").unwrap();
        fs::write(dir.path().join("AF1QipB.mp4"), "someone else's").unwrap();

        let cache = SourceCache::open(dir.path()).await.unwrap();

        assert_eq!(cache.retained(), Some("AF1QipA"));
        assert!(dir.path().join("AF1QipA.mp4").exists());
        assert!(!dir.path().join("AF1QipA_cut.mp4").exists());
        assert!(dir.path().join("AF1QipB.mp4").exists());
    }

    #[tokio::test]
    async fn open_ignores_malformed_marker() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(RETAINED_MARKER), "../escape").unwrap();

        let cache = SourceCache::open(dir.path()).await.unwrap();
        assert!(cache.retained().is_none());
    }

    #[test]
    fn paths() {
        let cache = SourceCache {
            dir: PathBuf::from("downloads"),
            retained: None,
        };
        assert_eq!(cache.source_path("abc"), PathBuf::from("downloads/abc.mp4"));
        assert_eq!(cache.excerpt_path("abc"), PathBuf::from("downloads/abc_cut.mp4"));
    }

    #[tokio::test]
    async fn retain_same_id_keeps_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = SourceCache::open(dir.path()).await.unwrap();

        let path = cache.retain("abc").await.unwrap();
        fs::write(&path, b"video").unwrap();

        let again = cache.retain("abc").await.unwrap();
        assert_eq!(again, path);
        assert!(path.exists());
    }

    #[tokio::test]
    async fn retain_other_id_deletes_previous() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = SourceCache::open(dir.path()).await.unwrap();

        let first = cache.retain("abc").await.unwrap();
        fs::write(&first, b"video").unwrap();

        let second = cache.retain("xyz").await.unwrap();
        assert!(!first.exists());
        assert_eq!(cache.retained(), Some("xyz"));
        assert_eq!(second, dir.path().join("xyz.mp4"));
    }

    #[tokio::test]
    async fn retained_source_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = SourceCache::open(dir.path()).await.unwrap();
        let first = cache.retain("abc").await.unwrap();
        fs::write(&first, b"video").unwrap();
        drop(cache);

        let mut cache = SourceCache::open(dir.path()).await.unwrap();
        assert_eq!(cache.retained(), Some("abc"));
        assert!(first.exists());

        cache.retain("xyz").await.unwrap();
        assert!(!first.exists());
        assert_eq!(
            fs::read_to_string(dir.path().join(RETAINED_MARKER)).unwrap(),
            "xyz"
        );
    }

    #[tokio::test]
    async fn retain_ignores_missing_previous() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = SourceCache::open(dir.path()).await.unwrap();

        cache.retain("never-downloaded").await.unwrap();
        cache.retain("abc").await.unwrap();
        assert_eq!(cache.retained(), Some("abc"));
    }
}
