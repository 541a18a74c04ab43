use crate::config::StorageConfig;
use anyhow::Result;
use log::warn;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Extension of every image this service writes
pub const IMAGE_EXTENSION: &str = "jpeg";

/// Image and video directories shared by all handlers.
///
/// Concurrent handlers never coordinate: every file gets a fresh UUID name.
#[derive(Debug, Clone)]
pub struct MediaStore {
    images_dir: PathBuf,
    videos_dir: PathBuf,
}

impl MediaStore {
    pub fn new(images_dir: impl Into<PathBuf>, videos_dir: impl Into<PathBuf>) -> Self {
        Self {
            images_dir: images_dir.into(),
            videos_dir: videos_dir.into(),
        }
    }

    pub fn from_config(config: &StorageConfig) -> Self {
        Self::new(config.images_path(), config.videos_path())
    }

    /// Create the image and video directories if missing
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.images_dir)?;
        std::fs::create_dir_all(&self.videos_dir)?;
        Ok(())
    }

    pub fn images_dir(&self) -> &Path {
        &self.images_dir
    }

    pub fn videos_dir(&self) -> &Path {
        &self.videos_dir
    }

    /// Fresh, collision-free image path
    pub fn new_image_path(&self) -> PathBuf {
        self.images_dir
            .join(format!("{}.{}", Uuid::new_v4(), IMAGE_EXTENSION))
    }

    /// Fresh, collision-free video path
    pub fn new_video_path(&self) -> PathBuf {
        self.videos_dir.join(format!("{}.mp4", Uuid::new_v4()))
    }

    /// Working copy `{batch}_{index}.jpeg`; indexes start at 1
    pub fn sequence_frame_path(&self, batch: &str, index: usize) -> PathBuf {
        self.images_dir
            .join(format!("{}_{}.{}", batch, index, IMAGE_EXTENSION))
    }

    /// ffmpeg input pattern matching `sequence_frame_path`
    pub fn sequence_pattern(&self, batch: &str) -> PathBuf {
        self.images_dir
            .join(format!("{}_%d.{}", batch, IMAGE_EXTENSION))
    }
}

/// Files removed when the guard goes out of scope, on every exit path
#[derive(Debug, Default)]
pub struct ScratchFiles {
    paths: Vec<PathBuf>,
}

impl ScratchFiles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn track(&mut self, path: impl Into<PathBuf>) {
        self.paths.push(path.into());
    }

    /// Stop tracking `path`; it survives the guard
    pub fn keep(&mut self, path: &Path) {
        self.paths.retain(|tracked| tracked != path);
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// Remove every tracked file without blocking the runtime
    pub async fn clear(mut self) {
        for path in std::mem::take(&mut self.paths) {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!("Failed to remove scratch file {:?}: {}", path, e),
            }
        }
    }
}

impl Drop for ScratchFiles {
    // Fallback for early returns; success paths call `clear`
    fn drop(&mut self) {
        for path in &self.paths {
            match std::fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!("Failed to remove scratch file {:?}: {}", path, e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_paths_match_pattern() {
        let store = MediaStore::new("/data/images", "/data/videos");
        assert_eq!(
            store.sequence_frame_path("batch", 1),
            PathBuf::from("/data/images/batch_1.jpeg")
        );
        assert_eq!(
            store.sequence_pattern("batch"),
            PathBuf::from("/data/images/batch_%d.jpeg")
        );
        assert_ne!(store.new_image_path(), store.new_image_path());
        assert_eq!(store.new_video_path().extension().unwrap(), "mp4");
    }

    #[test]
    fn test_scratch_files_removed_on_drop() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let kept = dir.path().join("kept.jpeg");
        let scratch = dir.path().join("scratch.jpeg");
        std::fs::write(&kept, b"kept")?;
        std::fs::write(&scratch, b"scratch")?;

        {
            let mut files = ScratchFiles::new();
            files.track(&scratch);
            files.track(&kept);
            files.track(dir.path().join("never-written.jpeg"));
            files.keep(&kept);
            assert_eq!(files.paths().len(), 2);
        }

        assert!(kept.exists());
        assert!(!scratch.exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_clear_removes_tracked_files() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let frame = dir.path().join("batch_1.jpeg");
        std::fs::write(&frame, b"frame")?;

        let mut files = ScratchFiles::new();
        files.track(&frame);
        files.track(dir.path().join("batch_2.jpeg"));
        files.clear().await;

        assert!(!frame.exists());
        Ok(())
    }

    #[test]
    fn test_ensure_dirs() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let store = MediaStore::new(dir.path().join("images"), dir.path().join("videos"));
        store.ensure_dirs()?;
        assert!(store.images_dir().is_dir());
        assert!(store.videos_dir().is_dir());
        Ok(())
    }
}
