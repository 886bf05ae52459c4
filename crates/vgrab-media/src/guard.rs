//! Scoped ownership of downloaded temp files.

use std::path::{Path, PathBuf};

use tracing::debug;

/// RAII owner of a temp file produced by a downloader.
///
/// The file is deleted when the guard drops, unless ownership was taken
/// with [`TempFileGuard::into_path`]. This covers every exit path of the
/// download→validate→upload pipeline, including future cancellation.
#[derive(Debug)]
pub struct TempFileGuard {
    path: Option<PathBuf>,
}

impl TempFileGuard {
    /// Take ownership of `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    /// Path of the guarded file.
    pub fn path(&self) -> &Path {
        self.path.as_deref().expect("guard already released")
    }

    /// Release ownership without deleting; the caller keeps the file.
    pub fn into_path(mut self) -> PathBuf {
        self.path.take().expect("guard already released")
    }

    /// Delete the file now instead of at drop.
    pub fn cleanup(mut self) {
        if let Some(path) = self.path.take() {
            remove(&path);
        }
    }
}

impl Drop for TempFileGuard {
    fn drop(&mut self) {
        if let Some(path) = self.path.take() {
            remove(&path);
        }
    }
}

fn remove(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => debug!(path = %path.display(), "removed temp file"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => debug!(path = %path.display(), "failed to remove temp file: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drop_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.mp4");
        std::fs::write(&path, b"data").unwrap();

        {
            let _guard = TempFileGuard::new(&path);
        }
        assert!(!path.exists());
    }

    #[test]
    fn test_into_path_keeps_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.mp4");
        std::fs::write(&path, b"data").unwrap();

        let guard = TempFileGuard::new(&path);
        let kept = guard.into_path();
        assert!(kept.exists());
    }

    #[test]
    fn test_drop_tolerates_missing_file() {
        let _guard = TempFileGuard::new("/nonexistent/clip.mp4");
    }
}
