use std::path::{Path, PathBuf};

use uuid::Uuid;

/// Short, collision-free temp file name: `<prefix>_<uuid>.<ext>`.
pub fn unique_temp_path(dir: &Path, prefix: &str, ext: Option<&str>) -> PathBuf {
    let id = Uuid::new_v4().simple().to_string();
    match ext {
        Some(ext) if !ext.is_empty() => dir.join(format!("{}_{}.{}", prefix, id, ext)),
        _ => dir.join(format!("{}_{}", prefix, id)),
    }
}

/// Files a run created and must remove on every exit path.
///
/// Cleanup runs explicitly at the end of a run and again on drop, so an
/// unwinding panic still removes everything that was tracked.
#[derive(Debug, Default)]
pub struct TempArtifacts {
    paths: Vec<PathBuf>,
}

impl TempArtifacts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn track(&mut self, path: impl Into<PathBuf>) {
        let path = path.into();
        if !self.paths.contains(&path) {
            self.paths.push(path);
        }
    }

    /// Stop tracking `path` without deleting it.
    pub fn release(&mut self, path: &Path) {
        self.paths.retain(|p| p != path);
    }

    /// Delete `path` now and stop tracking it.
    pub fn remove(&mut self, path: &Path) {
        remove_quietly(path);
        self.release(path);
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Delete every tracked path. Returns how many were actually removed.
    pub fn cleanup(&mut self) -> usize {
        let removed = self
            .paths
            .drain(..)
            .filter(|p| remove_quietly(p))
            .count();
        if removed > 0 {
            tracing::debug!(removed, "removed temp artifacts");
        }
        removed
    }
}

impl Drop for TempArtifacts {
    fn drop(&mut self) {
        self.cleanup();
    }
}

/// Remove a file if it exists. A failure is logged, never raised: cleanup
/// must keep going through the remaining artifacts.
pub fn remove_quietly(path: &Path) -> bool {
    match std::fs::remove_file(path) {
        Ok(()) => true,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
        Err(e) => {
            tracing::warn!(path = %path.display(), "failed to remove temp file: {}", e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn temp_names_are_unique_and_short() {
        let dir = Path::new("/tmp");
        let a = unique_temp_path(dir, "cf", Some("mp4"));
        let b = unique_temp_path(dir, "cf", Some("mp4"));
        assert_ne!(a, b);
        let name = a.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("cf_") && name.ends_with(".mp4"));
        assert!(name.len() < 45, "{name}");
        assert!(unique_temp_path(dir, "cf", None).extension().is_none());
    }

    #[test]
    fn cleanup_removes_tracked_files_only() {
        let dir = TempDir::new().unwrap();
        let tracked = dir.path().join("a.tmp");
        let kept = dir.path().join("b.tmp");
        std::fs::write(&tracked, b"1").unwrap();
        std::fs::write(&kept, b"2").unwrap();

        let mut temps = TempArtifacts::new();
        temps.track(&tracked);
        temps.track(&tracked);
        temps.track(dir.path().join("never-created.tmp"));
        assert_eq!(temps.paths().len(), 2);

        assert_eq!(temps.cleanup(), 1);
        assert!(!tracked.exists());
        assert!(kept.exists());
        assert!(temps.is_empty());
    }

    #[test]
    fn drop_cleans_up() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("c.tmp");
        std::fs::write(&path, b"x").unwrap();
        {
            let mut temps = TempArtifacts::new();
            temps.track(&path);
        }
        assert!(!path.exists());
    }

    #[test]
    fn released_paths_survive() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("final.mp4");
        std::fs::write(&path, b"x").unwrap();
        let mut temps = TempArtifacts::new();
        temps.track(&path);
        temps.release(&path);
        drop(temps);
        assert!(path.exists());
    }
}
