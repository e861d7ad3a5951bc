//! Temp-artifact lifecycle for intermediate audio files.
//!
//! Every intermediate file a request creates is wrapped in a [`TempArtifact`]
//! guard so it is removed on every exit path. A janitor sweep additionally
//! collects same-prefixed orphans left behind by crashed processes.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub const ARTIFACT_PREFIX: &str = "audio_";

static SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Well-known temp subdirectory shared by all requests; created on demand.
pub fn service_temp_dir(subdir: &str) -> std::io::Result<PathBuf> {
    let dir = std::env::temp_dir().join(subdir);
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Unique artifact path: fixed prefix, millisecond timestamp plus an
/// in-process sequence number so concurrent calls in the same millisecond
/// cannot collide, and the source extension (canonical `.wav` by default).
pub fn timestamped_artifact_path(dir: &Path, source: Option<&Path>) -> PathBuf {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis())
        .unwrap_or(0);
    let seq = SEQUENCE.fetch_add(1, Ordering::Relaxed);
    let ext = source
        .and_then(|path| path.extension())
        .and_then(|ext| ext.to_str())
        .unwrap_or("wav");
    dir.join(format!("{ARTIFACT_PREFIX}{millis}_{seq}.{ext}"))
}

/// Owns one intermediate file and removes it when dropped.
#[derive(Debug)]
pub struct TempArtifact {
    path: PathBuf,
}

impl TempArtifact {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempArtifact {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!(path = %self.path.display(), "temp artifact removed"),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {}
            Err(error) => {
                tracing::warn!(path = %self.path.display(), %error, "failed to remove temp artifact");
            }
        }
    }
}

/// Remove prefixed artifacts older than `ttl`; returns how many were removed.
///
/// The TTL keeps the sweep from racing an in-flight request's own files.
pub fn sweep_stale_artifacts(dir: &Path, ttl: Duration) -> usize {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return 0;
    };

    let mut removed = 0;
    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if !name.starts_with(ARTIFACT_PREFIX) {
            continue;
        }
        let stale = entry
            .metadata()
            .and_then(|meta| meta.modified())
            .ok()
            .and_then(|modified| SystemTime::now().duration_since(modified).ok())
            .is_some_and(|age| age > ttl);
        if stale && std::fs::remove_file(entry.path()).is_ok() {
            tracing::debug!(path = %entry.path().display(), "stale artifact swept");
            removed += 1;
        }
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifact_is_removed_on_drop() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = timestamped_artifact_path(dir.path(), None);
        std::fs::write(&path, b"payload").expect("write");

        {
            let _artifact = TempArtifact::new(path.clone());
            assert!(path.exists());
        }
        assert!(!path.exists());
    }

    #[test]
    fn drop_tolerates_already_removed_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = timestamped_artifact_path(dir.path(), None);
        // Never created on disk; drop must not panic.
        let _artifact = TempArtifact::new(path);
    }

    #[test]
    fn paths_are_unique_within_one_millisecond() {
        let dir = tempfile::tempdir().expect("tempdir");
        let first = timestamped_artifact_path(dir.path(), None);
        let second = timestamped_artifact_path(dir.path(), None);
        assert_ne!(first, second);
    }

    #[test]
    fn extension_follows_source() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = timestamped_artifact_path(dir.path(), Some(Path::new("upload.webm")));
        assert_eq!(path.extension().and_then(|e| e.to_str()), Some("webm"));
    }

    #[test]
    fn sweep_removes_only_stale_prefixed_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let stale = dir.path().join(format!("{ARTIFACT_PREFIX}1_0.wav"));
        let unrelated = dir.path().join("keep.wav");
        std::fs::write(&stale, b"old").expect("write");
        std::fs::write(&unrelated, b"keep").expect("write");

        // Zero TTL makes every prefixed file stale; fresh-file behavior is
        // covered by the nonzero-TTL assertion below.
        let removed = sweep_stale_artifacts(dir.path(), Duration::ZERO);
        assert_eq!(removed, 1);
        assert!(!stale.exists());
        assert!(unrelated.exists());

        let fresh = dir.path().join(format!("{ARTIFACT_PREFIX}2_0.wav"));
        std::fs::write(&fresh, b"new").expect("write");
        let removed = sweep_stale_artifacts(dir.path(), Duration::from_secs(3_600));
        assert_eq!(removed, 0);
        assert!(fresh.exists());
    }
}
