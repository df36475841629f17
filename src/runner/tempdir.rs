use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Recognisable prefix for per-job scratch directories.
pub const TEMP_PREFIX: &str = "codeforge_";

/// `{ts}_{pid}_{seq}` keeps concurrently-created directory names unique
/// even within the same nanosecond timestamp.
static DIR_COUNTER: AtomicU64 = AtomicU64::new(0);

/// One per-job scratch directory, owned exclusively by the runner for the
/// lifetime of a job. Removed recursively on every exit path via `Drop`.
pub struct TempJobDir {
    path: PathBuf,
}

impl TempJobDir {
    /// Create a fresh `<tmp>/codeforge_<ts>_<pid>_<seq>` directory.
    pub async fn create() -> std::io::Result<Self> {
        let ts = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        let pid = std::process::id();
        let seq = DIR_COUNTER.fetch_add(1, Ordering::Relaxed);
        let path = std::env::temp_dir().join(format!("{TEMP_PREFIX}{ts}_{pid}_{seq}"));
        tokio::fs::create_dir_all(&path).await?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempJobDir {
    fn drop(&mut self) {
        // Best-effort: removal failing here must never fail the job. Use the
        // blocking std call since Drop can't await; the directory is small
        // (one job's worth of source/binary) so this is not disruptive.
        let _ = std::fs::remove_dir_all(&self.path);
    }
}

/// Purge any stale `codeforge_*` directories left behind by a previous,
/// uncleanly-terminated process. Called once at service start.
pub async fn purge_stale() {
    let root = std::env::temp_dir();
    let mut entries = match tokio::fs::read_dir(&root).await {
        Ok(e) => e,
        Err(e) => {
            tracing::warn!(error = %e, "failed to scan temp root for stale directories");
            return;
        }
    };

    while let Ok(Some(entry)) = entries.next_entry().await {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if !name.starts_with(TEMP_PREFIX) {
            continue;
        }
        let path = entry.path();
        match tokio::fs::remove_dir_all(&path).await {
            Ok(()) => tracing::debug!(path = %path.display(), "purged stale temp directory"),
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "failed to purge stale temp directory"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_makes_a_directory_with_prefix() {
        let dir = TempJobDir::create().await.expect("create temp dir");
        assert!(dir.path().is_dir());
        assert!(dir.path().file_name().unwrap().to_str().unwrap().starts_with(TEMP_PREFIX));
    }

    #[tokio::test]
    async fn drop_removes_the_directory() {
        let path = {
            let dir = TempJobDir::create().await.expect("create temp dir");
            dir.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn two_concurrent_dirs_get_distinct_paths() {
        let a = TempJobDir::create().await.unwrap();
        let b = TempJobDir::create().await.unwrap();
        assert_ne!(a.path(), b.path());
    }

    #[tokio::test]
    async fn purge_stale_removes_leftover_directories_but_not_others() {
        let root = std::env::temp_dir();
        let stale = root.join(format!("{TEMP_PREFIX}stale_test_marker"));
        tokio::fs::create_dir_all(&stale).await.unwrap();
        let unrelated = root.join("codeforge-test-unrelated-marker-dir");
        tokio::fs::create_dir_all(&unrelated).await.unwrap();

        purge_stale().await;

        assert!(!stale.exists());
        assert!(unrelated.exists());
        let _ = tokio::fs::remove_dir_all(&unrelated).await;
    }
}
