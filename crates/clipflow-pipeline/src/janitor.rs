//! Removal of a job's transient local files.
//!
//! Every local artifact lives under the work dir at a path equal to its store
//! key. The janitor only ever touches paths inside that root.

use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;

/// Keys of transient files a job has created or may have created.
#[derive(Debug, Default)]
pub struct TransientArtifacts {
    keys: Mutex<Vec<String>>,
}

impl TransientArtifacts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, key: impl Into<String>) {
        let key = key.into();
        let mut keys = self.keys.lock().unwrap_or_else(|e| e.into_inner());
        if !keys.contains(&key) {
            keys.push(key);
        }
    }

    pub fn record_all<I, S>(&self, keys: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for key in keys {
            self.record(key);
        }
    }

    /// Take everything recorded so far; a second call returns only newer keys.
    pub fn drain(&self) -> Vec<String> {
        let mut keys = self.keys.lock().unwrap_or_else(|e| e.into_inner());
        std::mem::take(&mut *keys)
    }

    pub fn len(&self) -> usize {
        self.keys.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CleanupReport {
    pub removed: Vec<String>,
    /// Already gone; not an error.
    pub missing: Vec<String>,
    pub failed: Vec<String>,
    /// Keys that would resolve outside the work dir.
    pub refused: Vec<String>,
}

impl CleanupReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.refused.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct Janitor {
    work_dir: PathBuf,
}

impl Janitor {
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
        }
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Local path for `key`, or `None` if the key could escape the work dir.
    pub fn local_path(&self, key: &str) -> Option<PathBuf> {
        let relative = Path::new(key);
        if key.is_empty()
            || !relative
                .components()
                .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return None;
        }
        Some(self.work_dir.join(relative))
    }

    /// Delete the given transient files. Never fails: missing files are
    /// skipped and other errors are logged and reported.
    pub async fn cleanup(&self, keys: Vec<String>) -> CleanupReport {
        let mut report = CleanupReport::default();
        for key in keys {
            let Some(path) = self.local_path(&key) else {
                tracing::warn!(key = %key, "Refusing to delete path outside work dir");
                report.refused.push(key);
                continue;
            };
            match tokio::fs::remove_file(&path).await {
                Ok(()) => report.removed.push(key),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => report.missing.push(key),
                Err(e) => {
                    tracing::warn!(
                        key = %key,
                        path = %path.display(),
                        error = %e,
                        "Failed to delete transient file"
                    );
                    report.failed.push(key);
                }
            }
        }

        tracing::debug!(
            removed = report.removed.len(),
            missing = report.missing.len(),
            failed = report.failed.len(),
            "Transient files cleaned up"
        );
        report
    }
}
