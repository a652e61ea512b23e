// Per-project advisory lock
//
// A run holds `<project>/.reframe.lock` for its whole duration. The holder
// record is written to a private temp file first and hard-linked into place,
// so the lock never becomes visible without its contents and two runs racing
// on the same project cannot both succeed. The lock is released when the
// guard drops, but only if it still names this run.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const LOCK_FILE: &str = ".reframe.lock";

/// Locks older than this are assumed to belong to a crashed process
const STALE_AFTER_HOURS: i64 = 24;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockInfo {
    pub operation: String,
    pub pid: u32,
    pub acquired_at: DateTime<Utc>,
}

impl LockInfo {
    fn is_stale(&self, now: DateTime<Utc>) -> bool {
        now - self.acquired_at > Duration::hours(STALE_AFTER_HOURS)
    }
}

#[derive(Debug)]
pub struct ProjectLock {
    path: PathBuf,
    info: LockInfo,
}

impl ProjectLock {
    /// Take the lock for `operation`, failing with [`Error::Busy`] if another
    /// run holds it
    pub fn acquire(project_root: &Path, operation: &str) -> Result<Self> {
        let path = project_root.join(LOCK_FILE);
        let info = LockInfo {
            operation: operation.to_string(),
            pid: std::process::id(),
            acquired_at: Utc::now(),
        };

        match Self::create(&path, &info) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                let held = Self::holder(project_root);
                let stale = match &held {
                    Some(held) => held.is_stale(info.acquired_at),
                    // Unreadable: judge by the file's age
                    None => file_is_stale(&path),
                };
                if !stale {
                    return Err(busy(project_root, held.as_ref()));
                }

                log::warn!("Replacing stale lock {}", path.display());
                Self::replace(&path, &info)?;
                if Self::holder(project_root).as_ref() != Some(&info) {
                    return Err(busy(project_root, None));
                }
            }
            Err(e) => return Err(e.into()),
        }

        log::debug!("Locked {} for {}", project_root.display(), operation);
        Ok(Self { path, info })
    }

    /// Current holder of the project's lock, if any
    pub fn holder(project_root: &Path) -> Option<LockInfo> {
        let content = std::fs::read_to_string(project_root.join(LOCK_FILE)).ok()?;
        serde_json::from_str(&content).ok()
    }

    pub fn info(&self) -> &LockInfo {
        &self.info
    }

    /// Publish `info` at `path`, failing with `AlreadyExists` if a lock is there
    fn create(path: &Path, info: &LockInfo) -> std::io::Result<()> {
        let staged = Self::stage(path, info)?;
        let linked = std::fs::hard_link(&staged, path);
        let _ = std::fs::remove_file(&staged);
        linked
    }

    /// Atomically overwrite a stale lock at `path`
    fn replace(path: &Path, info: &LockInfo) -> std::io::Result<()> {
        let staged = Self::stage(path, info)?;
        std::fs::rename(&staged, path).inspect_err(|_| {
            let _ = std::fs::remove_file(&staged);
        })
    }

    fn stage(path: &Path, info: &LockInfo) -> std::io::Result<PathBuf> {
        let staged = path.with_extension(format!(
            "lock.{}.{}.tmp",
            info.pid,
            info.acquired_at.timestamp_nanos_opt().unwrap_or_default()
        ));
        let content = serde_json::to_vec(info).map_err(std::io::Error::other)?;
        std::fs::write(&staged, content)?;
        Ok(staged)
    }
}

fn busy(project_root: &Path, held: Option<&LockInfo>) -> Error {
    let holder = match held {
        Some(held) => format!("{} (pid {}) since {}", held.operation, held.pid, held.acquired_at.to_rfc3339()),
        None => "another run".to_string(),
    };
    Error::Busy {
        project: project_root.to_path_buf(),
        holder,
    }
}

fn file_is_stale(path: &Path) -> bool {
    let Ok(modified) = std::fs::metadata(path).and_then(|m| m.modified()) else {
        return false;
    };
    SystemTime::now()
        .duration_since(modified)
        .is_ok_and(|age| age.as_secs() > STALE_AFTER_HOURS as u64 * 3600)
}

impl Drop for ProjectLock {
    fn drop(&mut self) {
        let current = self.path.parent().and_then(Self::holder);
        if current.as_ref() != Some(&self.info) {
            log::warn!("Lock {} was taken over, leaving it in place", self.path.display());
            return;
        }
        if let Err(e) = std::fs::remove_file(&self.path) {
            log::warn!("Failed to release lock {}: {}", self.path.display(), e);
        }
    }
}
