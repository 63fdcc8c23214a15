use std::{
    path::{Path, PathBuf},
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use serde::{Deserialize, Serialize};

use crate::error::{KrxError, KrxResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LockRecord {
    pid: u32,
    started_unix_secs: u64,
}

/// Advisory single-writer lock for the store root (spec §4.9, §9). The lock
/// is a small JSON file recording the holder's PID and start time; it is not
/// an OS-level file lock, so cooperating processes must honor it.
pub struct AdvisoryLock {
    path: PathBuf,
}

impl AdvisoryLock {
    /// Acquires the lock at `path`. Fails with `KrxError::Busy` if a live
    /// holder's lock file is present and not older than `stale_after`. A
    /// lock whose holder has exceeded `stale_after` is broken (removed) and
    /// reacquired — this is the only staleness signal available without an
    /// OS-level lock, so it trades a small risk of breaking a genuinely slow
    /// writer for never deadlocking forever on a crashed one.
    pub fn acquire(path: &Path, stale_after: Duration) -> KrxResult<Self> {
        if let Some(existing) = Self::read(path)? {
            let age = now_unix_secs().saturating_sub(existing.started_unix_secs);
            if age < stale_after.as_secs() {
                return Err(KrxError::Busy {
                    pid: existing.pid,
                    since: existing.started_unix_secs.to_string(),
                });
            }
        }

        let record = LockRecord {
            pid: std::process::id(),
            started_unix_secs: now_unix_secs(),
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_vec(&record)?)?;
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    fn read(path: &Path) -> KrxResult<Option<LockRecord>> {
        match std::fs::read(path) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for AdvisoryLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

fn now_unix_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
