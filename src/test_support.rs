use std::{
    path::PathBuf,
    sync::atomic::{AtomicU64, Ordering},
};

static COUNTER: AtomicU64 = AtomicU64::new(0);

/// Returns a fresh, unique directory under the OS temp dir for a single
/// test's exclusive use. Callers are responsible for removing it when done
/// (`std::fs::remove_dir_all`) — there's no Drop guard here, matching the
/// plain helper-function shape the rest of this crate's test modules use.
pub(crate) fn temp_dir(label: &str) -> PathBuf {
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    let dir = std::env::temp_dir().join(format!("krx_store_test_{}_{}_{}", std::process::id(), label, n));
    std::fs::create_dir_all(&dir).expect("create test temp dir");
    dir
}
