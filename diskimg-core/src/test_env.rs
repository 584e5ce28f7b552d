//! Helpers for tests that touch the process working directory.

use once_cell::sync::Lazy;
use std::env;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

static CWD_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

/// Holds the cwd lock and puts the starting directory back when dropped,
/// even if the test panicked halfway through a chdir.
pub struct CwdGuard {
    start: PathBuf,
    _held: MutexGuard<'static, ()>,
}

pub fn lock_cwd() -> CwdGuard {
    let held = CWD_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    let start = env::current_dir().unwrap_or_else(|_| env::temp_dir());
    CwdGuard { start, _held: held }
}

impl Drop for CwdGuard {
    fn drop(&mut self) {
        let _ = env::set_current_dir(&self.start);
    }
}
