//! Ctrl+C handling.
//!
//! SIGINT goes to the whole foreground process group, so a command running
//! inside the image receives it directly. diskimgtool only records it and
//! keeps running, which lets the session guards unmount and detach once that
//! command has returned.

use diskimg_core::{ImgError, ImgResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Exit status used when the run was cut short by SIGINT/SIGTERM.
pub const INTERRUPTED_EXIT: i32 = 130;

#[derive(Debug, Clone, Default)]
pub struct Interrupt {
    raised: Arc<AtomicBool>,
}

impl Interrupt {
    /// Route SIGINT/SIGTERM/SIGHUP to a flag instead of the default kill.
    ///
    /// Only one handler can be installed per process.
    pub fn install() -> anyhow::Result<Self> {
        let interrupt = Self::default();
        let handle = interrupt.clone();
        ctrlc::set_handler(move || {
            handle.raise();
            log::warn!("Interrupted; cleaning up once the running command exits.");
        })?;
        Ok(interrupt)
    }

    pub fn raise(&self) {
        self.raised.store(true, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.raised.load(Ordering::SeqCst)
    }

    /// `Err(ImgError::Interrupted)` once a signal has arrived.
    pub fn check(&self) -> ImgResult<()> {
        if self.is_raised() {
            Err(ImgError::Interrupted)
        } else {
            Ok(())
        }
    }
}
