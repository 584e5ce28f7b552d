//! Virtual filesystems a chrooted root needs (`/dev`, `/proc`, `/sys`, `/run`...).

use crate::config::UnmountPolicy;
use crate::mounts::{MountEntry, MountOptions, MountStack};
use diskimg_error::{ImgError, ImgResult};
use diskimg_hal::ProcessOps;
use std::fs;
use std::path::{Path, PathBuf};

/// One virtual filesystem mounted below the root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VirtualMount {
    pub source: &'static str,
    /// Mount point relative to the root.
    pub target: &'static str,
    pub fstype: &'static str,
}

/// Mounted in this order, unmounted in reverse.
pub const VIRTUAL_MOUNTS: [VirtualMount; 6] = [
    VirtualMount {
        source: "dev",
        target: "dev",
        fstype: "devtmpfs",
    },
    VirtualMount {
        source: "devpts",
        target: "dev/pts",
        fstype: "devpts",
    },
    VirtualMount {
        source: "tmpfs",
        target: "dev/shm",
        fstype: "tmpfs",
    },
    VirtualMount {
        source: "proc",
        target: "proc",
        fstype: "proc",
    },
    VirtualMount {
        source: "sysfs",
        target: "sys",
        fstype: "sysfs",
    },
    VirtualMount {
        source: "tmpfs",
        target: "run",
        fstype: "tmpfs",
    },
];

/// Created inside the fresh `/run` tmpfs.
pub const RUN_DIRS: [&str; 2] = ["run/lock", "run/shm"];

/// Active virtual mounts of one root; torn down on `deactivate` or drop.
#[derive(Debug)]
pub struct RootMounts<'a, H: ProcessOps + ?Sized> {
    root: PathBuf,
    stack: MountStack<'a, H>,
}

impl<'a, H: ProcessOps + ?Sized> RootMounts<'a, H> {
    /// Mount every [`VIRTUAL_MOUNTS`] entry under `root`.
    ///
    /// On failure the mounts made so far are unwound before the error returns.
    pub fn activate(
        hal: &'a H,
        root: impl Into<PathBuf>,
        policy: UnmountPolicy,
    ) -> ImgResult<Self> {
        let root = root.into();
        let mut stack = MountStack::new(hal, policy);

        for vm in VIRTUAL_MOUNTS {
            stack.mount(vm.source, root.join(vm.target), MountOptions::fstype(vm.fstype))?;
        }

        for dir in RUN_DIRS {
            let path = root.join(dir);
            fs::create_dir_all(&path).map_err(|e| ImgError::io(&path, e))?;
        }

        Ok(Self { root, stack })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn mounts(&self) -> &[MountEntry] {
        self.stack.entries()
    }

    pub fn deactivate(self) {
        self.stack.release();
    }
}
