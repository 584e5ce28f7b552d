//! diskimgtool core library.
//!
//! Mounts a partitioned disk image (kpartx mapping, root and boot partitions),
//! optionally layers the virtual filesystems a chroot needs, and tears all of
//! it down again in reverse order even when a step fails.

pub mod chdir;
pub mod chroot;
pub mod config;
pub mod logging;
pub mod loopback;
pub mod mounts;
pub mod preflight;
pub mod root_mounts;
pub mod session;

#[cfg(test)]
pub mod test_env;

pub use chdir::ScopedChdir;
pub use chroot::run_in_root;
pub use config::{Config, UnmountPolicy};
pub use diskimg_error::{AttachmentError, HalError, ImgError, ImgResult, MountError};
pub use loopback::LoopSession;
pub use mounts::{unmount_with_retry, MountEntry, MountOptions, MountStack, UnmountOutcome};
pub use root_mounts::RootMounts;
pub use session::{fully_mounted, ImageSession};
