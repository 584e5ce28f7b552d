//! diskimgtool process abstraction layer.
//!
//! Every external tool the image-mounting core touches (kpartx, mount, umount,
//! lsof, chroot, sync) goes through [`ProcessOps`], so workflows can be tested
//! against [`FakeHal`] without root privileges or real block devices.

pub mod hal;

pub use diskimg_error::{HalError, HalResult};
pub use hal::{CommandOutput, FakeHal, Invocation, LinuxHal, ProcessOps};
