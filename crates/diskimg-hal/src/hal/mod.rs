//! HAL trait definitions and implementations.
//!
//! This module defines the process execution trait and provides both a real
//! (LinuxHal) and a recording (FakeHal) implementation.

pub mod fake_hal;
pub mod linux_hal;
pub mod process_ops;

pub use fake_hal::FakeHal;
pub use linux_hal::LinuxHal;
pub use process_ops::{CommandOutput, Invocation, ProcessOps};
