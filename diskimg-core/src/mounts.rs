//! Ordered mount stack with reverse-order, best-effort release.
//!
//! Mounts are pushed as they succeed and popped on release, so the unmount
//! sequence is always the mirror of the mount sequence. Release never fails:
//! each target gets bounded `umount` retries and, if allowed, a final lazy
//! detach before the stack moves on to the next entry.

use crate::config::UnmountPolicy;
use diskimg_error::{ImgResult, MountError};
use diskimg_hal::{Invocation, ProcessOps};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

const MOUNT_TIMEOUT: Duration = Duration::from_secs(60);
const UMOUNT_TIMEOUT: Duration = Duration::from_secs(60);
const LSOF_TIMEOUT: Duration = Duration::from_secs(30);

/// Filesystem type passed for bind mounts.
pub const BIND_FSTYPE: &str = "none";

/// Options for a single mount call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountOptions {
    /// Filesystem type for `-t`; `auto` lets mount probe.
    pub fstype: String,
    pub bind: bool,
    /// Extra arguments placed after the type/bind flags.
    pub extra_args: Vec<String>,
}

impl Default for MountOptions {
    fn default() -> Self {
        Self {
            fstype: "auto".to_string(),
            bind: false,
            extra_args: Vec::new(),
        }
    }
}

impl MountOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fstype(fstype: impl Into<String>) -> Self {
        Self {
            fstype: fstype.into(),
            ..Self::default()
        }
    }

    pub fn bind(mut self) -> Self {
        self.bind = true;
        self
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extra_args = args.into_iter().map(Into::into).collect();
        self
    }
}

/// One established mount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountEntry {
    source: String,
    target: PathBuf,
    fstype: String,
    bind: bool,
    extra_args: Vec<String>,
}

impl MountEntry {
    fn new(source: String, target: PathBuf, options: MountOptions) -> Self {
        let fstype = if options.bind {
            BIND_FSTYPE.to_string()
        } else {
            options.fstype
        };
        Self {
            source,
            target,
            fstype,
            bind: options.bind,
            extra_args: options.extra_args,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    pub fn fstype(&self) -> &str {
        &self.fstype
    }

    pub fn is_bind(&self) -> bool {
        self.bind
    }

    pub fn extra_args(&self) -> &[String] {
        &self.extra_args
    }

    /// `mount` arguments: `-t <type> [-o bind] <extra...> <source> <target>`.
    pub fn mount_args(&self) -> Vec<String> {
        let mut args = vec!["-t".to_string(), self.fstype.clone()];
        if self.bind {
            args.push("-o".to_string());
            args.push("bind".to_string());
        }
        args.extend(self.extra_args.iter().cloned());
        args.push(self.source.clone());
        args.push(self.target.display().to_string());
        args
    }
}

/// How a release ended for one target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnmountOutcome {
    /// Plain `umount` succeeded on the given attempt (1-based).
    Unmounted { attempts: u32 },
    /// Every plain attempt failed; `umount -l` detached the target.
    Lazy,
    /// Nothing worked; the target may still be mounted.
    Failed,
}

fn log_open_files<H: ProcessOps + ?Sized>(hal: &H, target: &Path) {
    let inv = Invocation::new("lsof", [target.display().to_string()])
        .captured()
        .unchecked()
        .with_timeout(LSOF_TIMEOUT);
    match hal.execute(&inv) {
        Ok(out) => {
            for line in out.stdout.lines().filter(|l| !l.trim().is_empty()) {
                log::warn!("  {}", line);
            }
        }
        Err(err) => log::warn!("lsof {} failed: {}", target.display(), err),
    }
}

/// Unmount `target`, retrying while it stays busy. Never returns an error.
pub fn unmount_with_retry<H: ProcessOps + ?Sized>(
    hal: &H,
    target: &Path,
    policy: &UnmountPolicy,
) -> UnmountOutcome {
    let target_arg = target.display().to_string();
    let attempts = policy.attempts.max(1);

    for attempt in 1..=attempts {
        let inv = Invocation::new("umount", [target_arg.as_str()])
            .unchecked()
            .with_timeout(UMOUNT_TIMEOUT);
        match hal.execute(&inv) {
            Ok(out) if out.succeeded() => {
                return UnmountOutcome::Unmounted { attempts: attempt };
            }
            Ok(out) => log::warn!(
                "umount {} failed (attempt {}/{}, exit={:?}): {}",
                target_arg,
                attempt,
                attempts,
                out.code,
                out.stderr.trim()
            ),
            Err(err) => log::warn!(
                "umount {} failed (attempt {}/{}): {}",
                target_arg,
                attempt,
                attempts,
                err
            ),
        }

        log_open_files(hal, target);
        if attempt < attempts {
            thread::sleep(policy.backoff());
        }
    }

    if !policy.lazy_fallback {
        log::error!(
            "giving up on {} after {} attempts; it is still mounted",
            target_arg,
            attempts
        );
        return UnmountOutcome::Failed;
    }

    let inv = Invocation::new("umount", ["-l", target_arg.as_str()])
        .unchecked()
        .with_timeout(UMOUNT_TIMEOUT);
    match hal.execute(&inv) {
        Ok(out) if out.succeeded() => {
            log::warn!("{} lazily detached", target_arg);
            UnmountOutcome::Lazy
        }
        Ok(out) => {
            log::error!(
                "umount -l {} failed (exit={:?}): {}",
                target_arg,
                out.code,
                out.stderr.trim()
            );
            UnmountOutcome::Failed
        }
        Err(err) => {
            log::error!("umount -l {} failed: {}", target_arg, err);
            UnmountOutcome::Failed
        }
    }
}

/// Mounts in acquisition order; unmounts them in reverse when released or dropped.
///
/// `release` consumes the stack, so an entry can never be released twice.
#[derive(Debug)]
pub struct MountStack<'a, H: ProcessOps + ?Sized> {
    hal: &'a H,
    policy: UnmountPolicy,
    entries: Vec<MountEntry>,
}

impl<'a, H: ProcessOps + ?Sized> MountStack<'a, H> {
    pub fn new(hal: &'a H, policy: UnmountPolicy) -> Self {
        Self {
            hal,
            policy,
            entries: Vec::new(),
        }
    }

    /// Mount `source` on `target` and push it onto the stack.
    ///
    /// A failed mount leaves the stack unchanged.
    pub fn mount(
        &mut self,
        source: impl Into<String>,
        target: impl Into<PathBuf>,
        options: MountOptions,
    ) -> ImgResult<&MountEntry> {
        let entry = MountEntry::new(source.into(), target.into(), options);
        let inv = Invocation::new("mount", entry.mount_args()).with_timeout(MOUNT_TIMEOUT);
        self.hal.execute(&inv).map_err(|cause| MountError {
            device: entry.source.clone(),
            target: entry.target.clone(),
            cause,
        })?;

        self.entries.push(entry);
        match self.entries.last() {
            Some(pushed) => Ok(pushed),
            None => unreachable!("mount stack is empty right after a push"),
        }
    }

    pub fn entries(&self) -> &[MountEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn policy(&self) -> &UnmountPolicy {
        &self.policy
    }

    /// Unmount everything now, newest first.
    pub fn release(mut self) {
        self.unwind();
    }

    fn unwind(&mut self) {
        while let Some(entry) = self.entries.pop() {
            let outcome = unmount_with_retry(self.hal, entry.target(), &self.policy);
            log::debug!("released {}: {:?}", entry.target().display(), outcome);
        }
    }
}

impl<'a, H: ProcessOps + ?Sized> Drop for MountStack<'a, H> {
    fn drop(&mut self) {
        self.unwind();
    }
}
