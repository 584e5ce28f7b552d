//! Whole-image mount facade.
//!
//! `ImageSession::open` turns an image file into a mounted root tree:
//! working directory, kpartx mapping, root partition, boot partition. The
//! session owns one guard per step and drops them in reverse, so a failure at
//! any step, or a failing caller, still releases what was acquired.

use crate::chdir::ScopedChdir;
use crate::chroot::run_in_root;
use crate::config::{Config, UnmountPolicy};
use crate::loopback::LoopSession;
use crate::mounts::{MountEntry, MountOptions, MountStack};
use crate::root_mounts::RootMounts;
use diskimg_error::{ImgError, ImgResult};
use diskimg_hal::{Invocation, ProcessOps};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

const WORKDIR_PREFIX: &str = ".diskimg-";

/// Empty scratch directory used as the mount root.
///
/// Removal is non-recursive: if anything is still mounted below it, the
/// directory is left behind instead of deleting the image's contents.
#[derive(Debug)]
struct WorkDir {
    path: PathBuf,
}

impl WorkDir {
    fn create(parent: &Path) -> ImgResult<Self> {
        let dir = tempfile::Builder::new()
            .prefix(WORKDIR_PREFIX)
            .keep(true)
            .tempdir_in(parent)
            .map_err(|e| ImgError::io(parent, e))?;
        Ok(Self {
            path: dir.path().to_path_buf(),
        })
    }
}

impl Drop for WorkDir {
    fn drop(&mut self) {
        if let Err(err) = fs::remove_dir(&self.path) {
            log::warn!(
                "failed to remove working directory {}: {}",
                self.path.display(),
                err
            );
        }
    }
}

/// A fully mounted image.
#[derive(Debug)]
pub struct ImageSession<'a, H: ProcessOps + ?Sized> {
    hal: &'a H,
    policy: UnmountPolicy,
    root: PathBuf,
    // Fields drop in declaration order, which is the teardown order.
    mounts: MountStack<'a, H>,
    loopback: LoopSession<'a, H>,
    _workdir: WorkDir,
}

impl<'a, H: ProcessOps + ?Sized> ImageSession<'a, H> {
    pub fn open(hal: &'a H, image: impl AsRef<Path>, config: &Config) -> ImgResult<Self> {
        config.validate()?;
        let image = image.as_ref();

        let parent = match &config.workdir_parent {
            Some(parent) => parent.clone(),
            None => env::current_dir().map_err(|e| ImgError::io(".", e))?,
        };
        let workdir = WorkDir::create(&parent)?;
        let root = workdir.path.clone();
        log::info!("Mounting {} at {}", image.display(), root.display());

        let loopback = LoopSession::attach(hal, image)?;

        let mut mounts = MountStack::new(hal, config.unmount.clone());
        let root_dev = loopback.partition_device(config.root_partition);
        mounts.mount(root_dev.display().to_string(), root.clone(), MountOptions::new())?;
        let boot_dev = loopback.partition_device(config.boot_partition);
        mounts.mount(
            boot_dev.display().to_string(),
            root.join("boot"),
            MountOptions::new(),
        )?;

        Ok(Self {
            hal,
            policy: config.unmount.clone(),
            root,
            mounts,
            loopback,
            _workdir: workdir,
        })
    }

    /// Mounted root tree.
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn image(&self) -> &Path {
        self.loopback.image()
    }

    pub fn loop_name(&self) -> &str {
        self.loopback.loop_name()
    }

    /// Root and boot partition mounts, in mount order.
    pub fn mounts(&self) -> &[MountEntry] {
        self.mounts.entries()
    }

    /// Layer `/dev`, `/proc`, `/sys`, `/run`... on top of the root.
    ///
    /// The returned guard borrows the session, so it is always released first.
    pub fn activate_root_mounts(&self) -> ImgResult<RootMounts<'_, H>> {
        RootMounts::activate(self.hal, self.root.clone(), self.policy.clone())
    }

    /// Run `argv` chrooted into the image with the virtual filesystems mounted.
    pub fn chroot(&self, argv: &[String]) -> ImgResult<i32> {
        let root_mounts = self.activate_root_mounts()?;
        let result = run_in_root(self.hal, &self.root, argv);
        root_mounts.deactivate();
        result
    }

    /// Run a host command with the mounted root as working directory.
    pub fn run_in_workdir(&self, argv: &[String]) -> ImgResult<i32> {
        let (program, args) = argv.split_first().ok_or(ImgError::EmptyCommand)?;
        let _cwd = ScopedChdir::enter(&self.root)?;
        let out = self.hal.execute(&Invocation::new(program.as_str(), args.iter().cloned()))?;
        Ok(out.code.unwrap_or_default())
    }

    /// Unmount boot and root, detach the image and remove the working directory.
    pub fn close(self) {
        log::info!("Unmounting {}", self.root.display());
    }
}

/// Mount `image`, hand its root to `body`, then tear everything down.
///
/// Teardown runs whether or not `body` fails and never adds an error of its own.
pub fn fully_mounted<H, T, E, F>(
    hal: &H,
    image: impl AsRef<Path>,
    config: &Config,
    body: F,
) -> Result<T, E>
where
    H: ProcessOps + ?Sized,
    E: From<ImgError>,
    F: FnOnce(&Path) -> Result<T, E>,
{
    let session = ImageSession::open(hal, image, config)?;
    let result = body(session.root());
    session.close();
    result
}
