//! Checks run before touching loop devices or the mount table.

use diskimg_error::{ImgError, ImgResult};
use nix::unistd::Uid;

/// kpartx, mount and chroot all need an effective uid of 0.
pub fn ensure_root() -> ImgResult<()> {
    ensure_root_uid(Uid::effective())
}

fn ensure_root_uid(uid: Uid) -> ImgResult<()> {
    if uid.is_root() {
        Ok(())
    } else {
        log::error!("diskimgtool must run as root (euid={})", uid);
        Err(ImgError::NotRoot)
    }
}
