use diskimg_error::{ImgError, ImgResult};
use std::env;
use std::path::{Path, PathBuf};

/// Switches the process working directory until dropped.
///
/// The working directory is process-wide; only one should be alive at a time.
#[derive(Debug)]
pub struct ScopedChdir {
    previous: PathBuf,
}

impl ScopedChdir {
    pub fn enter(path: &Path) -> ImgResult<Self> {
        log::info!("+ cd {}", path.display());
        let previous = env::current_dir().map_err(|e| ImgError::io(".", e))?;
        env::set_current_dir(path).map_err(|e| ImgError::io(path, e))?;
        Ok(Self { previous })
    }

    pub fn previous(&self) -> &Path {
        &self.previous
    }
}

impl Drop for ScopedChdir {
    fn drop(&mut self) {
        log::info!("+ cd -");
        if let Err(err) = env::set_current_dir(&self.previous) {
            log::warn!(
                "failed to return to {}: {}",
                self.previous.display(),
                err
            );
        }
    }
}
