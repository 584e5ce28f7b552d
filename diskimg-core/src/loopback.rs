//! Loop device attachment through kpartx.
//!
//! `kpartx -a -v` prints one `add map loopNpM ...` line per partition it
//! maps. That text is the only source of the loop device name, so parsing is
//! strict: no matching line means the attachment is treated as failed.

use diskimg_error::{AttachmentError, ImgResult};
use diskimg_hal::{Invocation, ProcessOps};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::time::Duration;

const KPARTX_TIMEOUT: Duration = Duration::from_secs(60);
const SYNC_TIMEOUT: Duration = Duration::from_secs(5 * 60);

static ADD_MAP: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"add map (loop[0-9]+)p\d+").expect("add map pattern is valid")
});

/// Loop device name from the first `add map` line of kpartx output.
pub fn parse_loop_name(output: &str) -> Option<String> {
    output
        .lines()
        .find_map(|line| ADD_MAP.captures(line))
        .map(|caps| caps[1].to_string())
}

/// RAII guard for one kpartx mapping; detaches and syncs when dropped.
#[derive(Debug)]
pub struct LoopSession<'a, H: ProcessOps + ?Sized> {
    hal: &'a H,
    image: PathBuf,
    loop_name: String,
    active: bool,
}

impl<'a, H: ProcessOps + ?Sized> LoopSession<'a, H> {
    /// Map every partition of `image` under `/dev/mapper`.
    pub fn attach(hal: &'a H, image: impl Into<PathBuf>) -> ImgResult<Self> {
        let image = image.into();
        let image_arg = image.display().to_string();
        let output = hal
            .execute(
                &Invocation::new("kpartx", ["-a", "-v", image_arg.as_str()])
                    .captured()
                    .with_timeout(KPARTX_TIMEOUT),
            )
            .map_err(|source| AttachmentError::Tool {
                image: image.clone(),
                source,
            })?;

        for line in output.stdout.lines().filter(|l| !l.is_empty()) {
            log::info!("  {}", line);
        }

        let loop_name = parse_loop_name(&output.stdout)
            .ok_or_else(|| AttachmentError::NoMapping {
                image: image.clone(),
            })?;
        log::debug!("{} attached as {}", image.display(), loop_name);

        Ok(Self {
            hal,
            image,
            loop_name,
            active: true,
        })
    }

    pub fn image(&self) -> &Path {
        &self.image
    }

    /// Kernel loop device name, e.g. `loop3`.
    pub fn loop_name(&self) -> &str {
        &self.loop_name
    }

    /// Device-mapper node of partition `number` (1-based).
    pub fn partition_device(&self, number: u32) -> PathBuf {
        PathBuf::from(format!("/dev/mapper/{}p{}", self.loop_name, number))
    }

    /// Detach now instead of at end of scope.
    pub fn release(mut self) {
        self.detach();
    }

    fn detach(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;

        let image = self.image.display().to_string();
        match self.hal.execute(
            &Invocation::new("kpartx", ["-d", image.as_str()])
                .unchecked()
                .with_timeout(KPARTX_TIMEOUT),
        ) {
            Ok(out) if out.succeeded() => {}
            Ok(out) => log::warn!(
                "kpartx -d {} failed (exit={:?}): {}",
                image,
                out.code,
                out.stderr.trim()
            ),
            Err(err) => log::warn!("kpartx -d {} failed: {}", image, err),
        }

        // Flush buffered writes back into the image file.
        if let Err(err) = self.hal.execute(
            &Invocation::new("sync", Vec::<String>::new()).with_timeout(SYNC_TIMEOUT),
        ) {
            log::warn!("sync after detaching {} failed: {}", image, err);
        }
    }
}

impl<'a, H: ProcessOps + ?Sized> Drop for LoopSession<'a, H> {
    fn drop(&mut self) {
        self.detach();
    }
}
