use diskimg_error::{ImgError, ImgResult};
use diskimg_hal::{Invocation, ProcessOps};
use std::path::Path;

/// Run `argv` with `root` as its filesystem root. Returns the exit status (0).
///
/// The command inherits stdio and has no timeout; a non-zero exit is an
/// `ImgError::Command` carrying the exit code.
pub fn run_in_root<H: ProcessOps + ?Sized>(
    hal: &H,
    root: &Path,
    argv: &[String],
) -> ImgResult<i32> {
    if argv.is_empty() {
        return Err(ImgError::EmptyCommand);
    }

    let mut args = Vec::with_capacity(argv.len() + 1);
    args.push(root.display().to_string());
    args.extend(argv.iter().cloned());

    let out = hal.execute(&Invocation::new("chroot", args))?;
    Ok(out.code.unwrap_or_default())
}
