//! Subcommand implementations.
//!
//! Each one opens an [`ImageSession`], runs its command and closes the
//! session; the session guards unwind on every early return. A pending
//! interrupt skips the command but not the teardown.

use crate::cancel::Interrupt;
use crate::cli::Command;
use diskimg_core::{Config, ImageSession, ImgResult};
use diskimg_hal::ProcessOps;
use std::path::Path;

const DEFAULT_SHELL: &str = "/bin/sh";

pub fn run<H: ProcessOps + ?Sized>(
    hal: &H,
    command: &Command,
    config: &Config,
    interrupt: &Interrupt,
) -> ImgResult<i32> {
    match command {
        Command::Chroot { image, command } => chroot(hal, image, command, config, interrupt),
        Command::Exec { image, command } => exec(hal, image, command, config, interrupt),
        Command::Shell { image } => {
            let argv = shell_argv(std::env::var("SHELL").ok());
            chroot(hal, image, &argv, config, interrupt)
        }
    }
}

/// Run `command` chrooted into the image, or a shell when it is empty.
pub fn chroot<H: ProcessOps + ?Sized>(
    hal: &H,
    image: &Path,
    command: &[String],
    config: &Config,
    interrupt: &Interrupt,
) -> ImgResult<i32> {
    let argv = if command.is_empty() {
        vec![DEFAULT_SHELL.to_string()]
    } else {
        command.to_vec()
    };

    let session = ImageSession::open(hal, image, config)?;
    interrupt.check()?;
    let status = session.chroot(&argv);
    session.close();
    status
}

/// Run a host command with the mounted root as working directory.
pub fn exec<H: ProcessOps + ?Sized>(
    hal: &H,
    image: &Path,
    command: &[String],
    config: &Config,
    interrupt: &Interrupt,
) -> ImgResult<i32> {
    let session = ImageSession::open(hal, image, config)?;
    interrupt.check()?;
    let status = session.run_in_workdir(command);
    session.close();
    status
}

fn shell_argv(shell: Option<String>) -> Vec<String> {
    match shell {
        Some(shell) if !shell.trim().is_empty() => vec![shell],
        _ => vec![DEFAULT_SHELL.to_string()],
    }
}
