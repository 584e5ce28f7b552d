//! CLI argument parsing for diskimgtool

use clap::{ArgAction, Parser, Subcommand};
use diskimg_core::Config;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "diskimgtool")]
#[command(about = "Mount a partitioned disk image and run commands inside it")]
#[command(long_about = "Mount a partitioned disk image and run commands inside it\n\n\
    The image is mapped with kpartx, its root and boot partitions are mounted\n\
    under a temporary directory, and everything is unmounted and detached again\n\
    when the command exits. Must run as root.")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// TOML config file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Plain umount attempts per mount before falling back
    #[arg(long, global = true)]
    pub unmount_attempts: Option<u32>,

    /// Pause between umount attempts, in milliseconds
    #[arg(long, global = true)]
    pub unmount_backoff_ms: Option<u64>,

    /// Leave a busy mount in place instead of detaching it lazily
    #[arg(long, global = true)]
    pub no_lazy_unmount: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a command chrooted into the image (default: /bin/sh)
    Chroot {
        /// Path to the disk image
        image: PathBuf,

        /// Command and arguments to run inside the image
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },

    /// Run a host command from inside the mounted root
    Exec {
        /// Path to the disk image
        image: PathBuf,

        /// Command and arguments to run
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },

    /// Open $SHELL chrooted into the image
    Shell {
        /// Path to the disk image
        image: PathBuf,
    },
}

impl Cli {
    /// Layer the command-line overrides on top of `config`.
    pub fn apply(&self, config: &mut Config) {
        if let Some(attempts) = self.unmount_attempts {
            config.unmount.attempts = attempts;
        }
        if let Some(backoff_ms) = self.unmount_backoff_ms {
            config.unmount.backoff_ms = backoff_ms;
        }
        if self.no_lazy_unmount {
            config.unmount.lazy_fallback = false;
        }
    }
}
