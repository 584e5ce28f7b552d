use anyhow::{Context, Result};
use clap::Parser;
use diskimg_core::{logging, preflight, Config, ImgError};
use diskimg_hal::LinuxHal;

mod cancel;
mod cli;
mod commands;

use cancel::{Interrupt, INTERRUPTED_EXIT};

fn main() {
    let cli = cli::Cli::parse();
    logging::init(logging::level_from_flags(cli.verbose, cli.quiet));

    let interrupt = match Interrupt::install() {
        Ok(interrupt) => interrupt,
        Err(err) => {
            log::error!("failed to install Ctrl+C handler: {:#}", err);
            std::process::exit(1);
        }
    };

    match run(&cli, &interrupt) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            // A failing user command passes its status through; other errors exit 1.
            let code = match err.downcast_ref::<ImgError>() {
                Some(ImgError::Command(cmd_err)) => cmd_err.exit_code(),
                _ => None,
            };
            let fallback = if interrupt.is_raised() {
                INTERRUPTED_EXIT
            } else {
                1
            };
            log::error!("{:#}", err);
            std::process::exit(code.unwrap_or(fallback));
        }
    }
}

fn run(cli: &cli::Cli, interrupt: &Interrupt) -> Result<i32> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => Config::default(),
    };
    cli.apply(&mut config);

    preflight::ensure_root()?;

    let hal = LinuxHal::new();
    let code = commands::run(&hal, &cli.command, &config, interrupt)?;
    Ok(code)
}
