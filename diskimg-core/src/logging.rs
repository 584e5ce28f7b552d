use log::LevelFilter;

/// Install the process-wide logger. Call once, early in `main`.
///
/// `RUST_LOG` still wins over `level` for the modules it names.
pub fn init(level: LevelFilter) {
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format_timestamp(None)
        .format_target(false)
        .init();
}

/// Map `-q` / repeated `-v` flags to a level filter.
pub fn level_from_flags(verbose: u8, quiet: bool) -> LevelFilter {
    if quiet {
        return LevelFilter::Warn;
    }
    match verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_from_flags_maps_verbosity() {
        assert_eq!(level_from_flags(0, false), LevelFilter::Info);
        assert_eq!(level_from_flags(1, false), LevelFilter::Debug);
        assert_eq!(level_from_flags(4, false), LevelFilter::Trace);
        assert_eq!(level_from_flags(2, true), LevelFilter::Warn);
    }
}
