//! Process logger for the `scaffold` binary.
//!
//! The library only writes through the `log` facade. Preparation passes,
//! block instances and skipped includes are logged at debug and warn level,
//! so `--verbose` is what surfaces them.

use log::LevelFilter;

/// Environment variable whose filter directives override the level chosen
/// on the command line, e.g. `SCAFFOLD_LOG=scaffold::template=trace`.
pub const LOG_ENV: &str = "SCAFFOLD_LOG";

fn level(verbose: bool) -> LevelFilter {
    if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    }
}

pub fn init_logger(verbose: bool) {
    env_logger::Builder::new()
        .filter_level(level(verbose))
        .parse_env(LOG_ENV)
        .format_timestamp(None)
        .format_target(verbose)
        .init();
}
