//! Logger setup for the `facecam` binary.

use log::LevelFilter;

/// Map `-v` repetitions to a default level.
pub fn level_for(verbosity: u8) -> LevelFilter {
    match verbosity {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

/// Initialize logging once.
///
/// `RUST_LOG` wins when set; otherwise the level comes from `verbosity`.
/// Logs go to stderr so they don't interleave with the status line.
pub fn init(verbosity: u8) {
    let default_filter = level_for(verbosity);
    let mut builder = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(default_filter.as_str()),
    );
    builder.target(env_logger::Target::Stderr);
    builder.format_timestamp_millis();

    // Already initialized (e.g. from tests)
    let _ = builder.try_init();
}
