//! Logging bootstrap, grounded on `router-core/src/writer.rs`'s
//! `setup_logging`/`writer_start`. Simplified to a stderr target (the demo
//! binary has no daemon log-rotation concerns); the filter-string and
//! buffered-pipe pattern are otherwise unchanged.

use std::io::Write;

/// Initializes `env_logger` with the filter from `RUST_LOG`, falling back to
/// the level stored in [`crate::config::ProcessSettings::LogLevel`].
pub fn init() {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        crate::config::ProcessSettings::LogLevel
            .get::<String>()
            .unwrap_or_else(|| "info".to_string())
    });

    let result = env_logger::Builder::new()
        .format(|buf, record| {
            writeln!(
                buf,
                "[{}] {} [{}] {}",
                buf.timestamp(),
                record.level(),
                record.module_path().unwrap_or("unknown"),
                record.args()
            )
        })
        .parse_filters(&filter)
        .try_init();

    if let Err(e) = result {
        eprintln!("logging already initialized: {e}");
    }
}
