//! A minimal stderr logger for binaries built on this crate.
//!
//! The library only talks to the `log` facade; installing a logger is
//! left to the program.

use log::{Level, LevelFilter, Log, Metadata, Record};

/// Environment variable holding the maximum level.
pub const LOG_ENV: &str = "LOG";

struct StderrLogger;

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let (color, tag) = style(record.level());
        eprintln!("\u{1B}[{color}m[{tag}] {}\u{1B}[0m", record.args());
    }

    fn flush(&self) {}
}

fn style(level: Level) -> (u8, &'static str) {
    match level {
        Level::Error => (31, "ERR"),
        Level::Warn => (93, "WRN"),
        Level::Info => (34, "INF"),
        Level::Debug => (32, "DBG"),
        Level::Trace => (90, "TRC"),
    }
}

/// Map the value of `LOG` to a level filter. Defaults to `Info`.
pub fn level_from(value: Option<&str>) -> LevelFilter {
    match value.map(str::to_ascii_uppercase).as_deref() {
        Some("OFF") => LevelFilter::Off,
        Some("ERROR") => LevelFilter::Error,
        Some("WARN") => LevelFilter::Warn,
        Some("INFO") => LevelFilter::Info,
        Some("DEBUG") => LevelFilter::Debug,
        Some("TRACE") => LevelFilter::Trace,
        _ => LevelFilter::Info,
    }
}

/// Install the logger. Calling it again is a no-op.
pub fn init() {
    static LOGGER: StderrLogger = StderrLogger;
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(level_from(std::env::var(LOG_ENV).ok().as_deref()));
    }
}
