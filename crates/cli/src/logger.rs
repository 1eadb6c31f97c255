// Minimal stderr logger for the CLI. Level comes from PHOTO_PASS_LOG,
// defaulting to warn so normal output stays clean.

use log::{LevelFilter, Log, Metadata, Record};
use std::io::Write;
use std::time::{SystemTime, UNIX_EPOCH};

struct StderrLogger;

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        match log::max_level().to_level() {
            Some(max) => metadata.level() <= max,
            None => false,
        }
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = format!(
            "[{}] [{:>5}] {}: {}",
            timestamp_millis(),
            record.level(),
            record.target(),
            record.args()
        );
        let _ = writeln!(std::io::stderr().lock(), "{line}");
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

fn parse_level(value: &str) -> Option<LevelFilter> {
    match value.trim().to_ascii_lowercase().as_str() {
        "trace" => Some(LevelFilter::Trace),
        "debug" => Some(LevelFilter::Debug),
        "info" => Some(LevelFilter::Info),
        "warn" | "warning" => Some(LevelFilter::Warn),
        "error" => Some(LevelFilter::Error),
        "off" => Some(LevelFilter::Off),
        _ => None,
    }
}

fn level_from_env() -> Option<LevelFilter> {
    std::env::var("PHOTO_PASS_LOG")
        .ok()
        .and_then(|v| parse_level(&v))
}

/// Installs the logger. `verbose` raises the default level to info; an
/// explicit PHOTO_PASS_LOG always wins.
pub fn init(verbose: bool) {
    let _ = log::set_boxed_logger(Box::new(StderrLogger));

    let fallback = if verbose {
        LevelFilter::Info
    } else {
        LevelFilter::Warn
    };
    let level = level_from_env().unwrap_or(fallback);
    log::set_max_level(level);
    log::debug!("logger initialized at level {level}");
}

fn timestamp_millis() -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    format!("{}.{:03}", now.as_secs(), now.subsec_millis())
}
