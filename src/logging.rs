//! Tracing subscriber setup for hosts embedding sl-lua.
//!
//! The crate itself only emits `tracing` events; installing a subscriber is
//! left to the host, through one of the two entry points here.

use std::fs::{self, File};
use std::path::Path;
use std::sync::Arc;

use tracing::level_filters::LevelFilter;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;
use crate::{Error, Result};

/// Level names accepted in `[logging] level`. Unknown names mean `info`.
fn parse_level(level: &str) -> LevelFilter {
    match level.to_ascii_lowercase().as_str() {
        "off" => LevelFilter::OFF,
        "error" => LevelFilter::ERROR,
        "warn" | "warning" => LevelFilter::WARN,
        "debug" => LevelFilter::DEBUG,
        "trace" => LevelFilter::TRACE,
        _ => LevelFilter::INFO,
    }
}

/// `RUST_LOG` directives, with `level` as the floor directive.
fn filter(level: &str) -> EnvFilter {
    EnvFilter::from_default_env().add_directive(parse_level(level).into())
}

/// Open `path` for writing, creating missing parent directories.
fn open_log_file(path: &Path) -> Result<File> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }
    Ok(File::create(path)?)
}

/// Install a global subscriber writing plain text to stdout and to
/// `config.file`.
///
/// Fails with [`Error::Config`] when a global subscriber is already set; the
/// log file is still created in that case.
pub fn init(config: &LoggingConfig) -> Result<()> {
    let file = Arc::new(open_log_file(Path::new(&config.file))?);
    let layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stdout.and(file))
        .with_ansi(false)
        .with_file(false)
        .with_line_number(false);

    tracing_subscriber::registry()
        .with(layer)
        .with(filter(&config.level))
        .try_init()
        .map_err(|e| Error::Config(format!("logging already initialized: {e}")))
}

/// Colored stdout logging for tests and local runs. A no-op once any global
/// subscriber exists.
pub fn init_console_only(level: &str) {
    let layer = tracing_subscriber::fmt::layer().with_writer(std::io::stdout);
    let _ = tracing_subscriber::registry()
        .with(layer)
        .with(filter(level))
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("trace"), LevelFilter::TRACE);
        assert_eq!(parse_level("DEBUG"), LevelFilter::DEBUG);
        assert_eq!(parse_level("info"), LevelFilter::INFO);
        assert_eq!(parse_level("warning"), LevelFilter::WARN);
        assert_eq!(parse_level("ERROR"), LevelFilter::ERROR);
        assert_eq!(parse_level("off"), LevelFilter::OFF);
    }

    #[test]
    fn test_parse_level_default() {
        assert_eq!(parse_level("invalid"), LevelFilter::INFO);
        assert_eq!(parse_level(""), LevelFilter::INFO);
    }

    #[test]
    fn test_open_log_file_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a/b/sl-lua.log");
        open_log_file(&path).unwrap();
        assert!(path.is_file());
    }

    #[test]
    fn test_init_writes_file_once() {
        let dir = tempfile::tempdir().unwrap();
        let config = LoggingConfig {
            level: "debug".to_string(),
            file: dir.path().join("nested/sl-lua.log").display().to_string(),
        };

        // Another test in this process may have installed a subscriber first.
        match init(&config) {
            Ok(()) | Err(Error::Config(_)) => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
        assert!(Path::new(&config.file).is_file());

        let err = init(&config).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_init_unwritable_path() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, "").unwrap();
        let config = LoggingConfig {
            level: "info".to_string(),
            file: blocker.join("sl-lua.log").display().to_string(),
        };
        assert!(matches!(init(&config), Err(Error::Io(_))));
    }

    #[test]
    fn test_console_only_is_repeatable() {
        init_console_only("debug");
        init_console_only("info");
    }
}
