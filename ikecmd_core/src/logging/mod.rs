//! Logging for ikecmd.
//!
//! Everything goes through `tracing`. Events are printed to stdout and,
//! when `[logging] file = true`, also to a daily rotated file.

use tracing::Level;
use tracing_appender::{
    non_blocking::{NonBlocking, WorkerGuard},
    rolling::{RollingFileAppender, Rotation},
};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::Config;

/// Where and how log events are written.
#[derive(Debug, Clone)]
pub struct LogOptions {
    /// Minimum level (default: INFO)
    pub level: Level,

    /// Directory for the rolling log file; `None` disables file output
    pub file_dir: Option<String>,

    /// Base name of the rolling log file (default: "ikecmd")
    pub file_name: String,

    /// JSON lines instead of plain text
    pub json: bool,
}

impl Default for LogOptions {
    fn default() -> Self {
        LogOptions {
            level: Level::INFO,
            file_dir: None,
            file_name: "ikecmd".to_string(),
            json: false,
        }
    }
}

impl LogOptions {
    /// Options described by the `log_level` and `[logging]` settings.
    pub fn from_config(config: &Config) -> Self {
        LogOptions {
            level: parse_level(&config.log_level),
            file_dir: config.logging.file.then(|| config.logging.dir.clone()),
            json: config.logging.json,
            ..Default::default()
        }
    }
}

/// Map a level name to a [`Level`], falling back to INFO.
pub fn parse_level(name: &str) -> Level {
    match name.to_ascii_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Install the global subscriber.
///
/// `RUST_LOG` directives are honored on top of `options.level`. The returned
/// guard flushes the file writer on drop and must outlive all logging.
///
/// # Examples
///
/// ```
/// use ikecmd_core::logging::{init_logging, LogOptions};
/// use tracing::Level;
///
/// let _guard = init_logging(LogOptions {
///     level: Level::DEBUG,
///     ..Default::default()
/// });
/// ```
pub fn init_logging(options: LogOptions) -> Option<WorkerGuard> {
    let filter = EnvFilter::from_default_env().add_directive(options.level.into());

    let stdout = fmt::layer().with_target(true);
    let mut layers = vec![if options.json {
        stdout.json().boxed()
    } else {
        stdout.boxed()
    }];

    let guard = options.file_dir.as_deref().map(|dir| {
        let appender = RollingFileAppender::new(Rotation::DAILY, dir, &options.file_name);
        let (writer, guard) = NonBlocking::new(appender);

        let file = fmt::layer().with_ansi(false).with_writer(writer);
        layers.push(if options.json {
            file.json().boxed()
        } else {
            file.boxed()
        });
        guard
    });

    // A subscriber may already be installed (tests, embedding)
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(layers)
        .try_init();

    guard
}

/// Install the global subscriber described by `config`.
///
/// # Examples
///
/// ```
/// use ikecmd_core::config::Config;
/// use ikecmd_core::logging::init_logging_from_config;
///
/// let _guard = init_logging_from_config(&Config::default());
/// ```
pub fn init_logging_from_config(config: &Config) -> Option<WorkerGuard> {
    init_logging(LogOptions::from_config(config))
}
