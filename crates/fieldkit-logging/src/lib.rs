//! Structured logging for Fieldkit
//!
//! JSONL to the console by default, or pretty output for development, plus
//! optional rotated JSONL files. Sync operations open spans carrying
//! `survey_id`, so every line they log can be filtered by survey.
//!
//! # Quick Start
//!
//! ```ignore
//! use fieldkit_logging::{FieldkitSubscriberBuilder, LogConfig};
//!
//! // Keep the guard alive for as long as file output should be flushed
//! let _guard = FieldkitSubscriberBuilder::new()
//!     .with_config(LogConfig::from_env())
//!     .init();
//! ```
//!
//! `RUST_LOG` overrides the configured level.

pub mod config;
pub mod layers;

pub use config::{ConsoleConfig, FileConfig, JsonlConfig, LogConfig, RotationStrategy};
pub use tracing_appender::non_blocking::WorkerGuard;

use std::fs::{self, File};
use std::path::PathBuf;

use thiserror::Error;
use tracing_appender::non_blocking::NonBlocking;
use tracing_appender::rolling::{InitError, RollingFileAppender, Rotation};
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{EnvFilter, Registry};

/// Errors raised while installing the subscriber
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("Invalid log filter: {0}")]
    Filter(String),

    #[error("Cannot create log file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot create rolling log appender: {0}")]
    Appender(#[from] InitError),

    #[error("A global subscriber is already set: {0}")]
    Init(#[from] TryInitError),
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

fn file_writer(config: &FileConfig) -> Result<(NonBlocking, WorkerGuard), LoggingError> {
    let rotation = match config.rotation {
        RotationStrategy::Daily => Rotation::DAILY,
        RotationStrategy::Hourly => Rotation::HOURLY,
        RotationStrategy::Never => {
            let io_error = |source| LoggingError::Io {
                path: config.directory.clone(),
                source,
            };
            fs::create_dir_all(&config.directory).map_err(io_error)?;
            let path = config.directory.join(format!("{}.jsonl", config.prefix));
            let file = File::create(&path).map_err(|source| LoggingError::Io { path, source })?;
            return Ok(tracing_appender::non_blocking(file));
        }
    };

    let mut builder = RollingFileAppender::builder()
        .rotation(rotation)
        .filename_prefix(&config.prefix)
        .filename_suffix("jsonl");
    if let Some(max_files) = config.max_files {
        builder = builder.max_log_files(max_files);
    }
    let appender = builder.build(&config.directory)?;
    Ok(tracing_appender::non_blocking(appender))
}

/// Builder for the global Fieldkit subscriber
#[derive(Debug, Default)]
pub struct FieldkitSubscriberBuilder {
    config: LogConfig,
}

impl FieldkitSubscriberBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: LogConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.config.default_level = level.into();
        self
    }

    pub fn with_console(mut self, enabled: bool) -> Self {
        self.config.console.enabled = enabled;
        self
    }

    pub fn with_file_output(mut self, config: FileConfig) -> Self {
        self.config.file = Some(config);
        self
    }

    /// Install the subscriber globally
    ///
    /// The returned guard flushes file output when dropped.
    pub fn try_init(self) -> Result<Option<WorkerGuard>, LoggingError> {
        let env_filter = match EnvFilter::try_from_default_env() {
            Ok(filter) => filter,
            Err(_) => EnvFilter::try_new(&self.config.default_level)
                .map_err(|e| LoggingError::Filter(e.to_string()))?,
        };

        let mut stack: Vec<BoxedLayer> = Vec::new();

        let console = &self.config.console;
        if console.enabled {
            stack.push(if console.pretty {
                tracing_subscriber::fmt::layer()
                    .with_ansi(console.ansi)
                    .with_target(true)
                    .boxed()
            } else {
                layers::jsonl_layer(&self.config.jsonl, std::io::stdout)
            });
        }

        let guard = match &self.config.file {
            Some(file_config) => {
                let (writer, guard) = file_writer(file_config)?;
                stack.push(layers::jsonl_layer(&self.config.jsonl, writer));
                Some(guard)
            }
            None => None,
        };

        Registry::default().with(stack).with(env_filter).try_init()?;
        Ok(guard)
    }

    /// Like [`try_init`](Self::try_init), reporting failure on stderr instead
    pub fn init(self) -> Option<WorkerGuard> {
        match self.try_init() {
            Ok(guard) => guard,
            Err(e) => {
                eprintln!("Warning: failed to initialize logging: {e}");
                None
            }
        }
    }
}

/// JSONL to the console at `info`
pub fn init_default() -> Option<WorkerGuard> {
    FieldkitSubscriberBuilder::new().init()
}

/// Pretty console output at `debug`
pub fn init_development() -> Option<WorkerGuard> {
    FieldkitSubscriberBuilder::new()
        .with_config(LogConfig::development())
        .init()
}

/// Warnings only; safe to call from every test
pub fn init_testing() {
    let _ = FieldkitSubscriberBuilder::new()
        .with_config(LogConfig::testing())
        .try_init();
}
