//! Subscriber construction for the recorder process.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::Dispatch;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter};

const DEFAULT_FILTER: &str = "recorder=debug,recorder_engine=debug,recorder_ipc=info";

/// Process logger.
///
/// Holds the dispatcher handed to each thread and, when logging to a file,
/// the appender guard that flushes pending lines on drop.
pub struct Logging {
    dispatch: Dispatch,
    _guard: Option<WorkerGuard>,
}

impl Logging {
    /// Build the logger, writing to `log_file` when given and stderr otherwise.
    pub fn init(log_file: Option<&Path>) -> Result<Self> {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

        let Some(path) = log_file else {
            let subscriber = tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr));
            return Ok(Self {
                dispatch: Dispatch::new(subscriber),
                _guard: None,
            });
        };

        let dir = path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create log directory: {:?}", dir))?;
        let file_name = path
            .file_name()
            .with_context(|| format!("Log path has no file name: {:?}", path))?;

        let appender = tracing_appender::rolling::never(dir, file_name);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(writer).with_ansi(false));

        Ok(Self {
            dispatch: Dispatch::new(subscriber),
            _guard: Some(guard),
        })
    }

    pub fn dispatch(&self) -> &Dispatch {
        &self.dispatch
    }
}
