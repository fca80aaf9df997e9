// Local crates
use crate::helpers::errors::AdminError;

// External crates
use std::{io, panic};
use tracing::{Dispatch, error, level_filters::LevelFilter};
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    filter::EnvFilter,
    fmt::{self, time::UtcTime},
    prelude::*,
    registry::Registry,
};

/// Where log lines are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogTarget {
    /// Service logs.
    Stdout,
    /// CLI diagnostics, kept off the command output.
    Stderr,
}

/// Parse a severity name into a level filter.
///
/// Accepts `trace`, `debug`, `info`, `warn`/`warning`, `error`, and the
/// `fatal`/`panic` aliases (both map to `error`). Case-insensitive.
pub fn parse_level(level: &str) -> Result<LevelFilter, AdminError> {
    let filter = match level.trim().to_ascii_lowercase().as_str() {
        "trace" => LevelFilter::TRACE,
        "debug" => LevelFilter::DEBUG,
        "info" => LevelFilter::INFO,
        "warn" | "warning" => LevelFilter::WARN,
        "error" | "fatal" | "panic" => LevelFilter::ERROR,
        other => {
            return Err(AdminError::configuration(format!(
                "not a valid log level: {other:?}"
            )));
        }
    };
    Ok(filter)
}

/// Logging configured once at process start and handed to whoever logs.
///
/// Nothing is installed globally: callers run their futures with
/// [`tracing::instrument::WithSubscriber::with_subscriber`] or enter
/// [`Logging::dispatch`] with [`tracing::dispatcher::set_default`].
#[derive(Debug)]
pub struct Logging {
    dispatch: Dispatch,
    level: LevelFilter,
    _guard: WorkerGuard,
}

impl Logging {
    /// Build the subscriber stack for `level`, writing to `target`.
    ///
    /// A non-empty `RUST_LOG` overrides the configured level.
    pub fn init(level: &str, target: LogTarget) -> Result<Self, AdminError> {
        let level = parse_level(level)?;

        let (writer, guard) = match target {
            LogTarget::Stdout => tracing_appender::non_blocking(io::stdout()),
            LogTarget::Stderr => tracing_appender::non_blocking(io::stderr()),
        };

        let dispatch = Self::build_dispatch(level, writer, target);
        Ok(Self {
            dispatch,
            level,
            _guard: guard,
        })
    }

    fn build_dispatch(level: LevelFilter, writer: NonBlocking, target: LogTarget) -> Dispatch {
        let filter = EnvFilter::builder()
            .with_default_directive(level.into())
            .from_env_lossy();

        let fmt_layer = fmt::layer()
            .with_ansi(false)
            .with_writer(writer)
            .with_target(target == LogTarget::Stdout)
            .with_timer(UtcTime::rfc_3339());

        let subscriber = Registry::default()
            .with(filter)
            .with(fmt_layer)
            .with(ErrorLayer::default());

        Dispatch::new(subscriber)
    }

    /// The dispatcher every log event should go through.
    pub fn dispatch(&self) -> &Dispatch {
        &self.dispatch
    }

    /// The configured severity.
    pub fn level(&self) -> LevelFilter {
        self.level
    }

    /// Log panics through this logging setup before the default hook runs.
    pub fn install_panic_handler(&self) {
        let dispatch = self.dispatch.clone();
        let default_hook = panic::take_hook();

        panic::set_hook(Box::new(move |panic_info| {
            let msg = match panic_info.payload().downcast_ref::<&str>() {
                Some(s) => (*s).to_string(),
                None => match panic_info.payload().downcast_ref::<String>() {
                    Some(s) => s.clone(),
                    None => "Unknown panic".to_string(),
                },
            };

            let location = panic_info
                .location()
                .map(|l| format!("{}:{}", l.file(), l.line()))
                .unwrap_or_else(|| "unknown location".to_string());

            tracing::dispatcher::with_default(&dispatch, || {
                error!(
                    panic = %msg,
                    location = %location,
                    "Application panicked!"
                );
            });
            default_hook(panic_info);
        }));
    }
}
