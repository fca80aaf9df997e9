//! Error kinds shared by `stolonctl` and `stolonrpc`.
//!
//! Every error carries one [`ErrorKind`]. Context added while an error crosses a
//! component boundary never changes that kind, so the top level can decide the
//! exit behavior from `kind()` alone.

// Local crates
use crate::store::errors::ClientError;

// External crates
use std::{fmt, io};

/// Coarse classification of an [`AdminError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed command line.
    Parse,
    /// Well-formed command line with an invalid combination of arguments.
    Validation,
    /// Missing or malformed environment configuration.
    Configuration,
    /// File or stdin read failure.
    Io,
    /// Failure reported by the cluster store client.
    Client,
    /// The HTTP listener could not start or crashed.
    ListenerFault,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Parse => "parse error",
            ErrorKind::Validation => "validation error",
            ErrorKind::Configuration => "configuration error",
            ErrorKind::Io => "io error",
            ErrorKind::Client => "client error",
            ErrorKind::ListenerFault => "listener fault",
        };
        f.write_str(name)
    }
}

/// Top level error of the administrative surface.
#[derive(Debug, thiserror::Error)]
pub enum AdminError {
    /// Command line could not be parsed.
    #[error(transparent)]
    Parse(#[from] clap::Error),

    /// Invalid argument combination.
    #[error("{0}")]
    Validation(String),

    /// Environment configuration is missing or malformed.
    #[error("{message}")]
    Configuration {
        /// What was wrong.
        message: String,
        /// Underlying parse failure, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Reading a file or stdin failed.
    #[error(transparent)]
    Io(#[from] io::Error),

    /// The cluster store client failed.
    #[error(transparent)]
    Client(#[from] ClientError),

    /// The HTTP listener stopped.
    #[error("listener fault: {0}")]
    ListenerFault(#[source] io::Error),

    /// Another error with added context.
    #[error("{context}: {source}")]
    Context {
        /// Context added at a component boundary.
        context: String,
        /// The wrapped error.
        #[source]
        source: Box<AdminError>,
    },
}

impl AdminError {
    /// Build a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        AdminError::Validation(message.into())
    }

    /// Build a configuration error without an underlying cause.
    pub fn configuration(message: impl Into<String>) -> Self {
        AdminError::Configuration {
            message: message.into(),
            source: None,
        }
    }

    /// Build a configuration error caused by `source`.
    pub fn configuration_caused_by<E>(message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        AdminError::Configuration {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Wrap this error with additional context, keeping its kind.
    pub fn context(self, context: impl Into<String>) -> Self {
        AdminError::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// The kind of the innermost error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            AdminError::Parse(_) => ErrorKind::Parse,
            AdminError::Validation(_) => ErrorKind::Validation,
            AdminError::Configuration { .. } => ErrorKind::Configuration,
            AdminError::Io(_) => ErrorKind::Io,
            AdminError::Client(_) => ErrorKind::Client,
            AdminError::ListenerFault(_) => ErrorKind::ListenerFault,
            AdminError::Context { source, .. } => source.kind(),
        }
    }
}

/// Adds context to results carrying any error convertible into [`AdminError`].
pub trait ResultExt<T> {
    /// Wrap the error with `context`.
    fn context(self, context: impl Into<String>) -> Result<T, AdminError>;

    /// Wrap the error with a lazily built context.
    fn with_context<C, F>(self, f: F) -> Result<T, AdminError>
    where
        C: Into<String>,
        F: FnOnce() -> C;
}

impl<T, E> ResultExt<T> for Result<T, E>
where
    E: Into<AdminError>,
{
    fn context(self, context: impl Into<String>) -> Result<T, AdminError> {
        self.map_err(|e| e.into().context(context))
    }

    fn with_context<C, F>(self, f: F) -> Result<T, AdminError>
    where
        C: Into<String>,
        F: FnOnce() -> C,
    {
        self.map_err(|e| e.into().context(f()))
    }
}
