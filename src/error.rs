//! Errors raised by the segmenter, the evaluator, and the finalizer.
use std::path::PathBuf;

use tracing_error::SpanTrace;

#[derive(Debug, thiserror::Error)]
pub enum Kind {
    #[error("no line contains the node marker {marker:?}")]
    MissingMarker { marker: String },
    #[error("layout tool {program:?} not found on PATH or in {searched:?}")]
    ToolNotFound { program: String, searched: Vec<PathBuf> },
    #[error("layout tool {program:?} failed")]
    ProcessError {
        program: PathBuf,
        #[source] source: std::io::Error,
    },
    #[error("layout tool {program:?} exited with {status}")]
    ToolFailed { program: PathBuf, status: String },
    #[error("cannot register signal handler")]
    SignalError {
        #[source] source: std::io::Error,
    },
    #[error("io error on {path:?}")]
    IoError {
        path: PathBuf,
        #[source] source: std::io::Error,
    },
}

/// A [Kind] plus the span trace that was active when it was raised.
#[derive(Debug)]
pub struct Error {
    pub kind: Kind,
    pub span_trace: SpanTrace,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.kind, f)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        std::error::Error::source(&self.kind)
    }
}

impl Error {
    pub fn kind(&self) -> &Kind {
        &self.kind
    }
}

impl From<Kind> for Error {
    fn from(kind: Kind) -> Self {
        Self { kind, span_trace: SpanTrace::capture() }
    }
}

pub trait OrErrExt {
    type Item;
    fn or_err(self, kind: Kind) -> Result<Self::Item, Error>;
}

impl<V> OrErrExt for Option<V> {
    type Item = V;
    fn or_err(self, kind: Kind) -> Result<V, Error> {
        self.ok_or_else(|| Error::from(kind))
    }
}

/// Attach the path being read or written to an [std::io::Error].
pub trait IoErrExt {
    type Item;
    fn at_path(self, path: impl Into<PathBuf>) -> Result<Self::Item, Error>;
}

impl<V> IoErrExt for Result<V, std::io::Error> {
    type Item = V;
    fn at_path(self, path: impl Into<PathBuf>) -> Result<V, Error> {
        self.map_err(|source| Error::from(Kind::IoError { path: path.into(), source }))
    }
}
