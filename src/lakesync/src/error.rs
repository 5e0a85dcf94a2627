use arrow::error::ArrowError;
use parquet::errors::ParquetError;
use std::error;
use std::fmt;
use std::io;
use std::panic::Location;
use std::result;
use std::sync::Arc;
use thiserror::Error;

/// Whether a retry could plausibly succeed after a failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorStatus {
    /// Worth retrying: timeouts, interrupted I/O, lost commit races.
    Temporary,
    /// Retrying cannot help: malformed data, unsupported types, not found.
    Permanent,
}

impl ErrorStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorStatus::Temporary => "temporary",
            ErrorStatus::Permanent => "permanent",
        }
    }
}

impl fmt::Display for ErrorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Message, retry class, capture site, and optional cause of one failure.
///
/// Constructors are `#[track_caller]`, so the recorded site is the line that
/// classified the failure, not this module.
#[derive(Clone, Debug)]
pub struct ErrorDetail {
    message: String,
    status: ErrorStatus,
    location: &'static Location<'static>,
    source: Option<Arc<anyhow::Error>>,
}

impl ErrorDetail {
    #[track_caller]
    pub fn transient(message: impl Into<String>) -> Self {
        Self::classified(message.into(), ErrorStatus::Temporary)
    }

    #[track_caller]
    pub fn permanent(message: impl Into<String>) -> Self {
        Self::classified(message.into(), ErrorStatus::Permanent)
    }

    #[track_caller]
    fn classified(message: String, status: ErrorStatus) -> Self {
        Self {
            message,
            status,
            location: Location::caller(),
            source: None,
        }
    }

    /// Attach the underlying error. A later call replaces an earlier one.
    pub fn with_source(mut self, source: impl Into<anyhow::Error>) -> Self {
        self.source = Some(Arc::new(source.into()));
        self
    }

    pub fn status(&self) -> ErrorStatus {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for ErrorDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}, {}:{}]",
            self.message,
            self.status.as_str(),
            self.location.file(),
            self.location.line()
        )?;
        match &self.source {
            Some(source) => write!(f, ": {source}"),
            None => Ok(()),
        }
    }
}

impl error::Error for ErrorDetail {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match &self.source {
            Some(source) => Some(source.as_ref().as_ref()),
            None => None,
        }
    }
}

/// Custom error type for lakesync
#[derive(Clone, Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Arrow(ErrorDetail),

    #[error("{0}")]
    Avro(ErrorDetail),

    #[error("{0}")]
    Io(ErrorDetail),

    #[error("{0}")]
    Json(ErrorDetail),

    #[error("{0}")]
    Parquet(ErrorDetail),

    #[error("{0}")]
    Sql(ErrorDetail),

    #[error("{0}")]
    UnsupportedType(ErrorDetail),

    #[error("null value for required column {0}")]
    RequiredColumnNull(String),

    #[error("table {0} not found in warehouse")]
    TableNotFound(String),

    #[error("snapshot {0} not found")]
    SnapshotNotFound(i64),

    #[error("{0}")]
    CommitConflict(ErrorDetail),

    #[error("operation cancelled")]
    Cancelled,
}

pub type Result<T> = result::Result<T, Error>;

impl Error {
    /// A source column or Iceberg type outside the supported mapping.
    #[track_caller]
    pub fn unsupported_type(message: impl Into<String>) -> Self {
        Error::UnsupportedType(ErrorDetail::permanent(message))
    }

    /// The version hint moved underneath a commit in flight.
    #[track_caller]
    pub fn commit_conflict(message: impl Into<String>) -> Self {
        Error::CommitConflict(ErrorDetail::transient(message))
    }

    /// Whether a retry could plausibly succeed.
    pub fn status(&self) -> ErrorStatus {
        match self {
            Error::Arrow(detail)
            | Error::Avro(detail)
            | Error::Io(detail)
            | Error::Json(detail)
            | Error::Parquet(detail)
            | Error::Sql(detail)
            | Error::UnsupportedType(detail)
            | Error::CommitConflict(detail) => detail.status(),
            Error::RequiredColumnNull(_)
            | Error::TableNotFound(_)
            | Error::SnapshotNotFound(_) => ErrorStatus::Permanent,
            Error::Cancelled => ErrorStatus::Temporary,
        }
    }
}

impl From<ArrowError> for Error {
    #[track_caller]
    fn from(source: ArrowError) -> Self {
        let detail = match &source {
            ArrowError::MemoryError(_) | ArrowError::IoError(_, _) => {
                ErrorDetail::transient("Arrow error")
            }
            _ => ErrorDetail::permanent("Arrow error"),
        };
        Error::Arrow(detail.with_source(source))
    }
}

impl From<ParquetError> for Error {
    #[track_caller]
    fn from(source: ParquetError) -> Self {
        let detail = match &source {
            ParquetError::EOF(_) | ParquetError::NeedMoreData(_) => {
                ErrorDetail::transient("Parquet error")
            }
            _ => ErrorDetail::permanent("Parquet error"),
        };
        Error::Parquet(detail.with_source(source))
    }
}

impl From<apache_avro::Error> for Error {
    #[track_caller]
    fn from(source: apache_avro::Error) -> Self {
        Error::Avro(ErrorDetail::permanent("Avro error").with_source(source))
    }
}

impl From<io::Error> for Error {
    #[track_caller]
    fn from(source: io::Error) -> Self {
        let retryable = matches!(
            source.kind(),
            io::ErrorKind::TimedOut
                | io::ErrorKind::Interrupted
                | io::ErrorKind::WouldBlock
                | io::ErrorKind::BrokenPipe
                | io::ErrorKind::ConnectionRefused
                | io::ErrorKind::ConnectionAborted
                | io::ErrorKind::ConnectionReset
        );
        let detail = if retryable {
            ErrorDetail::transient("IO error")
        } else {
            ErrorDetail::permanent("IO error")
        };
        Error::Io(detail.with_source(source))
    }
}

impl From<serde_json::Error> for Error {
    #[track_caller]
    fn from(source: serde_json::Error) -> Self {
        let detail = match source.classify() {
            serde_json::error::Category::Io => ErrorDetail::transient("JSON error"),
            // Syntax and data-shape problems do not heal on retry.
            _ => ErrorDetail::permanent("JSON error"),
        };
        Error::Json(detail.with_source(source))
    }
}
