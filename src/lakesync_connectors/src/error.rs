use lakesync::error::{Error, ErrorDetail};

/// Lift a sqlx failure into the shared error type, classifying retryability
/// the way the driver reports it.
#[track_caller]
pub(crate) fn sqlx_error(source: sqlx::Error) -> Error {
    let detail = match &source {
        sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) | sqlx::Error::PoolClosed => {
            ErrorDetail::transient("sqlx error")
        }
        // All other errors are permanent
        _ => ErrorDetail::permanent("sqlx error"),
    };
    Error::Sql(detail.with_source(source))
}

#[track_caller]
pub(crate) fn decode_error(message: String) -> Error {
    Error::Sql(ErrorDetail::permanent(message))
}
