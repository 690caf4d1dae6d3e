use std::fmt;

/// Error taxonomy for the search subsystem. Kinds, not types: callers branch
/// on `kind`, infrastructure errors are folded into the closest user-visible
/// one rather than bubbling raw driver errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// User-visible precondition failure (empty query, page out of range).
    Validation,
    /// Aggregate id missing.
    NotFound,
    /// Uniqueness violation (duplicate content hash, duplicate idempotency key).
    Conflict,
    /// AnalyzerOrContentDrift during projection upsert; recoverable via force_replace.
    ConcurrencyDrift,
    /// Store busy / lock contention; retried with backoff by the caller.
    Transient,
    /// FTS5 or trigram module unavailable; search routes disabled.
    SchemaUnavailable,
    /// Store corruption or unrecoverable state.
    Fatal,
}

#[derive(Debug, Clone)]
pub struct Error {
    pub kind: ErrorKind,
    pub context: String,
}

impl Error {
    pub fn new(kind: ErrorKind, context: impl Into<String>) -> Self {
        Error {
            kind,
            context: context.into(),
        }
    }

    pub fn validation(context: impl Into<String>) -> Self {
        Error::new(ErrorKind::Validation, context)
    }

    pub fn not_found(context: impl Into<String>) -> Self {
        Error::new(ErrorKind::NotFound, context)
    }

    pub fn conflict(context: impl Into<String>) -> Self {
        Error::new(ErrorKind::Conflict, context)
    }

    pub fn concurrency_drift(context: impl Into<String>) -> Self {
        Error::new(ErrorKind::ConcurrencyDrift, context)
    }

    pub fn schema_unavailable(context: impl Into<String>) -> Self {
        Error::new(ErrorKind::SchemaUnavailable, context)
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self.kind, ErrorKind::Transient)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.context)
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::new(ErrorKind::Transient, err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::new(ErrorKind::Validation, err.to_string())
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, _)
                if e.code == rusqlite::ErrorCode::DatabaseBusy
                    || e.code == rusqlite::ErrorCode::DatabaseLocked =>
            {
                Error::new(ErrorKind::Transient, err.to_string())
            }
            rusqlite::Error::QueryReturnedNoRows => {
                Error::new(ErrorKind::NotFound, err.to_string())
            }
            rusqlite::Error::SqliteFailure(e, _)
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Error::new(ErrorKind::Conflict, err.to_string())
            }
            _ => Error::new(ErrorKind::Fatal, err.to_string()),
        }
    }
}

impl From<r2d2::Error> for Error {
    fn from(err: r2d2::Error) -> Self {
        Error::new(ErrorKind::Transient, err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
