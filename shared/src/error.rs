//! Error types for the RSVP service.

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// PostgreSQL SQLSTATE codes that mean "lost a concurrency race, try again".
const SERIALIZATION_FAILURE: &str = "40001";
const DEADLOCK_DETECTED: &str = "40P01";
const UNIQUE_VIOLATION: &str = "23505";

/// Errors that can occur while serving RSVP requests.
///
/// Messages may name the offending field or entity but never carry a family
/// access token.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Malformed or missing input
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Unknown family or wrong access token (deliberately indistinguishable)
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Caller lacks the administrator privilege, or the CSRF token is invalid
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Referenced entity does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// The path exists but not for this HTTP method
    #[error("Method not allowed: {0}")]
    MethodNotAllowed(String),

    /// The write would push an event over its attendance cap
    #[error("Cap exceeded: {0}")]
    CapExceeded(String),

    /// Lost an optimistic-concurrency race and ran out of retries
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Storage is unavailable, erroring, or past the request deadline
    #[error("Store failure: {0}")]
    StoreFailure(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Get HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            Error::BadRequest(_) => 400,
            Error::Unauthorized(_) => 401,
            Error::Forbidden(_) => 403,
            Error::NotFound(_) => 404,
            Error::MethodNotAllowed(_) => 405,
            Error::CapExceeded(_) | Error::Conflict(_) => 409,
            Error::StoreFailure(_) => 503,
            Error::Config(_) | Error::Internal(_) => 500,
        }
    }

    /// Stable machine-readable name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::BadRequest(_) => "bad_request",
            Error::Unauthorized(_) => "unauthorized",
            Error::Forbidden(_) => "forbidden",
            Error::NotFound(_) => "not_found",
            Error::MethodNotAllowed(_) => "method_not_allowed",
            Error::CapExceeded(_) => "cap_exceeded",
            Error::Conflict(_) => "conflict",
            Error::StoreFailure(_) => "store_failure",
            Error::Config(_) => "config",
            Error::Internal(_) => "internal",
        }
    }

    /// Whether the caller may safely resubmit the same request.
    ///
    /// RSVP writes are full replacements, so resubmission never double counts.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::StoreFailure(_) | Error::Conflict(_))
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        if let Some(db_err) = err.as_database_error() {
            match db_err.code().as_deref() {
                Some(SERIALIZATION_FAILURE) | Some(DEADLOCK_DETECTED) => {
                    return Error::Conflict(db_err.message().to_string());
                }
                Some(UNIQUE_VIOLATION) if db_err.constraint() == Some("families_token_key") => {
                    return Error::BadRequest(
                        "token: already assigned to another family".to_string(),
                    );
                }
                _ => {}
            }
        }
        Error::StoreFailure(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Internal(format!("Serialization error: {}", err))
    }
}
