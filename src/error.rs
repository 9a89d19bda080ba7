//! Error handling for the resolver core.
//!
//! Two layers:
//! * [`Error`]/[`ErrorKind`] — a transport-generic, gRPC-status-coded error,
//!   used by the low-level modules (`http`, `cipher`, `token`, `cache`).
//! * [`Failure`] — the resolver-facing taxonomy: a handful of cases the
//!   stream and lyrics resolvers reason about explicitly while falling back
//!   between client profiles.
//!
//! # Example
//!
//! ```rust
//! use ytm_resolver::error::{Error, ErrorKind, Result};
//!
//! fn do_something() -> Result<()> {
//!     if false {
//!         return Err(Error::not_found("video unavailable"));
//!     }
//!     Ok(())
//! }
//! ```

#![allow(clippy::enum_glob_use)]

use std::fmt;

use thiserror::Error as ThisError;

/// Main error type combining error kind and details.
#[derive(Debug)]
pub struct Error {
    /// Classification of the error.
    pub kind: ErrorKind,
    /// Details of the underlying error.
    pub error: Box<dyn std::error::Error + Send + Sync>,
}

impl Error {
    /// Attempts to downcast the underlying error to a concrete type.
    #[must_use]
    pub fn downcast<E>(&self) -> Option<&E>
    where
        E: std::error::Error + 'static,
    {
        self.error.downcast_ref::<E>()
    }
}

/// Standard result type for resolver operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error categories based on gRPC status codes.
///
/// See [gRPC status codes](https://github.com/googleapis/googleapis/blob/master/google/rpc/code.proto).
#[expect(clippy::module_name_repetitions)]
#[derive(Clone, Copy, Debug, Eq, ThisError, Hash, Ord, PartialEq, PartialOrd)]
pub enum ErrorKind {
    /// HTTP Mapping: 499 Client Closed Request
    #[error("operation was cancelled")]
    Cancelled = 1,

    /// HTTP Mapping: 500 Internal Server Error
    #[error("unknown error")]
    Unknown = 2,

    /// HTTP Mapping: 400 Bad Request
    #[error("invalid argument specified")]
    InvalidArgument = 3,

    /// HTTP Mapping: 504 Gateway Timeout
    #[error("operation timed out")]
    DeadlineExceeded = 4,

    /// HTTP Mapping: 404 Not Found
    #[error("not found")]
    NotFound = 5,

    /// HTTP Mapping: 409 Conflict
    #[error("attempt to create what already exists")]
    AlreadyExists = 6,

    /// HTTP Mapping: 403 Forbidden
    #[error("permission denied")]
    PermissionDenied = 7,

    /// HTTP Mapping: 401 Unauthorized
    #[error("no valid authentication credentials")]
    Unauthenticated = 16,

    /// HTTP Mapping: 429 Too Many Requests
    #[error("resource has been exhausted")]
    ResourceExhausted = 8,

    /// HTTP Mapping: 400 Bad Request
    #[error("invalid state")]
    FailedPrecondition = 9,

    /// HTTP Mapping: 409 Conflict
    #[error("operation aborted")]
    Aborted = 10,

    /// HTTP Mapping: 400 Bad Request
    #[error("out of range")]
    OutOfRange = 11,

    /// HTTP Mapping: 501 Not Implemented
    #[error("not implemented")]
    Unimplemented = 12,

    /// HTTP Mapping: 500 Internal Server Error
    #[error("internal error")]
    Internal = 13,

    /// HTTP Mapping: 503 Service Unavailable
    #[error("service unavailable")]
    Unavailable = 14,

    /// HTTP Mapping: 500 Internal Server Error
    #[error("unrecoverable data loss or corruption")]
    DataLoss = 15,
}

macro_rules! ctor {
    ($name:ident, $kind:ident) => {
        #[doc = concat!("Creates an error of kind `ErrorKind::", stringify!($kind), "`.")]
        pub fn $name<E>(error: E) -> Self
        where
            E: Into<Box<dyn std::error::Error + Send + Sync>>,
        {
            Self {
                kind: ErrorKind::$kind,
                error: error.into(),
            }
        }
    };
}

impl Error {
    /// Creates a new error with an explicit kind.
    pub fn new<E>(kind: ErrorKind, error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self {
            kind,
            error: error.into(),
        }
    }

    ctor!(aborted, Aborted);
    ctor!(already_exists, AlreadyExists);
    ctor!(cancelled, Cancelled);
    ctor!(data_loss, DataLoss);
    ctor!(deadline_exceeded, DeadlineExceeded);
    ctor!(failed_precondition, FailedPrecondition);
    ctor!(internal, Internal);
    ctor!(invalid_argument, InvalidArgument);
    ctor!(not_found, NotFound);
    ctor!(out_of_range, OutOfRange);
    ctor!(permission_denied, PermissionDenied);
    ctor!(resource_exhausted, ResourceExhausted);
    ctor!(unauthenticated, Unauthenticated);
    ctor!(unavailable, Unavailable);
    ctor!(unimplemented, Unimplemented);
    ctor!(unknown, Unknown);
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.error)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.error.as_ref())
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        use std::io::ErrorKind as IoKind;
        let kind = match e.kind() {
            IoKind::NotFound => ErrorKind::NotFound,
            IoKind::PermissionDenied => ErrorKind::PermissionDenied,
            IoKind::AlreadyExists => ErrorKind::AlreadyExists,
            IoKind::TimedOut => ErrorKind::DeadlineExceeded,
            IoKind::Interrupted => ErrorKind::Cancelled,
            _ => ErrorKind::Unknown,
        };
        Self::new(kind, e)
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        let kind = if e.is_timeout() {
            ErrorKind::DeadlineExceeded
        } else if e.is_connect() {
            ErrorKind::Unavailable
        } else if let Some(status) = e.status() {
            match status.as_u16() {
                401 => ErrorKind::Unauthenticated,
                403 => ErrorKind::PermissionDenied,
                404 => ErrorKind::NotFound,
                429 => ErrorKind::ResourceExhausted,
                400..=499 => ErrorKind::InvalidArgument,
                _ => ErrorKind::Unavailable,
            }
        } else if e.is_decode() {
            ErrorKind::Internal
        } else {
            ErrorKind::Unknown
        };
        Self::new(kind, e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::new(ErrorKind::Internal, e)
    }
}

impl From<url::ParseError> for Error {
    fn from(e: url::ParseError) -> Self {
        Self::new(ErrorKind::InvalidArgument, e)
    }
}

impl From<http::header::InvalidHeaderValue> for Error {
    fn from(e: http::header::InvalidHeaderValue) -> Self {
        Self::new(ErrorKind::InvalidArgument, e)
    }
}

impl From<http::header::MaxSizeReached> for Error {
    fn from(e: http::header::MaxSizeReached) -> Self {
        Self::new(ErrorKind::Internal, e)
    }
}

impl From<tokio::time::error::Elapsed> for Error {
    fn from(e: tokio::time::error::Elapsed) -> Self {
        Self::new(ErrorKind::DeadlineExceeded, e)
    }
}

impl From<std::num::ParseIntError> for Error {
    fn from(e: std::num::ParseIntError) -> Self {
        Self::new(ErrorKind::InvalidArgument, e)
    }
}

/// Resolver-facing failure taxonomy.
///
/// Unlike [`Error`], which is a generic transport-layer error, `Failure` is
/// what the stream resolver's fallback loop reasons about: whether to try
/// the next client profile, whether to retry after a token refresh, or
/// whether to give up and surface something to the caller.
#[derive(Debug, ThisError)]
pub enum Failure {
    /// Retry worthwhile: network timeout, 5xx, failed HEAD probe, JSON parse
    /// error. Absorbed by the resolver loop and not surfaced unless every
    /// profile fails.
    #[error("transient failure on profile {profile}: {source}")]
    Transient {
        /// Name of the profile that produced this failure.
        profile: &'static str,
        /// Underlying error.
        #[source]
        source: Error,
    },

    /// The server indicated bot suspicion. Triggers one token regeneration;
    /// if the retry still fails it resumes as [`Failure::Transient`].
    #[error("profile {profile} requires an origin token")]
    NeedsOriginToken {
        /// Name of the profile that produced this failure.
        profile: &'static str,
    },

    /// Playability verdict intrinsic to the video: age-restricted, requires
    /// login, unavailable, or a live stream the resolver cannot serve.
    #[error("content refused by profile {profile}: {reason}")]
    ContentRefused {
        /// Name of the profile that produced this failure.
        profile: &'static str,
        /// Human-readable reason reported by the server.
        reason: String,
    },

    /// The response parsed successfully but no audio-only variant survived
    /// format selection.
    #[error("no suitable audio format from profile {profile}")]
    NoSuitableFormat {
        /// Name of the profile that produced this failure.
        profile: &'static str,
    },

    /// The requested operation needs credentials the core does not hold
    /// (library endpoints outside the resolve path).
    #[error("unauthenticated")]
    Unauthenticated,
}

/// Result type for resolver-facing operations that report [`Failure`]
/// instead of a generic [`Error`].
pub type ResolveResult<T> = std::result::Result<T, Failure>;

impl Failure {
    /// Returns the profile name this failure is attributed to, if any.
    #[must_use]
    pub fn profile(&self) -> Option<&'static str> {
        match self {
            Self::Transient { profile, .. }
            | Self::NeedsOriginToken { profile }
            | Self::ContentRefused { profile, .. }
            | Self::NoSuitableFormat { profile } => Some(profile),
            Self::Unauthenticated => None,
        }
    }
}
