//! Error types and transport error-code mapping.
//!
//! Two failure channels meet here. Local I/O failures (reading the upload
//! source, writing the response sink) are carried as [`RequestError::Io`].
//! Everything else comes from the transport engine as a raw integer and is
//! translated by [`map_error_code`]. Illegal API usage is a separate type,
//! [`StateError`], so it can never be mistaken for a network outcome.

use std::io;
use std::sync::Arc;

use thiserror::Error;

/// Error codes reported by the transport engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// 0 - request completed without error
    Success,
    /// 1 - unclassified failure, see the engine's error string
    Unknown,
    /// 2 - the URL could not be parsed
    MalformedUrl,
    /// 3 - connecting to the server timed out
    ConnectionTimedOut,
    /// 4 - the host name could not be resolved
    UnknownHost,
}

impl ErrorCode {
    /// Parses a raw engine code. Returns `None` for codes outside the known set.
    ///
    /// ```
    /// # use netreq::error::ErrorCode;
    /// assert_eq!(ErrorCode::from_raw(4), Some(ErrorCode::UnknownHost));
    /// assert_eq!(ErrorCode::from_raw(99), None);
    /// ```
    pub fn from_raw(code: i32) -> Option<Self> {
        match code {
            0 => Some(ErrorCode::Success),
            1 => Some(ErrorCode::Unknown),
            2 => Some(ErrorCode::MalformedUrl),
            3 => Some(ErrorCode::ConnectionTimedOut),
            4 => Some(ErrorCode::UnknownHost),
            _ => None,
        }
    }

    /// Returns the raw integer the engine uses for this code.
    pub fn as_raw(&self) -> i32 {
        match self {
            ErrorCode::Success => 0,
            ErrorCode::Unknown => 1,
            ErrorCode::MalformedUrl => 2,
            ErrorCode::ConnectionTimedOut => 3,
            ErrorCode::UnknownHost => 4,
        }
    }
}

/// Outcome errors of a request, as returned by `UrlRequest::exception`.
#[derive(Debug, Clone, Error)]
pub enum RequestError {
    /// Generic engine failure carrying the engine's own message.
    #[error("{0}")]
    Failed(String),

    #[error("malformed URL: {0}")]
    MalformedUrl(String),

    #[error("connection timed out")]
    ConnectionTimedOut,

    /// Holds the host name only, not the full URL.
    #[error("unknown host: {0}")]
    UnknownHost(String),

    /// Reading the upload source or writing the response sink failed.
    #[error("i/o error: {0}")]
    Io(Arc<io::Error>),

    /// The engine reported a code outside the known set. Only recorded in
    /// completion outcomes; `UrlRequest::exception` panics instead.
    #[error("unrecognized error code: {0}")]
    Unrecognized(i32),
}

impl RequestError {
    /// Returns the underlying I/O error for local failures.
    pub fn as_io(&self) -> Option<&io::Error> {
        match self {
            RequestError::Io(e) => Some(e),
            _ => None,
        }
    }
}

/// Illegal operation ordering on a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StateError {
    #[error("request already started")]
    AlreadyStarted,

    #[error("upload body already set")]
    UploadAlreadySet,

    #[error("accessing recycled request")]
    Recycled,
}

/// Failure to construct a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BuildError {
    #[error("{0} is required")]
    MissingArgument(&'static str),
}

/// Translates a raw engine error code into a typed error.
///
/// Returns `None` for success. `error_string` is only consulted for
/// [`ErrorCode::Unknown`].
///
/// # Panics
///
/// Panics if `code` is outside the known set; the engine promised never to
/// report such a code.
pub fn map_error_code<F>(code: i32, url: &str, error_string: F) -> Option<RequestError>
where
    F: FnOnce() -> String,
{
    match try_map_error_code(code, url, error_string) {
        Ok(error) => error,
        Err(code) => panic!("unrecognized error code: {code}"),
    }
}

/// Like [`map_error_code`], but hands an unrecognized code back as `Err`.
pub fn try_map_error_code<F>(code: i32, url: &str, error_string: F) -> Result<Option<RequestError>, i32>
where
    F: FnOnce() -> String,
{
    let Some(known) = ErrorCode::from_raw(code) else {
        return Err(code);
    };

    Ok(match known {
        ErrorCode::Success => None,
        ErrorCode::Unknown => Some(RequestError::Failed(error_string())),
        ErrorCode::MalformedUrl => Some(RequestError::MalformedUrl(url.to_string())),
        ErrorCode::ConnectionTimedOut => Some(RequestError::ConnectionTimedOut),
        ErrorCode::UnknownHost => Some(RequestError::UnknownHost(host_of(url))),
    })
}

/// Host portion of `url`, or the whole string when it does not parse.
fn host_of(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_else(|| url.to_string())
}
