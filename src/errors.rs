use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;

#[derive(Debug)]
pub enum Error {
    Io(std::io::Error),
    Json(serde_json::Error),
    Reqwest(reqwest::Error),
    /// Non-2xx response that no recovery path handled.
    Http { status: StatusCode, body: String },
    /// Transport failure with no response (connection refused, reset, DNS).
    Network(String),
    Timeout(Duration),
    /// Superseded by a newer identical request or torn down by `cancel_all`.
    Cancelled { key: String },
    /// The refresh exchange failed; tokens have been cleared.
    Unauthenticated(Arc<Error>),
    /// Envelope `code` differed from the configured success code.
    Business { code: i64, message: String },
    MissingRefreshToken,
    Config(String),
    Crypto(String),
}

impl Error {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled { .. })
    }

    pub fn is_unauthenticated(&self) -> bool {
        matches!(self, Error::Unauthenticated(_))
    }

    /// HTTP status carried by the error, when a response was received.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Error::Http { status, .. } => Some(*status),
            Error::Reqwest(err) => err.status(),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(err) => write!(f, "io error: {err}"),
            Error::Json(err) => write!(f, "json error: {err}"),
            Error::Reqwest(err) => write!(f, "http client error: {err}"),
            Error::Http { status, body } => write!(f, "http status {status}: {body}"),
            Error::Network(msg) => write!(f, "network error: {msg}"),
            Error::Timeout(after) => write!(f, "request timed out after {}ms", after.as_millis()),
            Error::Cancelled { key } => write!(f, "request cancelled: {key}"),
            Error::Unauthenticated(cause) => write!(f, "unauthenticated: {cause}"),
            Error::Business { code, message } => {
                write!(f, "request failed with code {code}: {message}")
            }
            Error::MissingRefreshToken => write!(f, "no refresh token available; login required"),
            Error::Config(msg) => write!(f, "config error: {msg}"),
            Error::Crypto(msg) => write!(f, "crypto error: {msg}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            Error::Json(err) => Some(err),
            Error::Reqwest(err) => Some(err),
            Error::Unauthenticated(cause) => Some(cause.as_ref()),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Json(err)
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Reqwest(err)
    }
}
