use reqwest::StatusCode;

use crate::errors::Error;

/// How the pipeline reacts to a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Superseded or torn down; never retried, never refreshed.
    Cancelled,
    /// 401; only the refresh coordinator handles it.
    AuthExpired,
    /// No response, timeout, or 5xx.
    Transient,
    /// Everything else propagates unchanged.
    Terminal,
}

pub fn classify(err: &Error) -> FailureKind {
    match err {
        Error::Cancelled { .. } => FailureKind::Cancelled,
        Error::Http { status, .. } => classify_status(*status),
        Error::Reqwest(inner) => match inner.status() {
            Some(status) => classify_status(status),
            None if inner.is_timeout() || inner.is_connect() || inner.is_request() => {
                FailureKind::Transient
            }
            None => FailureKind::Terminal,
        },
        Error::Network(_) | Error::Timeout(_) => FailureKind::Transient,
        _ => FailureKind::Terminal,
    }
}

fn classify_status(status: StatusCode) -> FailureKind {
    match status.as_u16() {
        401 => FailureKind::AuthExpired,
        500..=599 => FailureKind::Transient,
        _ => FailureKind::Terminal,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn http(code: u16) -> Error {
        Error::Http {
            status: StatusCode::from_u16(code).unwrap(),
            body: String::new(),
        }
    }

    #[test]
    fn server_errors_and_network_failures_are_transient() {
        assert_eq!(classify(&http(500)), FailureKind::Transient);
        assert_eq!(classify(&http(503)), FailureKind::Transient);
        assert_eq!(classify(&http(599)), FailureKind::Transient);
        assert_eq!(classify(&Error::Network("reset".into())), FailureKind::Transient);
        assert_eq!(
            classify(&Error::Timeout(Duration::from_secs(1))),
            FailureKind::Transient
        );
    }

    #[test]
    fn unauthorized_is_left_to_refresh() {
        assert_eq!(classify(&http(401)), FailureKind::AuthExpired);
    }

    #[test]
    fn client_and_business_errors_are_terminal() {
        assert_eq!(classify(&http(400)), FailureKind::Terminal);
        assert_eq!(classify(&http(404)), FailureKind::Terminal);
        assert_eq!(classify(&http(429)), FailureKind::Terminal);
        assert_eq!(
            classify(&Error::Business {
                code: 500,
                message: "boom".into()
            }),
            FailureKind::Terminal
        );
        assert_eq!(
            classify(&Error::Cancelled { key: "k".into() }),
            FailureKind::Cancelled
        );
    }
}
