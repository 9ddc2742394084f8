//! Error taxonomy for request execution and response classification

use thiserror::Error;

/// Result type for transport and classification operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the HTTP engine and the response classifier.
///
/// Every variant carries the call site that produced it and a human-readable
/// message; `Display` renders `"<site>: <message> (<Kind>:<code>)"`.
#[derive(Debug, Error)]
pub enum Error {
    /// The response body could not be decoded as JSON despite a success status
    #[error("{site}: {message} (FailureToParse:0x00)")]
    FailureToParse { site: &'static str, message: String },

    /// Non-2xx status without a structured error payload
    #[error("{site}: {message} (BadResponse:0x01)")]
    BadResponse { site: &'static str, message: String },

    /// Non-2xx status with a server-supplied `error.message`
    #[error("{site}: {message} (ApiError:0x02)")]
    Api { site: &'static str, message: String },

    /// HTTP 429; split out so callers can special-case backoff
    #[error("{site}: {message} (RateLimited:0x03)")]
    RateLimited { site: &'static str, message: String },

    /// Transport-level failure before any HTTP response was received
    #[error("{site}: {message} (ConnectionError:0x04)")]
    Connection { site: &'static str, message: String },

    /// Local file validation failure before a request was issued
    #[error("{site}: {message} (FileError:0x05)")]
    File { site: &'static str, message: String },
}

impl Error {
    pub(crate) fn failure_to_parse(site: &'static str, message: impl ToString) -> Self {
        Error::FailureToParse {
            site,
            message: message.to_string(),
        }
    }

    pub(crate) fn bad_response(site: &'static str, message: impl ToString) -> Self {
        Error::BadResponse {
            site,
            message: message.to_string(),
        }
    }

    pub(crate) fn api(site: &'static str, message: impl ToString) -> Self {
        Error::Api {
            site,
            message: message.to_string(),
        }
    }

    pub(crate) fn rate_limited(site: &'static str, message: impl ToString) -> Self {
        Error::RateLimited {
            site,
            message: message.to_string(),
        }
    }

    pub(crate) fn connection(site: &'static str, message: impl ToString) -> Self {
        Error::Connection {
            site,
            message: message.to_string(),
        }
    }

    pub(crate) fn file(site: &'static str, message: impl ToString) -> Self {
        Error::File {
            site,
            message: message.to_string(),
        }
    }
}
