//! Response container and outcome classification
//!
//! A [`Response`] is constructed exactly once per request from the raw
//! [`Transfer`] and never mutated afterwards. Classification order matters:
//! rate limiting is checked before any JSON-shape inspection, then the body
//! is decoded, then non-success statuses are split into structured API
//! errors and bare bad responses.

use crate::http::{Error, Result, Transfer};
use serde_json::Value;

/// Immutable, classified outcome of one HTTP exchange.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Response {
    pub status_code: u16,
    /// Elapsed transfer time in seconds
    pub elapsed: f64,
    pub status_line: String,
    /// Raw body text
    pub content: String,
    /// Effective URL after redirects
    pub url: String,
    pub reason: String,
    /// Parsed JSON tree; `Null` for an empty body
    pub raw_json: Value,
}

impl Response {
    /// Classify raw transport output.
    ///
    /// - 429 fails as [`Error::RateLimited`] before the body is inspected.
    /// - An empty body decodes to JSON null, not an error.
    /// - Other non-2xx statuses fail as [`Error::Api`] when the body carries
    ///   an `error.message` field, otherwise as [`Error::BadResponse`] with
    ///   the reason phrase.
    /// - A JSON decode failure on a success status fails as
    ///   [`Error::FailureToParse`].
    pub fn from_transfer(transfer: Transfer) -> Result<Self> {
        const SITE: &str = "Response::from_transfer";

        if transfer.status_code == 429 {
            return Err(Error::rate_limited(SITE, &transfer.reason));
        }

        let success = (200..300).contains(&transfer.status_code);
        let raw_json = if transfer.content.trim().is_empty() {
            Value::Null
        } else {
            match serde_json::from_str::<Value>(&transfer.content) {
                Ok(value) => value,
                Err(e) if success => return Err(Error::failure_to_parse(SITE, e)),
                Err(_) => Value::Null,
            }
        };

        if !success {
            if let Some(message) = raw_json
                .get("error")
                .and_then(|e| e.get("message"))
                .and_then(Value::as_str)
            {
                return Err(Error::api(SITE, message));
            }
            return Err(Error::bad_response(SITE, &transfer.reason));
        }

        Ok(Self {
            status_code: transfer.status_code,
            elapsed: transfer.elapsed,
            status_line: transfer.status_line,
            content: transfer.content,
            url: transfer.url,
            reason: transfer.reason,
            raw_json,
        })
    }
}

impl<I> std::ops::Index<I> for Response
where
    I: serde_json::value::Index,
{
    type Output = Value;

    fn index(&self, index: I) -> &Value {
        &self.raw_json[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn transfer(status_code: u16, reason: &str, content: &str) -> Transfer {
        Transfer {
            status_code,
            reason: reason.to_string(),
            content: content.to_string(),
            ..Transfer::default()
        }
    }

    #[test]
    fn success_with_json_body() {
        let response =
            Response::from_transfer(transfer(200, "OK", r#"{"id":"r-1"}"#)).unwrap();
        assert_eq!(response["id"], "r-1");
        assert_eq!(response.status_code, 200);
    }

    #[test]
    fn empty_body_is_not_an_error() {
        let response = Response::from_transfer(transfer(200, "OK", "")).unwrap();
        assert_eq!(response.raw_json, Value::Null);
    }

    #[test]
    fn rate_limit_precedes_json_inspection() {
        // Empty body on purpose: classification must not reach the decoder.
        let err = Response::from_transfer(transfer(429, "Too Many Requests", "")).unwrap_err();
        assert!(matches!(err, Error::RateLimited { .. }), "{err}");
        assert!(err.to_string().contains("Too Many Requests"));
    }

    #[test]
    fn structured_error_payload_becomes_api_error() {
        let body = r#"{"error":{"message":"model is overloaded","type":"server_error"}}"#;
        let err = Response::from_transfer(transfer(500, "Internal Server Error", body))
            .unwrap_err();
        match err {
            Error::Api { ref message, .. } => assert_eq!(message, "model is overloaded"),
            other => panic!("expected ApiError, got {other}"),
        }
    }

    #[test_case(404, "Not Found", "" ; "not found, empty body")]
    #[test_case(500, "Internal Server Error", r#"{"detail":"?"}"# ; "json body without error object")]
    #[test_case(502, "Bad Gateway", "upstream said no" ; "non-json body")]
    fn unstructured_failure_carries_reason_phrase(status: u16, reason: &str, body: &str) {
        let err = Response::from_transfer(transfer(status, reason, body)).unwrap_err();
        match err {
            Error::BadResponse { ref message, .. } => assert_eq!(message, reason),
            other => panic!("expected BadResponse, got {other}"),
        }
    }

    #[test]
    fn malformed_body_on_success_status_fails_to_parse() {
        let err = Response::from_transfer(transfer(200, "OK", "{ not json")).unwrap_err();
        assert!(matches!(err, Error::FailureToParse { .. }), "{err}");
    }
}
