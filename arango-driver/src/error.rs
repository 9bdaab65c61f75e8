// SPDX-License-Identifier: PMPL-1.0-or-later
//! Error types for the driver.
//!
//! Everything a caller can observe funnels into [`DriverError`]: transport
//! failures, structured ArangoDB error payloads, plain HTTP errors, and
//! body-decoding problems. Leader redirects never surface here; the
//! dispatcher absorbs them.

use thiserror::Error;

use crate::response::ResponseBody;
use crate::transport::TransportError;

/// Errors returned by the driver.
#[derive(Debug, Error)]
pub enum DriverError {
    /// Structured error payload returned by the database, possibly with an
    /// HTTP 200 status. Carries the server's own error number and code.
    #[error("ArangoDB error {error_num}: {message}")]
    Arango {
        /// HTTP-level code reported inside the payload.
        code: u16,
        /// ArangoDB error number (`errorNum` on the wire).
        error_num: i64,
        /// Server-provided error message.
        message: String,
    },

    /// Non-2xx response without the structured ArangoDB error shape.
    #[error("unexpected HTTP status {status}")]
    Http {
        /// HTTP status code of the response.
        status: u16,
        /// Classified response body as received.
        body: ResponseBody,
    },

    /// Connection-level failure reported by the transport.
    #[error("connection error: {0}")]
    Transport(#[from] TransportError),

    /// The server promised JSON but the body did not parse.
    #[error("failed to parse server response: {message}")]
    BadResponse {
        /// Parser diagnostic.
        message: String,
        /// HTTP status code of the offending response.
        status: u16,
        /// Raw body, lossily decoded for inspection.
        body: String,
    },

    /// Request payload could not be encoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Client-side validation failure (malformed URL, bad option).
    #[error("validation error: {0}")]
    Validation(String),

    /// The connection was dropped before the request settled.
    #[error("connection closed before the request was settled")]
    ConnectionClosed,
}

impl DriverError {
    /// ArangoDB error number, if this is a structured application error.
    pub fn error_num(&self) -> Option<i64> {
        match self {
            DriverError::Arango { error_num, .. } => Some(*error_num),
            _ => None,
        }
    }

    /// HTTP status, for both structured and plain HTTP errors.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            DriverError::Arango { code, .. } => Some(*code),
            DriverError::Http { status, .. } => Some(*status),
            DriverError::BadResponse { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Convenience alias used across the driver.
pub type Result<T> = std::result::Result<T, DriverError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DriverError::Arango {
            code: 404,
            error_num: 1202,
            message: "document not found".into(),
        };
        assert_eq!(err.to_string(), "ArangoDB error 1202: document not found");

        let err = DriverError::Http {
            status: 500,
            body: ResponseBody::Text("boom".into()),
        };
        assert_eq!(err.to_string(), "unexpected HTTP status 500");
    }

    #[test]
    fn test_error_accessors() {
        let err = DriverError::Arango {
            code: 409,
            error_num: 1210,
            message: "conflict".into(),
        };
        assert_eq!(err.error_num(), Some(1210));
        assert_eq!(err.http_status(), Some(409));

        let err = DriverError::Validation("bad url".into());
        assert_eq!(err.error_num(), None);
        assert_eq!(err.http_status(), None);
    }
}
