// SPDX-License-Identifier: PMPL-1.0-or-later
//! Response classification.
//!
//! Raw transport responses are turned into exactly one of: a typed success
//! ([`ArangoResponse`]), a structured application error (the server's
//! `error`/`code`/`errorMessage`/`errorNum` payload, honored even on HTTP
//! 200), or a plain HTTP error. Nothing downstream ever inspects raw bytes
//! or sniffs object shapes; the tagged [`ResponseBody`] is the only body
//! representation that leaves this module.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{DriverError, Result};
use crate::transport::TransportResponse;

/// Media types parsed as JSON: a `json` or `javascript` token directly
/// after the type/subtype slash.
fn json_media_type() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"/(json|javascript)(\W|$)").expect("valid media-type pattern"))
}

/// Classified response payload.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    /// Parsed JSON document.
    Json(Value),
    /// Text (lossy UTF-8) for non-JSON responses when binary was not
    /// requested. An empty body lands here as an empty string.
    Text(String),
    /// Opaque bytes when the caller asked for binary output.
    Bytes(Vec<u8>),
}

impl ResponseBody {
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            ResponseBody::Json(value) => Some(value),
            _ => None,
        }
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            ResponseBody::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn bytes(&self) -> Option<&[u8]> {
        match self {
            ResponseBody::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }
}

/// A successful response, annotated with the serving host.
#[derive(Debug, Clone)]
pub struct ArangoResponse {
    pub status: u16,
    /// Response headers, lowercase names.
    pub headers: HashMap<String, String>,
    pub body: ResponseBody,
    /// Registry index of the host that served this response. Cursors use
    /// this to pin follow-up batch fetches to the same coordinator.
    pub host: Option<usize>,
}

impl ArangoResponse {
    /// Look up a response header by its lowercase name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    /// Deserialize the JSON body into a typed value.
    ///
    /// # Errors
    /// Fails when the body was not classified as JSON or does not match
    /// the target type.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        match &self.body {
            ResponseBody::Json(value) => {
                serde_json::from_value(value.clone()).map_err(|e| DriverError::BadResponse {
                    message: e.to_string(),
                    status: self.status,
                    body: value.to_string(),
                })
            }
            ResponseBody::Text(text) => Err(DriverError::BadResponse {
                message: "expected a JSON response body".into(),
                status: self.status,
                body: text.clone(),
            }),
            ResponseBody::Bytes(bytes) => Err(DriverError::BadResponse {
                message: "expected a JSON response body".into(),
                status: self.status,
                body: format!("<{} binary bytes>", bytes.len()),
            }),
        }
    }
}

/// Classify a raw transport response.
///
/// Order mirrors the server contract: parse JSON-ish bodies first, honor
/// the structured error shape regardless of status, then fall back to the
/// plain HTTP status check.
pub(crate) fn classify(raw: TransportResponse, expect_binary: bool) -> Result<ArangoResponse> {
    let TransportResponse {
        status,
        headers,
        body,
    } = raw;

    let json_expected = !body.is_empty()
        && headers
            .get("content-type")
            .is_some_and(|ct| json_media_type().is_match(ct));

    let body = if json_expected {
        match serde_json::from_slice::<Value>(&body) {
            Ok(value) => ResponseBody::Json(value),
            Err(err) if !expect_binary => {
                return Err(DriverError::BadResponse {
                    message: err.to_string(),
                    status,
                    body: String::from_utf8_lossy(&body).into_owned(),
                });
            }
            Err(_) => ResponseBody::Bytes(body),
        }
    } else if !expect_binary {
        ResponseBody::Text(String::from_utf8_lossy(&body).into_owned())
    } else {
        ResponseBody::Bytes(body)
    };

    if let ResponseBody::Json(value) = &body {
        if let Some(err) = application_error(value, status) {
            return Err(err);
        }
    }

    if status >= 400 {
        return Err(DriverError::Http { status, body });
    }

    Ok(ArangoResponse {
        status,
        headers,
        body,
        host: None,
    })
}

/// Detect the structured ArangoDB error shape: an object carrying all of
/// `error`, `code`, `errorMessage`, `errorNum`.
fn application_error(value: &Value, status: u16) -> Option<DriverError> {
    let obj = value.as_object()?;
    let complete = ["error", "code", "errorMessage", "errorNum"]
        .iter()
        .all(|key| obj.contains_key(*key));
    if !complete {
        return None;
    }
    Some(DriverError::Arango {
        code: obj
            .get("code")
            .and_then(Value::as_u64)
            .map(|code| code as u16)
            .unwrap_or(status),
        error_num: obj.get("errorNum").and_then(Value::as_i64).unwrap_or(0),
        message: obj
            .get("errorMessage")
            .and_then(Value::as_str)
            .unwrap_or("unknown server error")
            .to_string(),
    })
}
