// SPDX-License-Identifier: PMPL-1.0-or-later
//! Arbitrary-path request builder.
//!
//! Routes give access to server endpoints the typed API does not cover, for
//! example Foxx services. A route carries a path prefix and a set of default
//! headers; nested routes extend both.

use std::collections::HashMap;

use serde_json::Value;

use crate::connection::{Body, RequestOptions};
use crate::database::Database;
use crate::error::Result;
use crate::response::ArangoResponse;
use crate::transport::Method;

fn normalize(path: &str) -> String {
    if path.is_empty() || path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    }
}

/// Request builder rooted at a fixed path prefix.
#[derive(Debug, Clone)]
pub struct Route {
    db: Database,
    path: String,
    headers: HashMap<String, String>,
}

impl Route {
    pub(crate) fn new(db: Database, path: &str) -> Self {
        Route {
            db,
            path: normalize(path),
            headers: HashMap::new(),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Nested route extending this one's path and inheriting its headers.
    pub fn route(&self, path: &str) -> Route {
        Route {
            db: self.db.clone(),
            path: format!("{}{}", self.path, normalize(path)),
            headers: self.headers.clone(),
        }
    }

    /// Attach a default header sent with every request through this route.
    pub fn with_header(mut self, name: &str, value: &str) -> Route {
        self.headers
            .insert(name.to_ascii_lowercase(), value.to_string());
        self
    }

    /// Dispatch a request under this route's prefix. Route headers apply
    /// first, per-call headers override them.
    ///
    /// # Errors
    /// See [`crate::Connection::request`].
    pub async fn request(&self, mut options: RequestOptions) -> Result<ArangoResponse> {
        let mut headers = self.headers.clone();
        for (name, value) in std::mem::take(&mut options.headers) {
            headers.insert(name.to_ascii_lowercase(), value);
        }
        options.headers = headers;
        options.path = format!("{}{}", self.path, normalize(&options.path));
        self.db.request(options).await
    }

    /// `GET` relative to this route.
    ///
    /// # Errors
    /// See [`Route::request`].
    pub async fn get(&self, path: &str) -> Result<ArangoResponse> {
        self.request(RequestOptions {
            path: path.to_string(),
            ..RequestOptions::default()
        })
        .await
    }

    /// `POST` a JSON body relative to this route.
    ///
    /// # Errors
    /// See [`Route::request`].
    pub async fn post(&self, path: &str, body: Value) -> Result<ArangoResponse> {
        self.request(RequestOptions {
            method: Method::Post,
            path: path.to_string(),
            body: Body::Json(body),
            ..RequestOptions::default()
        })
        .await
    }

    /// `PUT` a JSON body relative to this route.
    ///
    /// # Errors
    /// See [`Route::request`].
    pub async fn put(&self, path: &str, body: Value) -> Result<ArangoResponse> {
        self.request(RequestOptions {
            method: Method::Put,
            path: path.to_string(),
            body: Body::Json(body),
            ..RequestOptions::default()
        })
        .await
    }

    /// `PATCH` a JSON body relative to this route.
    ///
    /// # Errors
    /// See [`Route::request`].
    pub async fn patch(&self, path: &str, body: Value) -> Result<ArangoResponse> {
        self.request(RequestOptions {
            method: Method::Patch,
            path: path.to_string(),
            body: Body::Json(body),
            ..RequestOptions::default()
        })
        .await
    }

    /// `DELETE` relative to this route.
    ///
    /// # Errors
    /// See [`Route::request`].
    pub async fn delete(&self, path: &str) -> Result<ArangoResponse> {
        self.request(RequestOptions {
            method: Method::Delete,
            path: path.to_string(),
            ..RequestOptions::default()
        })
        .await
    }

    /// `HEAD` relative to this route.
    ///
    /// # Errors
    /// See [`Route::request`].
    pub async fn head(&self, path: &str) -> Result<ArangoResponse> {
        self.request(RequestOptions {
            method: Method::Head,
            path: path.to_string(),
            ..RequestOptions::default()
        })
        .await
    }
}
