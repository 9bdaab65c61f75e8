// SPDX-License-Identifier: PMPL-1.0-or-later
//! Typed handles on document and edge collections.
//!
//! A [`Collection`] scopes document CRUD under `/_api/document` and
//! collection management under `/_api/collection`, both relative to the
//! database that produced the handle.

use serde::Deserialize;
use serde_json::{json, Value};

use crate::connection::{Body, RequestOptions};
use crate::database::Database;
use crate::error::{DriverError, Result};
use crate::transport::Method;

/// Collection type codes as used on the wire by `/_api/collection`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionKind {
    /// Plain document collection (wire code 2).
    Document,
    /// Edge collection whose documents carry `_from`/`_to` (wire code 3).
    Edge,
}

impl CollectionKind {
    /// Numeric code used in create requests and collection info responses.
    pub fn code(self) -> u8 {
        match self {
            CollectionKind::Document => 2,
            CollectionKind::Edge => 3,
        }
    }
}

/// Properties reported by `GET /_api/collection/{name}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionInfo {
    pub name: String,
    /// Wire type code, 2 for document and 3 for edge collections.
    #[serde(rename = "type")]
    pub kind: u32,
    #[serde(default)]
    pub status: u32,
    #[serde(default)]
    pub is_system: bool,
}

/// Document identity triple returned by every write operation.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DocumentMeta {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_key")]
    pub key: String,
    #[serde(rename = "_rev")]
    pub rev: String,
}

#[derive(Debug, Deserialize)]
struct CountBody {
    count: u64,
}

/// Handle on one collection of a database.
#[derive(Debug, Clone)]
pub struct Collection {
    db: Database,
    name: String,
    kind: CollectionKind,
}

impl Collection {
    pub(crate) fn new(db: Database, name: &str, kind: CollectionKind) -> Self {
        Collection {
            db,
            name: name.to_string(),
            kind,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> CollectionKind {
        self.kind
    }

    /// Resolve a document selector to a full `collection/key` handle.
    ///
    /// Selectors that already contain a `/` pass through unchanged, bare keys
    /// are qualified with this collection's name.
    fn document_handle(&self, selector: &str) -> String {
        if selector.contains('/') {
            selector.to_string()
        } else {
            format!("{}/{}", self.name, selector)
        }
    }

    // -----------------------------------------------------------------------
    // Collection management
    // -----------------------------------------------------------------------

    /// Fetch the collection's properties.
    ///
    /// # Errors
    /// Fails with the server's error payload when the collection is missing.
    pub async fn get(&self) -> Result<CollectionInfo> {
        let response = self
            .db
            .request(RequestOptions {
                path: format!("/_api/collection/{}", self.name),
                ..RequestOptions::default()
            })
            .await?;
        response.json()
    }

    /// Create the collection with this handle's name and kind.
    ///
    /// # Errors
    /// Fails when a collection of the same name already exists.
    pub async fn create(&self) -> Result<CollectionInfo> {
        let body = json!({ "name": self.name, "type": self.kind.code() });
        let response = self
            .db
            .request(RequestOptions {
                method: Method::Post,
                path: "/_api/collection".to_string(),
                body: Body::Json(body),
                ..RequestOptions::default()
            })
            .await?;
        response.json()
    }

    /// Drop the collection and everything in it.
    ///
    /// # Errors
    /// Fails when the collection does not exist.
    pub async fn drop(&self) -> Result<()> {
        self.db
            .request(RequestOptions {
                method: Method::Delete,
                path: format!("/_api/collection/{}", self.name),
                ..RequestOptions::default()
            })
            .await?;
        Ok(())
    }

    /// Remove all documents while keeping the collection itself.
    ///
    /// # Errors
    /// Fails when the collection does not exist.
    pub async fn truncate(&self) -> Result<()> {
        self.db
            .request(RequestOptions {
                method: Method::Put,
                path: format!("/_api/collection/{}/truncate", self.name),
                ..RequestOptions::default()
            })
            .await?;
        Ok(())
    }

    /// Number of documents in the collection.
    ///
    /// # Errors
    /// Fails when the collection does not exist.
    pub async fn count(&self) -> Result<u64> {
        let response = self
            .db
            .request(RequestOptions {
                path: format!("/_api/collection/{}/count", self.name),
                ..RequestOptions::default()
            })
            .await?;
        let body: CountBody = response.json()?;
        Ok(body.count)
    }

    // -----------------------------------------------------------------------
    // Document CRUD
    // -----------------------------------------------------------------------

    /// Fetch a document by key or full handle.
    ///
    /// # Errors
    /// Fails with error number 1202 when the document does not exist.
    pub async fn document(&self, selector: &str) -> Result<Value> {
        let response = self
            .db
            .request(RequestOptions {
                path: format!("/_api/document/{}", self.document_handle(selector)),
                ..RequestOptions::default()
            })
            .await?;
        response.json()
    }

    /// Store a new document and return its identity.
    ///
    /// # Errors
    /// Fails on key conflicts and schema violations reported by the server.
    pub async fn save(&self, data: Value) -> Result<DocumentMeta> {
        let response = self
            .db
            .request(RequestOptions {
                method: Method::Post,
                path: format!("/_api/document/{}", self.name),
                body: Body::Json(data),
                ..RequestOptions::default()
            })
            .await?;
        response.json()
    }

    /// Partially update a document, merging `data` into the stored copy.
    ///
    /// # Errors
    /// Fails when the document does not exist.
    pub async fn update(&self, selector: &str, data: Value) -> Result<DocumentMeta> {
        let response = self
            .db
            .request(RequestOptions {
                method: Method::Patch,
                path: format!("/_api/document/{}", self.document_handle(selector)),
                body: Body::Json(data),
                ..RequestOptions::default()
            })
            .await?;
        response.json()
    }

    /// Replace a document's contents entirely.
    ///
    /// # Errors
    /// Fails when the document does not exist.
    pub async fn replace(&self, selector: &str, data: Value) -> Result<DocumentMeta> {
        let response = self
            .db
            .request(RequestOptions {
                method: Method::Put,
                path: format!("/_api/document/{}", self.document_handle(selector)),
                body: Body::Json(data),
                ..RequestOptions::default()
            })
            .await?;
        response.json()
    }

    /// Delete a document and return the identity it had.
    ///
    /// # Errors
    /// Fails when the document does not exist.
    pub async fn remove(&self, selector: &str) -> Result<DocumentMeta> {
        let response = self
            .db
            .request(RequestOptions {
                method: Method::Delete,
                path: format!("/_api/document/{}", self.document_handle(selector)),
                ..RequestOptions::default()
            })
            .await?;
        response.json()
    }

    /// Store an edge document linking `from` to `to`.
    ///
    /// Both endpoints must be full `collection/key` handles.
    ///
    /// # Errors
    /// Fails when `data` is not a JSON object or the server rejects the edge.
    pub async fn save_edge(&self, from: &str, to: &str, data: Value) -> Result<DocumentMeta> {
        let Value::Object(mut doc) = data else {
            return Err(DriverError::Validation(
                "edge document must be a JSON object".to_string(),
            ));
        };
        doc.insert("_from".to_string(), Value::String(from.to_string()));
        doc.insert("_to".to_string(), Value::String(to.to_string()));
        self.save(Value::Object(doc)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{Connection, ConnectionOptions};

    fn collection(kind: CollectionKind) -> Collection {
        let connection = Connection::new(ConnectionOptions::default()).unwrap();
        let db = Database::with_connection(connection, "_system");
        Collection::new(db, "users", kind)
    }

    #[test]
    fn test_kind_codes() {
        assert_eq!(CollectionKind::Document.code(), 2);
        assert_eq!(CollectionKind::Edge.code(), 3);
    }

    #[test]
    fn test_document_handle_resolution() {
        let users = collection(CollectionKind::Document);
        assert_eq!(users.document_handle("abc"), "users/abc");
        assert_eq!(users.document_handle("other/abc"), "other/abc");
    }

    #[test]
    fn test_document_meta_field_renames() {
        let meta: DocumentMeta = serde_json::from_str(
            r#"{"_id": "users/abc", "_key": "abc", "_rev": "_c8d7"}"#,
        )
        .unwrap();
        assert_eq!(meta.id, "users/abc");
        assert_eq!(meta.key, "abc");
        assert_eq!(meta.rev, "_c8d7");
    }
}
