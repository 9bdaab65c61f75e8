// SPDX-License-Identifier: PMPL-1.0-or-later
//! Database handle: the entry point application code holds on to.
//!
//! A [`Database`] scopes every request under `/_db/{name}` and hands out
//! the typed shims (collections, graphs, cursors, routes). It owns nothing
//! itself; all traffic funnels through the shared [`Connection`].

use base64::prelude::{Engine as _, BASE64_STANDARD};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use crate::collection::{Collection, CollectionKind};
use crate::connection::{Body, Connection, ConnectionOptions, RequestOptions};
use crate::cursor::{Cursor, CursorPage};
use crate::error::Result;
use crate::graph::Graph;
use crate::response::ArangoResponse;
use crate::route::Route;
use crate::transport::Method;

/// Server version descriptor from `GET /_api/version`.
#[derive(Debug, Clone, Deserialize)]
pub struct VersionInfo {
    pub server: String,
    pub version: String,
    #[serde(default)]
    pub license: Option<String>,
}

/// An AQL query with bind variables and cursor tuning.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AqlQuery {
    pub query: String,
    #[serde(skip_serializing_if = "serde_json::Map::is_empty")]
    pub bind_vars: serde_json::Map<String, Value>,
    pub count: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl: Option<u64>,
}

impl AqlQuery {
    pub fn new(query: &str) -> Self {
        Self {
            query: query.to_string(),
            bind_vars: serde_json::Map::new(),
            count: false,
            batch_size: None,
            ttl: None,
        }
    }

    /// Attach a bind variable.
    pub fn bind(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.bind_vars.insert(name.to_string(), value.into());
        self
    }

    /// Ask the server to report the total result count.
    pub fn with_count(mut self) -> Self {
        self.count = true;
        self
    }

    /// Cap the number of rows per cursor batch.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = Some(batch_size);
        self
    }

    /// Server-side cursor time-to-live in seconds.
    pub fn with_ttl(mut self, ttl: u64) -> Self {
        self.ttl = Some(ttl);
        self
    }
}

/// Per-query dispatch options.
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    /// Allow a follower to serve the query and its cursor batches.
    pub allow_dirty_read: bool,
    /// Per-request deadline for the initial cursor creation.
    pub timeout: Option<Duration>,
}

#[derive(Deserialize)]
struct DatabaseListing {
    result: Vec<String>,
}

#[derive(Deserialize)]
struct ClusterEndpoints {
    endpoints: Vec<ClusterEndpoint>,
}

#[derive(Deserialize)]
struct ClusterEndpoint {
    endpoint: String,
}

/// Handle on one named database.
#[derive(Clone)]
pub struct Database {
    connection: Connection,
    name: String,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl Database {
    /// Connect and scope to the `_system` database.
    ///
    /// # Errors
    /// Fails when an endpoint URL is invalid or the transport cannot be
    /// constructed.
    pub fn new(options: ConnectionOptions) -> Result<Self> {
        Ok(Self::with_connection(Connection::new(options)?, "_system"))
    }

    /// Wrap an existing connection, scoping to the given database name.
    pub fn with_connection(connection: Connection, name: &str) -> Self {
        Self {
            connection,
            name: name.to_string(),
        }
    }

    /// Handle on a sibling database over the same connection.
    pub fn database(&self, name: &str) -> Database {
        Database::with_connection(self.connection.clone(), name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    fn base_path(&self) -> String {
        format!("/_db/{}", self.name)
    }

    /// Dispatch a request scoped to this database.
    ///
    /// # Errors
    /// See [`Connection::request`].
    pub async fn request(&self, options: RequestOptions) -> Result<ArangoResponse> {
        self.connection
            .request(RequestOptions {
                base_path: self.base_path(),
                ..options
            })
            .await
    }

    /// Dispatch a request and deserialize the JSON success body.
    ///
    /// # Errors
    /// See [`Connection::request_json`].
    pub async fn request_json<T: serde::de::DeserializeOwned>(
        &self,
        options: RequestOptions,
    ) -> Result<T> {
        self.request(options).await?.json()
    }

    // -----------------------------------------------------------------------
    // Server and cluster
    // -----------------------------------------------------------------------

    /// Fetch the server version.
    ///
    /// # Errors
    /// Fails on transport or server errors.
    pub async fn version(&self) -> Result<VersionInfo> {
        self.request_json(RequestOptions {
            method: Method::Get,
            path: "/_api/version".to_string(),
            ..RequestOptions::default()
        })
        .await
    }

    /// Ask the cluster for its coordinator endpoints and register every
    /// one of them with the connection. Returns their registry indices.
    ///
    /// # Errors
    /// Fails when the endpoint listing cannot be fetched or an advertised
    /// URL does not normalize.
    pub async fn acquire_host_list(&self) -> Result<Vec<usize>> {
        let listing: ClusterEndpoints = self
            .request_json(RequestOptions {
                method: Method::Get,
                path: "/_api/cluster/endpoints".to_string(),
                ..RequestOptions::default()
            })
            .await?;
        let urls: Vec<String> = listing
            .endpoints
            .into_iter()
            .map(|entry| entry.endpoint)
            .collect();
        self.connection.add_hosts(&urls).await
    }

    /// Tag subsequent requests with a stream-transaction id.
    pub async fn set_transaction_id(&self, transaction_id: &str) {
        self.connection.set_transaction_id(transaction_id).await;
    }

    /// Stop tagging requests with a transaction id.
    pub async fn clear_transaction_id(&self) {
        self.connection.clear_transaction_id().await;
    }

    /// Close every host transport of the underlying connection.
    pub async fn close(&self) {
        self.connection.close().await;
    }

    // -----------------------------------------------------------------------
    // Authentication
    // -----------------------------------------------------------------------

    /// Authenticate subsequent requests with basic credentials.
    pub async fn use_basic_auth(&self, username: &str, password: &str) {
        let credentials = BASE64_STANDARD.encode(format!("{username}:{password}"));
        self.connection
            .set_header("authorization", &format!("Basic {credentials}"))
            .await;
    }

    /// Authenticate subsequent requests with a bearer token.
    pub async fn use_bearer_auth(&self, token: &str) {
        self.connection
            .set_header("authorization", &format!("Bearer {token}"))
            .await;
    }

    // -----------------------------------------------------------------------
    // Database administration
    // -----------------------------------------------------------------------

    /// Names of all databases on the server.
    ///
    /// # Errors
    /// Fails on transport or server errors.
    pub async fn list_databases(&self) -> Result<Vec<String>> {
        let listing: DatabaseListing = self
            .request_json(RequestOptions {
                method: Method::Get,
                path: "/_api/database".to_string(),
                ..RequestOptions::default()
            })
            .await?;
        Ok(listing.result)
    }

    /// Create a database and return a handle scoped to it.
    ///
    /// # Errors
    /// Fails when the database already exists or the caller lacks access.
    pub async fn create_database(&self, name: &str) -> Result<Database> {
        self.request(RequestOptions {
            method: Method::Post,
            path: "/_api/database".to_string(),
            body: Body::Json(serde_json::json!({ "name": name })),
            ..RequestOptions::default()
        })
        .await?;
        Ok(self.database(name))
    }

    /// Drop a database by name.
    ///
    /// # Errors
    /// Fails when the database does not exist.
    pub async fn drop_database(&self, name: &str) -> Result<()> {
        self.request(RequestOptions {
            method: Method::Delete,
            path: format!("/_api/database/{name}"),
            ..RequestOptions::default()
        })
        .await?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Run an AQL query and return a cursor over its results.
    ///
    /// # Errors
    /// Fails on query parse/execution errors reported by the server.
    pub async fn query(&self, query: AqlQuery) -> Result<Cursor> {
        self.query_with_options(query, QueryOptions::default())
            .await
    }

    /// Run an AQL query with dispatch options (dirty reads, timeout).
    ///
    /// # Errors
    /// Same conditions as [`Database::query`].
    pub async fn query_with_options(
        &self,
        query: AqlQuery,
        options: QueryOptions,
    ) -> Result<Cursor> {
        let body = serde_json::to_value(&query)?;
        let response = self
            .request(RequestOptions {
                method: Method::Post,
                path: "/_api/cursor".to_string(),
                body: Body::Json(body),
                allow_dirty_read: options.allow_dirty_read,
                timeout: options.timeout,
                ..RequestOptions::default()
            })
            .await?;
        let host = response.host;
        let page: CursorPage = response.json()?;
        Ok(Cursor::new(
            self.clone(),
            page,
            host,
            options.allow_dirty_read,
        ))
    }

    // -----------------------------------------------------------------------
    // Shims
    // -----------------------------------------------------------------------

    /// Handle on a document collection.
    pub fn collection(&self, name: &str) -> Collection {
        Collection::new(self.clone(), name, CollectionKind::Document)
    }

    /// Handle on an edge collection.
    pub fn edge_collection(&self, name: &str) -> Collection {
        Collection::new(self.clone(), name, CollectionKind::Edge)
    }

    /// Handle on a named graph.
    pub fn graph(&self, name: &str) -> Graph {
        Graph::new(self.clone(), name)
    }

    /// Low-level route builder rooted at the given path.
    pub fn route(&self, path: &str) -> Route {
        Route::new(self.clone(), path)
    }
}
