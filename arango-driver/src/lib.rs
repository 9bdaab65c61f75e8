// SPDX-License-Identifier: PMPL-1.0-or-later
//! Async ArangoDB driver with load-balanced, failover-aware dispatch.
//!
//! The driver keeps a registry of coordinator endpoints and pumps every
//! request through a bounded dispatch queue. Requests pick a host by the
//! configured load-balancing strategy, fail over to the next host on
//! connection errors, follow leader redirects, and honor per-request host
//! pinning for stateful resources such as query cursors.
//!
//! # Modules
//!
//! - [`connection`] -- host selection, the task queue and the dispatch pump.
//! - [`database`] -- named-database API: queries, management, auth headers.
//! - [`collection`] -- document and edge collection handles.
//! - [`cursor`] -- batched AQL result consumption.
//! - [`graph`] -- named graph operations over `/_api/gharial`.
//! - [`route`] -- arbitrary-path request builder.
//! - [`transport`] -- the HTTP transport trait and its reqwest implementation.
//! - [`response`] -- classification of raw responses into success and error
//!   shapes.
//! - [`error`] -- the driver error type.
//!
//! # Example
//!
//! ```no_run
//! use arango_driver::{AqlQuery, ConnectionOptions, Database, LoadBalancingStrategy};
//!
//! # async fn run() -> arango_driver::Result<()> {
//! let db = Database::new(ConnectionOptions {
//!     urls: vec![
//!         "tcp://db1.example:8529".to_string(),
//!         "tcp://db2.example:8529".to_string(),
//!     ],
//!     load_balancing: LoadBalancingStrategy::RoundRobin,
//!     ..ConnectionOptions::default()
//! })?;
//!
//! let mut cursor = db
//!     .query(AqlQuery::new("FOR u IN users RETURN u.name"))
//!     .await?;
//! while let Some(name) = cursor.next().await? {
//!     println!("{name}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod collection;
pub mod connection;
pub mod cursor;
pub mod database;
pub mod error;
pub mod graph;
mod host;
pub mod response;
pub mod route;
pub mod transport;

// Re-export the most commonly used types at the crate root for convenience.
pub use collection::{Collection, CollectionInfo, CollectionKind, DocumentMeta};
pub use connection::{
    Body, Connection, ConnectionOptions, LoadBalancingStrategy, MaxRetries, RequestOptions,
};
pub use cursor::Cursor;
pub use database::{AqlQuery, Database, QueryOptions, VersionInfo};
pub use error::{DriverError, Result};
pub use graph::{EdgeDefinition, Graph, GraphEdgeCollection, GraphVertexCollection};
pub use response::{ArangoResponse, ResponseBody};
pub use route::Route;
pub use transport::{
    AgentOptions, Method, RequestUrl, Transport, TransportError, TransportProvider,
    TransportRequest, TransportResponse,
};
