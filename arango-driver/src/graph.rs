// SPDX-License-Identifier: PMPL-1.0-or-later
//! Named graph operations over the `/_api/gharial` surface.
//!
//! The gharial API wraps its payloads in envelopes (`{graph}`, `{vertex}`,
//! `{edge}`); the handles here unwrap them so callers get the payload
//! directly.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::connection::{Body, RequestOptions};
use crate::database::Database;
use crate::error::{DriverError, Result};
use crate::transport::Method;

/// Relation declaration inside a graph: edges stored in `collection` connect
/// vertices in the `from` collections to vertices in the `to` collections.
#[derive(Debug, Clone, Serialize)]
pub struct EdgeDefinition {
    pub collection: String,
    pub from: Vec<String>,
    pub to: Vec<String>,
}

impl EdgeDefinition {
    pub fn new(collection: &str, from: &[&str], to: &[&str]) -> Self {
        EdgeDefinition {
            collection: collection.to_string(),
            from: from.iter().map(|s| s.to_string()).collect(),
            to: to.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct GraphBody {
    graph: Value,
}

#[derive(Debug, Deserialize)]
struct VertexBody {
    vertex: Value,
}

#[derive(Debug, Deserialize)]
struct EdgeBody {
    edge: Value,
}

#[derive(Debug, Deserialize)]
struct TraversalBody {
    result: Value,
}

fn qualify(collection: &str, selector: &str) -> String {
    if selector.contains('/') {
        selector.to_string()
    } else {
        format!("{collection}/{selector}")
    }
}

/// Handle on a named graph.
#[derive(Debug, Clone)]
pub struct Graph {
    db: Database,
    name: String,
}

impl Graph {
    pub(crate) fn new(db: Database, name: &str) -> Self {
        Graph {
            db,
            name: name.to_string(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn gharial_path(&self, suffix: &str) -> String {
        if suffix.is_empty() {
            format!("/_api/gharial/{}", self.name)
        } else {
            format!("/_api/gharial/{}/{suffix}", self.name)
        }
    }

    /// Fetch the graph definition.
    ///
    /// # Errors
    /// Fails with error number 1924 when the graph does not exist.
    pub async fn get(&self) -> Result<Value> {
        let response = self
            .db
            .request(RequestOptions {
                path: self.gharial_path(""),
                ..RequestOptions::default()
            })
            .await?;
        let body: GraphBody = response.json()?;
        Ok(body.graph)
    }

    /// Create the graph with the given edge definitions.
    ///
    /// # Errors
    /// Fails when a graph of the same name already exists.
    pub async fn create(&self, edge_definitions: &[EdgeDefinition]) -> Result<Value> {
        let response = self
            .db
            .request(RequestOptions {
                method: Method::Post,
                path: "/_api/gharial".to_string(),
                body: Body::Json(json!({
                    "name": self.name,
                    "edgeDefinitions": edge_definitions,
                })),
                ..RequestOptions::default()
            })
            .await?;
        let body: GraphBody = response.json()?;
        Ok(body.graph)
    }

    /// Delete the graph definition. With `drop_collections` the underlying
    /// vertex and edge collections are dropped as well.
    ///
    /// # Errors
    /// Fails when the graph does not exist.
    pub async fn drop(&self, drop_collections: bool) -> Result<()> {
        self.db
            .request(RequestOptions {
                method: Method::Delete,
                path: self.gharial_path(""),
                query: vec![("dropCollections".to_string(), drop_collections.to_string())],
                ..RequestOptions::default()
            })
            .await?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Vertex collections
    // -----------------------------------------------------------------------

    /// Handle on a vertex collection of this graph.
    pub fn vertex_collection(&self, name: &str) -> GraphVertexCollection {
        GraphVertexCollection {
            db: self.db.clone(),
            graph: self.name.clone(),
            name: name.to_string(),
        }
    }

    /// Register a collection as a vertex collection of this graph.
    ///
    /// # Errors
    /// Fails when the graph does not exist.
    pub async fn add_vertex_collection(&self, name: &str) -> Result<Value> {
        let response = self
            .db
            .request(RequestOptions {
                method: Method::Post,
                path: self.gharial_path("vertex"),
                body: Body::Json(json!({ "collection": name })),
                ..RequestOptions::default()
            })
            .await?;
        let body: GraphBody = response.json()?;
        Ok(body.graph)
    }

    /// Remove a vertex collection from the graph, optionally dropping the
    /// collection itself.
    ///
    /// # Errors
    /// Fails when the collection is still used by an edge definition.
    pub async fn remove_vertex_collection(
        &self,
        name: &str,
        drop_collection: bool,
    ) -> Result<Value> {
        let response = self
            .db
            .request(RequestOptions {
                method: Method::Delete,
                path: self.gharial_path(&format!("vertex/{name}")),
                query: vec![("dropCollection".to_string(), drop_collection.to_string())],
                ..RequestOptions::default()
            })
            .await?;
        let body: GraphBody = response.json()?;
        Ok(body.graph)
    }

    // -----------------------------------------------------------------------
    // Edge definitions
    // -----------------------------------------------------------------------

    /// Handle on an edge collection of this graph.
    pub fn edge_collection(&self, name: &str) -> GraphEdgeCollection {
        GraphEdgeCollection {
            db: self.db.clone(),
            graph: self.name.clone(),
            name: name.to_string(),
        }
    }

    /// Add an edge definition to the graph.
    ///
    /// # Errors
    /// Fails when the edge collection is already used in another definition.
    pub async fn add_edge_definition(&self, definition: &EdgeDefinition) -> Result<Value> {
        let response = self
            .db
            .request(RequestOptions {
                method: Method::Post,
                path: self.gharial_path("edge"),
                body: Body::Json(serde_json::to_value(definition)?),
                ..RequestOptions::default()
            })
            .await?;
        let body: GraphBody = response.json()?;
        Ok(body.graph)
    }

    /// Replace the edge definition of the named edge collection.
    ///
    /// # Errors
    /// Fails when no definition exists for that collection.
    pub async fn replace_edge_definition(
        &self,
        name: &str,
        definition: &EdgeDefinition,
    ) -> Result<Value> {
        let response = self
            .db
            .request(RequestOptions {
                method: Method::Put,
                path: self.gharial_path(&format!("edge/{name}")),
                body: Body::Json(serde_json::to_value(definition)?),
                ..RequestOptions::default()
            })
            .await?;
        let body: GraphBody = response.json()?;
        Ok(body.graph)
    }

    /// Remove an edge definition, optionally dropping the edge collection.
    ///
    /// # Errors
    /// Fails when no definition exists for that collection.
    pub async fn remove_edge_definition(
        &self,
        name: &str,
        drop_collection: bool,
    ) -> Result<Value> {
        let response = self
            .db
            .request(RequestOptions {
                method: Method::Delete,
                path: self.gharial_path(&format!("edge/{name}")),
                query: vec![("dropCollection".to_string(), drop_collection.to_string())],
                ..RequestOptions::default()
            })
            .await?;
        let body: GraphBody = response.json()?;
        Ok(body.graph)
    }

    /// Run a legacy graph traversal starting from the given vertex.
    ///
    /// `options` must be a JSON object (or null) of traversal parameters such
    /// as `direction`; `startVertex` and `graphName` are filled in here.
    ///
    /// # Errors
    /// Fails when `options` is any other JSON type or the traversal is
    /// rejected by the server.
    pub async fn traversal(&self, start_vertex: &str, options: Value) -> Result<Value> {
        let mut body = match options {
            Value::Null => serde_json::Map::new(),
            Value::Object(map) => map,
            _ => {
                return Err(DriverError::Validation(
                    "traversal options must be a JSON object".to_string(),
                ))
            }
        };
        body.insert(
            "startVertex".to_string(),
            Value::String(start_vertex.to_string()),
        );
        body.insert("graphName".to_string(), Value::String(self.name.clone()));
        let response = self
            .db
            .request(RequestOptions {
                method: Method::Post,
                path: "/_api/traversal".to_string(),
                body: Body::Json(Value::Object(body)),
                ..RequestOptions::default()
            })
            .await?;
        let body: TraversalBody = response.json()?;
        Ok(body.result)
    }
}

/// Vertex collection scoped to a graph.
#[derive(Debug, Clone)]
pub struct GraphVertexCollection {
    db: Database,
    graph: String,
    name: String,
}

impl GraphVertexCollection {
    pub fn name(&self) -> &str {
        &self.name
    }

    fn vertex_path(&self, suffix: &str) -> String {
        format!("/_api/gharial/{}/vertex/{suffix}", self.graph)
    }

    /// Fetch a vertex by key or full handle.
    ///
    /// # Errors
    /// Fails when the vertex does not exist.
    pub async fn vertex(&self, selector: &str) -> Result<Value> {
        let response = self
            .db
            .request(RequestOptions {
                path: self.vertex_path(&qualify(&self.name, selector)),
                ..RequestOptions::default()
            })
            .await?;
        let body: VertexBody = response.json()?;
        Ok(body.vertex)
    }

    /// Store a new vertex and return its identity.
    ///
    /// # Errors
    /// Fails when the collection is not part of the graph.
    pub async fn save(&self, data: Value) -> Result<Value> {
        let response = self
            .db
            .request(RequestOptions {
                method: Method::Post,
                path: self.vertex_path(&self.name),
                body: Body::Json(data),
                ..RequestOptions::default()
            })
            .await?;
        let body: VertexBody = response.json()?;
        Ok(body.vertex)
    }

    /// Delete a vertex, detaching any edges pointing at it.
    ///
    /// # Errors
    /// Fails when the vertex does not exist.
    pub async fn remove(&self, selector: &str) -> Result<()> {
        self.db
            .request(RequestOptions {
                method: Method::Delete,
                path: self.vertex_path(&qualify(&self.name, selector)),
                ..RequestOptions::default()
            })
            .await?;
        Ok(())
    }
}

/// Edge collection scoped to a graph.
#[derive(Debug, Clone)]
pub struct GraphEdgeCollection {
    db: Database,
    graph: String,
    name: String,
}

impl GraphEdgeCollection {
    pub fn name(&self) -> &str {
        &self.name
    }

    fn edge_path(&self, suffix: &str) -> String {
        format!("/_api/gharial/{}/edge/{suffix}", self.graph)
    }

    /// Fetch an edge by key or full handle.
    ///
    /// # Errors
    /// Fails when the edge does not exist.
    pub async fn edge(&self, selector: &str) -> Result<Value> {
        let response = self
            .db
            .request(RequestOptions {
                path: self.edge_path(&qualify(&self.name, selector)),
                ..RequestOptions::default()
            })
            .await?;
        let body: EdgeBody = response.json()?;
        Ok(body.edge)
    }

    /// Store an edge linking `from` to `to`. Both endpoints must be full
    /// `collection/key` handles.
    ///
    /// # Errors
    /// Fails when `data` is not a JSON object or either endpoint is missing.
    pub async fn save(&self, from: &str, to: &str, data: Value) -> Result<Value> {
        let Value::Object(mut doc) = data else {
            return Err(DriverError::Validation(
                "edge document must be a JSON object".to_string(),
            ));
        };
        doc.insert("_from".to_string(), Value::String(from.to_string()));
        doc.insert("_to".to_string(), Value::String(to.to_string()));
        let response = self
            .db
            .request(RequestOptions {
                method: Method::Post,
                path: self.edge_path(&self.name),
                body: Body::Json(Value::Object(doc)),
                ..RequestOptions::default()
            })
            .await?;
        let body: EdgeBody = response.json()?;
        Ok(body.edge)
    }

    /// Delete an edge.
    ///
    /// # Errors
    /// Fails when the edge does not exist.
    pub async fn remove(&self, selector: &str) -> Result<()> {
        self.db
            .request(RequestOptions {
                method: Method::Delete,
                path: self.edge_path(&qualify(&self.name, selector)),
                ..RequestOptions::default()
            })
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edge_definition_serialization() {
        let definition = EdgeDefinition::new("knows", &["people"], &["people", "orgs"]);
        assert_eq!(
            serde_json::to_value(&definition).unwrap(),
            json!({
                "collection": "knows",
                "from": ["people"],
                "to": ["people", "orgs"],
            })
        );
    }

    #[test]
    fn test_qualify_selector() {
        assert_eq!(qualify("people", "alice"), "people/alice");
        assert_eq!(qualify("people", "staff/bob"), "staff/bob");
    }
}
