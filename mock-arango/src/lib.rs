// SPDX-License-Identifier: PMPL-1.0-or-later
//! In-memory ArangoDB coordinator stand-in.
//!
//! Speaks just enough of the HTTP API for driver tests: version info, AQL
//! cursors with real batching, document CRUD, collection management and
//! cluster endpoint listings. A follower mode answers every request with
//! 503 plus an `x-arango-endpoint` header pointing at the leader, the way
//! a resigned coordinator does during failover.
//!
//! Queries are not parsed as AQL. Three shapes are recognized, which is
//! enough to drive cursor and dispatch tests:
//!
//! - `RETURN <json>` yields that single value.
//! - `FOR v IN <a>..<b> RETURN v` yields the inclusive integer range.
//! - `FOR v IN <collection> RETURN v` yields the collection's documents.

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use axum::{
    extract::{Path, Request, State},
    http::{HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

const ERR_QUERY_PARSE: i64 = 1501;
const ERR_DOCUMENT_NOT_FOUND: i64 = 1202;
const ERR_COLLECTION_NOT_FOUND: i64 = 1203;
const ERR_DUPLICATE_NAME: i64 = 1207;
const ERR_UNIQUE_CONSTRAINT: i64 = 1210;
const ERR_INVALID_DOCUMENT: i64 = 1227;
const ERR_CURSOR_NOT_FOUND: i64 = 1600;

// ---------------------------------------------------------------------------
// Error shape
// ---------------------------------------------------------------------------

/// Structured error payload in the server's native shape.
#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    error_num: i64,
    message: String,
}

impl ApiError {
    fn not_found(error_num: i64, message: impl Into<String>) -> Self {
        ApiError {
            status: StatusCode::NOT_FOUND,
            error_num,
            message: message.into(),
        }
    }

    fn conflict(error_num: i64, message: impl Into<String>) -> Self {
        ApiError {
            status: StatusCode::CONFLICT,
            error_num,
            message: message.into(),
        }
    }

    fn bad_request(error_num: i64, message: impl Into<String>) -> Self {
        ApiError {
            status: StatusCode::BAD_REQUEST,
            error_num,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": true,
            "code": self.status.as_u16(),
            "errorNum": self.error_num,
            "errorMessage": self.message,
        }));
        (self.status, body).into_response()
    }
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

struct StoredCollection {
    kind: u8,
    documents: HashMap<String, Value>,
}

struct StoredCursor {
    batches: VecDeque<Vec<Value>>,
}

#[derive(Default)]
struct MockState {
    collections: HashMap<String, StoredCollection>,
    cursors: HashMap<String, StoredCursor>,
    /// URLs advertised by `/_api/cluster/endpoints`.
    endpoints: Vec<String>,
    /// When set, every request is rejected with 503 and this endpoint.
    leader: Option<String>,
    requests: usize,
    next_key: u64,
}

type SharedState = Arc<Mutex<MockState>>;

fn lock(state: &SharedState) -> MutexGuard<'_, MockState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// Query evaluation
// ---------------------------------------------------------------------------

fn parse_for_query(query: &str) -> Option<(&str, &str)> {
    let rest = query.strip_prefix("FOR ")?;
    let (var, rest) = rest.split_once(" IN ")?;
    let (source, returned) = rest.split_once(" RETURN ")?;
    (returned.trim() == var.trim()).then_some((var.trim(), source.trim()))
}

fn run_query(state: &MockState, query: &str) -> Result<Vec<Value>, ApiError> {
    let query = query.trim();
    if let Some(rest) = query.strip_prefix("RETURN ") {
        let value: Value = serde_json::from_str(rest.trim())
            .map_err(|_| ApiError::bad_request(ERR_QUERY_PARSE, "cannot evaluate expression"))?;
        return Ok(vec![value]);
    }
    let Some((_, source)) = parse_for_query(query) else {
        return Err(ApiError::bad_request(ERR_QUERY_PARSE, "cannot parse query"));
    };
    if let Some((low, high)) = source.split_once("..") {
        let low: i64 = low
            .trim()
            .parse()
            .map_err(|_| ApiError::bad_request(ERR_QUERY_PARSE, "bad range bound"))?;
        let high: i64 = high
            .trim()
            .parse()
            .map_err(|_| ApiError::bad_request(ERR_QUERY_PARSE, "bad range bound"))?;
        return Ok((low..=high).map(|n| json!(n)).collect());
    }
    let collection = state.collections.get(source).ok_or_else(|| {
        ApiError::not_found(
            ERR_COLLECTION_NOT_FOUND,
            format!("collection or view not found: {source}"),
        )
    })?;
    let mut documents: Vec<Value> = collection.documents.values().cloned().collect();
    documents.sort_by_key(|doc| {
        doc.get("_key")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    });
    Ok(documents)
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn version_handler() -> Json<Value> {
    Json(json!({
        "server": "arango",
        "version": "3.11.0",
        "license": "community",
    }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CursorRequest {
    query: String,
    #[serde(default)]
    count: bool,
    #[serde(default)]
    batch_size: Option<usize>,
}

async fn create_cursor_handler(
    State(state): State<SharedState>,
    Json(request): Json<CursorRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let mut state = lock(&state);
    let results = run_query(&state, &request.query)?;
    let total = results.len();
    let batch_size = request.batch_size.unwrap_or(1000).max(1);
    let mut batches: VecDeque<Vec<Value>> =
        results.chunks(batch_size).map(<[Value]>::to_vec).collect();
    let first = batches.pop_front().unwrap_or_default();
    let has_more = !batches.is_empty();

    let mut body = json!({
        "error": false,
        "code": 201,
        "result": first,
        "hasMore": has_more,
    });
    if request.count {
        body["count"] = json!(total);
    }
    if has_more {
        let id = Uuid::new_v4().simple().to_string();
        state.cursors.insert(id.clone(), StoredCursor { batches });
        body["id"] = json!(id);
    }
    Ok((StatusCode::CREATED, Json(body)))
}

async fn continue_cursor_handler(
    State(state): State<SharedState>,
    Path((_db, id)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    let mut state = lock(&state);
    let cursor = state
        .cursors
        .get_mut(&id)
        .ok_or_else(|| ApiError::not_found(ERR_CURSOR_NOT_FOUND, format!("cursor not found: {id}")))?;
    let batch = cursor.batches.pop_front().unwrap_or_default();
    let has_more = !cursor.batches.is_empty();
    if !has_more {
        state.cursors.remove(&id);
    }
    Ok(Json(json!({
        "error": false,
        "code": 200,
        "id": id,
        "result": batch,
        "hasMore": has_more,
    })))
}

async fn delete_cursor_handler(
    State(state): State<SharedState>,
    Path((_db, id)): Path<(String, String)>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let mut state = lock(&state);
    state
        .cursors
        .remove(&id)
        .ok_or_else(|| ApiError::not_found(ERR_CURSOR_NOT_FOUND, format!("cursor not found: {id}")))?;
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "error": false, "code": 202, "id": id })),
    ))
}

#[derive(Deserialize)]
struct CreateCollectionRequest {
    name: String,
    #[serde(default, rename = "type")]
    kind: Option<u8>,
}

async fn create_collection_handler(
    State(state): State<SharedState>,
    Json(request): Json<CreateCollectionRequest>,
) -> Result<Json<Value>, ApiError> {
    let mut state = lock(&state);
    if state.collections.contains_key(&request.name) {
        return Err(ApiError::conflict(
            ERR_DUPLICATE_NAME,
            format!("duplicate name: {}", request.name),
        ));
    }
    let kind = request.kind.unwrap_or(2);
    state.collections.insert(
        request.name.clone(),
        StoredCollection {
            kind,
            documents: HashMap::new(),
        },
    );
    Ok(Json(json!({
        "error": false,
        "code": 200,
        "name": request.name,
        "type": kind,
        "status": 3,
        "isSystem": false,
    })))
}

async fn get_collection_handler(
    State(state): State<SharedState>,
    Path((_db, name)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    let state = lock(&state);
    let collection = state.collections.get(&name).ok_or_else(|| {
        ApiError::not_found(
            ERR_COLLECTION_NOT_FOUND,
            format!("collection or view not found: {name}"),
        )
    })?;
    Ok(Json(json!({
        "error": false,
        "code": 200,
        "name": name,
        "type": collection.kind,
        "status": 3,
        "isSystem": false,
    })))
}

async fn drop_collection_handler(
    State(state): State<SharedState>,
    Path((_db, name)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    let mut state = lock(&state);
    state.collections.remove(&name).ok_or_else(|| {
        ApiError::not_found(
            ERR_COLLECTION_NOT_FOUND,
            format!("collection or view not found: {name}"),
        )
    })?;
    Ok(Json(json!({ "error": false, "code": 200 })))
}

async fn truncate_collection_handler(
    State(state): State<SharedState>,
    Path((_db, name)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    let mut state = lock(&state);
    let collection = state.collections.get_mut(&name).ok_or_else(|| {
        ApiError::not_found(
            ERR_COLLECTION_NOT_FOUND,
            format!("collection or view not found: {name}"),
        )
    })?;
    collection.documents.clear();
    Ok(Json(json!({ "error": false, "code": 200, "name": name })))
}

async fn count_collection_handler(
    State(state): State<SharedState>,
    Path((_db, name)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    let state = lock(&state);
    let collection = state.collections.get(&name).ok_or_else(|| {
        ApiError::not_found(
            ERR_COLLECTION_NOT_FOUND,
            format!("collection or view not found: {name}"),
        )
    })?;
    Ok(Json(json!({
        "error": false,
        "code": 200,
        "name": name,
        "count": collection.documents.len(),
    })))
}

fn fresh_rev() -> String {
    format!("_{}", Uuid::new_v4().simple())
}

async fn create_document_handler(
    State(state): State<SharedState>,
    Path((_db, collection)): Path<(String, String)>,
    Json(document): Json<Value>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let mut state = lock(&state);
    if !state.collections.contains_key(&collection) {
        return Err(ApiError::not_found(
            ERR_COLLECTION_NOT_FOUND,
            format!("collection or view not found: {collection}"),
        ));
    }
    let Value::Object(mut document) = document else {
        return Err(ApiError::bad_request(
            ERR_INVALID_DOCUMENT,
            "document must be a JSON object",
        ));
    };
    let key = match document.get("_key").and_then(Value::as_str) {
        Some(key) => key.to_string(),
        None => {
            state.next_key += 1;
            state.next_key.to_string()
        }
    };
    let id = format!("{collection}/{key}");
    let rev = fresh_rev();
    document.insert("_key".to_string(), json!(key));
    document.insert("_id".to_string(), json!(id));
    document.insert("_rev".to_string(), json!(rev));

    let stored = state
        .collections
        .get_mut(&collection)
        .ok_or_else(|| ApiError::not_found(ERR_COLLECTION_NOT_FOUND, "collection vanished"))?;
    if stored.documents.contains_key(&key) {
        return Err(ApiError::conflict(
            ERR_UNIQUE_CONSTRAINT,
            format!("unique constraint violated: {id}"),
        ));
    }
    stored.documents.insert(key.clone(), Value::Object(document));
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "_id": id, "_key": key, "_rev": rev })),
    ))
}

fn document_of<'a>(
    state: &'a mut MockState,
    collection: &str,
    key: &str,
) -> Result<&'a mut serde_json::Map<String, Value>, ApiError> {
    let stored = state.collections.get_mut(collection).ok_or_else(|| {
        ApiError::not_found(
            ERR_COLLECTION_NOT_FOUND,
            format!("collection or view not found: {collection}"),
        )
    })?;
    match stored.documents.get_mut(key) {
        Some(Value::Object(document)) => Ok(document),
        _ => Err(ApiError::not_found(
            ERR_DOCUMENT_NOT_FOUND,
            format!("document not found: {collection}/{key}"),
        )),
    }
}

async fn get_document_handler(
    State(state): State<SharedState>,
    Path((_db, collection, key)): Path<(String, String, String)>,
) -> Result<Json<Value>, ApiError> {
    let mut state = lock(&state);
    let document = document_of(&mut state, &collection, &key)?;
    Ok(Json(Value::Object(document.clone())))
}

async fn update_document_handler(
    State(state): State<SharedState>,
    Path((_db, collection, key)): Path<(String, String, String)>,
    Json(patch): Json<Value>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let mut state = lock(&state);
    let Value::Object(patch) = patch else {
        return Err(ApiError::bad_request(
            ERR_INVALID_DOCUMENT,
            "patch must be a JSON object",
        ));
    };
    let document = document_of(&mut state, &collection, &key)?;
    for (name, value) in patch {
        document.insert(name, value);
    }
    let id = format!("{collection}/{key}");
    let rev = fresh_rev();
    document.insert("_key".to_string(), json!(key));
    document.insert("_id".to_string(), json!(id));
    document.insert("_rev".to_string(), json!(rev));
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "_id": id, "_key": key, "_rev": rev })),
    ))
}

async fn replace_document_handler(
    State(state): State<SharedState>,
    Path((_db, collection, key)): Path<(String, String, String)>,
    Json(replacement): Json<Value>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let mut state = lock(&state);
    let Value::Object(mut replacement) = replacement else {
        return Err(ApiError::bad_request(
            ERR_INVALID_DOCUMENT,
            "document must be a JSON object",
        ));
    };
    let document = document_of(&mut state, &collection, &key)?;
    let id = format!("{collection}/{key}");
    let rev = fresh_rev();
    replacement.insert("_key".to_string(), json!(key));
    replacement.insert("_id".to_string(), json!(id));
    replacement.insert("_rev".to_string(), json!(rev));
    *document = replacement;
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "_id": id, "_key": key, "_rev": rev })),
    ))
}

async fn remove_document_handler(
    State(state): State<SharedState>,
    Path((_db, collection, key)): Path<(String, String, String)>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let mut state = lock(&state);
    let stored = state.collections.get_mut(&collection).ok_or_else(|| {
        ApiError::not_found(
            ERR_COLLECTION_NOT_FOUND,
            format!("collection or view not found: {collection}"),
        )
    })?;
    let removed = stored.documents.remove(&key).ok_or_else(|| {
        ApiError::not_found(
            ERR_DOCUMENT_NOT_FOUND,
            format!("document not found: {collection}/{key}"),
        )
    })?;
    let rev = removed
        .get("_rev")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "_id": format!("{collection}/{key}"),
            "_key": key,
            "_rev": rev,
        })),
    ))
}

async fn cluster_endpoints_handler(State(state): State<SharedState>) -> Json<Value> {
    let state = lock(&state);
    let endpoints: Vec<Value> = state
        .endpoints
        .iter()
        .map(|url| json!({ "endpoint": url }))
        .collect();
    Json(json!({ "error": false, "code": 200, "endpoints": endpoints }))
}

async fn unknown_path_handler() -> ApiError {
    ApiError::not_found(404, "unknown path")
}

// ---------------------------------------------------------------------------
// Follower mode
// ---------------------------------------------------------------------------

/// Counts every request and, while a leader is configured, rejects it the
/// way a resigned coordinator does.
async fn follower_check(
    State(state): State<SharedState>,
    request: Request,
    next: Next,
) -> Response {
    let leader = {
        let mut state = lock(&state);
        state.requests += 1;
        state.leader.clone()
    };
    if let Some(endpoint) = leader {
        debug!(%endpoint, "redirecting to leader");
        let mut response = (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "error": true,
                "code": 503,
                "errorNum": 1496,
                "errorMessage": "not a leader",
            })),
        )
            .into_response();
        if let Ok(value) = HeaderValue::from_str(&endpoint) {
            response.headers_mut().insert("x-arango-endpoint", value);
        }
        return response;
    }
    next.run(request).await
}

// ---------------------------------------------------------------------------
// Router and server
// ---------------------------------------------------------------------------

fn api_router() -> Router<SharedState> {
    Router::new()
        .route("/version", get(version_handler))
        .route("/cursor", post(create_cursor_handler))
        .route(
            "/cursor/{id}",
            put(continue_cursor_handler).delete(delete_cursor_handler),
        )
        .route("/collection", post(create_collection_handler))
        .route(
            "/collection/{name}",
            get(get_collection_handler).delete(drop_collection_handler),
        )
        .route(
            "/collection/{name}/truncate",
            put(truncate_collection_handler),
        )
        .route("/collection/{name}/count", get(count_collection_handler))
        .route("/document/{collection}", post(create_document_handler))
        .route(
            "/document/{collection}/{key}",
            get(get_document_handler)
                .patch(update_document_handler)
                .put(replace_document_handler)
                .delete(remove_document_handler),
        )
        .route("/cluster/endpoints", get(cluster_endpoints_handler))
}

fn build_router(state: SharedState) -> Router {
    Router::new()
        .nest("/_db/{db}/_api", api_router())
        .fallback(unknown_path_handler)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            follower_check,
        ))
        .with_state(state)
}

/// Running mock coordinator bound to an ephemeral port.
pub struct MockServer {
    addr: SocketAddr,
    state: SharedState,
    server: JoinHandle<()>,
}

impl MockServer {
    /// Bind `127.0.0.1:0` and start serving in a background task.
    ///
    /// # Errors
    /// Fails when the listener cannot be bound.
    pub async fn start() -> std::io::Result<MockServer> {
        let state = Arc::new(Mutex::new(MockState::default()));
        let app = build_router(state.clone());
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        info!("mock coordinator listening on {addr}");
        let server = tokio::spawn(async move {
            if let Err(error) = axum::serve(listener, app).await {
                debug!("mock coordinator stopped: {error}");
            }
        });
        Ok(MockServer {
            addr,
            state,
            server,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Base URL of this server.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Enter follower mode: every request is answered with 503 and an
    /// `x-arango-endpoint` header naming `endpoint`.
    pub fn set_leader(&self, endpoint: &str) {
        lock(&self.state).leader = Some(endpoint.to_string());
    }

    /// Leave follower mode.
    pub fn clear_leader(&self) {
        lock(&self.state).leader = None;
    }

    /// URLs advertised by `/_api/cluster/endpoints`.
    pub fn set_endpoints(&self, endpoints: &[&str]) {
        lock(&self.state).endpoints = endpoints.iter().map(|url| url.to_string()).collect();
    }

    /// Requests handled so far, follower rejections included.
    pub fn request_count(&self) -> usize {
        lock(&self.state).requests
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.server.abort();
    }
}

/// Serve on a fixed port until the process is stopped.
///
/// # Errors
/// Fails when the listener cannot be bound.
pub async fn serve(port: u16) -> Result<(), std::io::Error> {
    let state = Arc::new(Mutex::new(MockState::default()));
    let app = build_router(state);
    let listener = TcpListener::bind(("127.0.0.1", port)).await?;
    info!("mock coordinator listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_for_query() {
        assert_eq!(
            parse_for_query("FOR d IN users RETURN d"),
            Some(("d", "users"))
        );
        assert_eq!(parse_for_query("FOR i IN 1..4 RETURN i"), Some(("i", "1..4")));
        assert_eq!(parse_for_query("FOR d IN users RETURN d.name"), None);
        assert_eq!(parse_for_query("INSERT {} INTO users"), None);
    }

    #[test]
    fn test_run_query_range_is_inclusive() {
        let state = MockState::default();
        let results = run_query(&state, "FOR i IN 1..3 RETURN i").unwrap();
        assert_eq!(results, vec![json!(1), json!(2), json!(3)]);
    }

    #[test]
    fn test_run_query_return_literal() {
        let state = MockState::default();
        let results = run_query(&state, r#"RETURN {"ok": true}"#).unwrap();
        assert_eq!(results, vec![json!({"ok": true})]);
    }

    #[test]
    fn test_run_query_missing_collection() {
        let state = MockState::default();
        let error = run_query(&state, "FOR d IN nope RETURN d").unwrap_err();
        assert_eq!(error.error_num, ERR_COLLECTION_NOT_FOUND);
    }
}
