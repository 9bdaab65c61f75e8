// SPDX-License-Identifier: PMPL-1.0-or-later
//! Connection core: the bounded-concurrency request dispatcher.
//!
//! A [`Connection`] owns the host registry, a FIFO task queue, and a
//! concurrency budget derived once from the agent options. `request()`
//! enqueues a task and pumps the queue; the pump dispatches tasks to hosts
//! chosen by the load-balancing policy and re-invokes itself after every
//! settled task. Transport failures advance the active host (failover),
//! connect-refused failures on unpinned tasks retry silently within the
//! budget, and HTTP 503 responses naming a leader endpoint re-route the
//! task to the (possibly freshly registered) leader without the caller
//! ever noticing.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, warn};
use url::form_urlencoded;

use crate::error::{DriverError, Result};
use crate::host::HostRegistry;
use crate::response::{classify, ArangoResponse};
use crate::transport::{
    AgentOptions, HttpTransportProvider, Method, RequestUrl, TransportError, TransportProvider,
    TransportRequest, TransportResponse,
};

/// Endpoint used when no URL is configured.
pub const DEFAULT_URL: &str = "http://localhost:8529";

/// Driver-protocol version sent with every request.
pub(crate) const DEFAULT_ARANGO_VERSION: u32 = 30400;

pub(crate) const VERSION_HEADER: &str = "x-arango-version";
pub(crate) const TRANSACTION_HEADER: &str = "x-arango-trx-id";
pub(crate) const ALLOW_DIRTY_READ_HEADER: &str = "x-arango-allow-dirty-read";
pub(crate) const LEADER_ENDPOINT_HEADER: &str = "x-arango-endpoint";

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Strategy for spreading non-pinned requests across known hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadBalancingStrategy {
    /// Stick with the active host until failover moves it.
    #[default]
    None,
    /// Rotate the active host after every dispatched request.
    RoundRobin,
    /// Pick a random starting host once at construction, then stick with
    /// it. Randomness is never re-applied per request.
    OneRandom,
}

/// Retry budget for connect-refused failures on unpinned tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MaxRetries {
    /// Never re-enqueue a failed task.
    Disabled,
    /// Retry up to one less than the number of known hosts. The count is
    /// re-read at failure time, so hosts learned mid-flight (leader
    /// redirects) raise the ceiling for queued tasks.
    #[default]
    Auto,
    /// Retry up to a fixed number of times.
    Limit(usize),
}

impl MaxRetries {
    fn ceiling(self, host_count: usize) -> usize {
        match self {
            MaxRetries::Disabled => 0,
            MaxRetries::Auto => host_count.saturating_sub(1),
            MaxRetries::Limit(limit) => limit,
        }
    }
}

/// Connection construction options.
#[derive(Debug, Clone)]
pub struct ConnectionOptions {
    /// Initial coordinator endpoints. Empty falls back to [`DEFAULT_URL`].
    pub urls: Vec<String>,
    /// Value of the `x-arango-version` protocol header.
    pub arango_version: u32,
    pub load_balancing: LoadBalancingStrategy,
    pub max_retries: MaxRetries,
    /// Default headers merged into every request.
    pub headers: HashMap<String, String>,
    /// Transport tuning; also determines the concurrent-task budget.
    pub agent: AgentOptions,
    /// Seed for the ONE_RANDOM starting host. OS entropy when unset;
    /// inject a fixed value for deterministic tests.
    pub random_seed: Option<u64>,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            urls: Vec::new(),
            arango_version: DEFAULT_ARANGO_VERSION,
            load_balancing: LoadBalancingStrategy::default(),
            max_retries: MaxRetries::default(),
            headers: HashMap::new(),
            agent: AgentOptions::default(),
            random_seed: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Per-request options
// ---------------------------------------------------------------------------

/// Request payload, tagged with its wire encoding.
#[derive(Debug, Clone, Default)]
pub enum Body {
    /// No payload.
    #[default]
    None,
    /// JSON document, sent as `application/json`.
    Json(Value),
    /// Plain text, sent as `text/plain`.
    Text(String),
    /// Raw bytes, sent as `application/octet-stream`.
    Binary(Vec<u8>),
}

/// One logical request as accepted by [`Connection::request`].
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Pin the request to a registry index, bypassing load balancing.
    pub host: Option<usize>,
    pub method: Method,
    /// Path prefix, typically the `/_db/{name}` scope.
    pub base_path: String,
    /// Path below the prefix, starting with `/`.
    pub path: String,
    /// Query parameters, form-encoded in order.
    pub query: Vec<(String, String)>,
    /// Per-call headers; win over connection defaults.
    pub headers: HashMap<String, String>,
    pub body: Body,
    /// Allow a follower to serve the request; rotates the dirty-read host
    /// cursor independently of the load-balancing strategy.
    pub allow_dirty_read: bool,
    /// Per-request deadline, enforced by the transport.
    pub timeout: Option<Duration>,
    /// Treat the response body as opaque bytes.
    pub expect_binary: bool,
}

// ---------------------------------------------------------------------------
// Dispatcher state
// ---------------------------------------------------------------------------

/// A queued or in-flight request. The oneshot sender is consumed on
/// settle, so a task can never resolve twice.
struct Task {
    host: Option<usize>,
    allow_dirty_read: bool,
    retries: usize,
    request: TransportRequest,
    settle: oneshot::Sender<Result<ArangoResponse>>,
}

/// Mutable dispatcher state. Guarded by one async mutex; critical sections
/// never span a transport await.
struct DispatchState {
    registry: HostRegistry,
    queue: VecDeque<Task>,
    active_tasks: usize,
    active_host: usize,
    active_dirty_host: usize,
    transaction_id: Option<String>,
    headers: HashMap<String, String>,
}

struct ConnectionInner {
    arango_version: u32,
    load_balancing: LoadBalancingStrategy,
    use_failover: bool,
    max_retries: MaxRetries,
    max_tasks: usize,
    provider: Box<dyn TransportProvider>,
    state: Mutex<DispatchState>,
}

/// Dispatcher for one logical cluster connection. Cheap to clone; clones
/// share the registry, queue, and budget.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

impl Connection {
    /// Open a connection using the reqwest-backed HTTP transport.
    ///
    /// # Errors
    /// Fails when an endpoint URL does not parse or a transport cannot be
    /// constructed.
    pub fn new(options: ConnectionOptions) -> Result<Self> {
        let provider = Box::new(HttpTransportProvider::new(options.agent.clone()));
        Self::with_provider(options, provider)
    }

    /// Open a connection with a custom transport provider. Tests use this
    /// to inject scripted transports.
    ///
    /// # Errors
    /// Same conditions as [`Connection::new`].
    pub fn with_provider(
        options: ConnectionOptions,
        provider: Box<dyn TransportProvider>,
    ) -> Result<Self> {
        let ConnectionOptions {
            urls,
            arango_version,
            load_balancing,
            max_retries,
            headers,
            agent,
            random_seed,
        } = options;

        let urls = if urls.is_empty() {
            vec![DEFAULT_URL.to_string()]
        } else {
            urls
        };
        let mut registry = HostRegistry::new();
        registry.add(&urls, provider.as_ref())?;

        let host_count = registry.len();
        let (active_host, active_dirty_host) = if load_balancing == LoadBalancingStrategy::OneRandom
        {
            let mut rng = match random_seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_os_rng(),
            };
            (
                rng.random_range(0..host_count),
                rng.random_range(0..host_count),
            )
        } else {
            (0, 0)
        };

        let state = DispatchState {
            registry,
            queue: VecDeque::new(),
            active_tasks: 0,
            active_host,
            active_dirty_host,
            transaction_id: None,
            headers,
        };

        Ok(Self {
            inner: Arc::new(ConnectionInner {
                arango_version,
                load_balancing,
                use_failover: load_balancing != LoadBalancingStrategy::RoundRobin,
                max_retries,
                max_tasks: agent.task_budget(),
                provider,
                state: Mutex::new(state),
            }),
        })
    }

    /// Register additional coordinator endpoints. Returns the registry
    /// index for every input URL; already-known URLs keep their index.
    ///
    /// # Errors
    /// Fails when a URL does not normalize or a transport cannot be
    /// minted for it.
    pub async fn add_hosts(&self, urls: &[String]) -> Result<Vec<usize>> {
        let mut state = self.inner.state.lock().await;
        state.registry.add(urls, self.inner.provider.as_ref())
    }

    /// Current normalized endpoint URLs in registry order.
    ///
    /// # Example
    ///
    /// ```rust
    /// use arango_driver::{Connection, ConnectionOptions};
    ///
    /// # tokio_test::block_on(async {
    /// let connection = Connection::new(ConnectionOptions {
    ///     urls: vec!["tcp://db.example.com:8529/".to_string()],
    ///     ..ConnectionOptions::default()
    /// })
    /// .unwrap();
    /// assert_eq!(connection.host_urls().await, vec!["http://db.example.com:8529"]);
    /// # });
    /// ```
    pub async fn host_urls(&self) -> Vec<String> {
        self.inner.state.lock().await.registry.urls().to_vec()
    }

    /// Set a default header merged into every subsequent request.
    pub async fn set_header(&self, name: &str, value: &str) {
        let mut state = self.inner.state.lock().await;
        state.headers.insert(name.to_lowercase(), value.to_string());
    }

    /// Tag subsequent requests with a stream-transaction id.
    pub async fn set_transaction_id(&self, transaction_id: &str) {
        let mut state = self.inner.state.lock().await;
        state.transaction_id = Some(transaction_id.to_string());
    }

    /// Stop tagging requests with a transaction id.
    pub async fn clear_transaction_id(&self) {
        let mut state = self.inner.state.lock().await;
        state.transaction_id = None;
    }

    /// Close every host transport. In-flight tasks settle normally.
    pub async fn close(&self) {
        self.inner.state.lock().await.registry.close_all();
    }

    /// Enqueue a request and wait for it to settle.
    ///
    /// The future resolves once the dispatcher delivers a classified
    /// response or a terminal error; silent retries and leader redirects
    /// happen underneath it.
    ///
    /// # Errors
    /// Any terminal [`DriverError`]: transport failures past the retry
    /// budget, structured application errors, HTTP errors, or body decode
    /// failures.
    pub async fn request(&self, options: RequestOptions) -> Result<ArangoResponse> {
        let RequestOptions {
            host,
            method,
            base_path,
            path,
            query,
            headers,
            body,
            allow_dirty_read,
            timeout,
            expect_binary,
        } = options;

        let (content_type, payload) = encode_body(body)?;
        let url = build_url(&base_path, &path, &query);
        let (settle, settled) = oneshot::channel();

        {
            let mut state = self.inner.state.lock().await;

            let mut protocol = HashMap::new();
            protocol.insert("content-type".to_string(), content_type.to_string());
            protocol.insert(
                VERSION_HEADER.to_string(),
                self.inner.arango_version.to_string(),
            );
            if let Some(transaction_id) = &state.transaction_id {
                protocol.insert(TRANSACTION_HEADER.to_string(), transaction_id.clone());
            }
            let merged = merge_headers(protocol, &state.headers, headers);

            state.queue.push_back(Task {
                host,
                allow_dirty_read,
                retries: 0,
                request: TransportRequest {
                    method,
                    url,
                    headers: merged,
                    body: payload,
                    timeout,
                    expect_binary,
                },
                settle,
            });
        }
        self.inner.run_queue();

        match settled.await {
            Ok(result) => result,
            Err(_) => Err(DriverError::ConnectionClosed),
        }
    }

    /// Perform a request and deserialize the JSON body of the success.
    ///
    /// # Errors
    /// Everything [`Connection::request`] can fail with, plus a decode
    /// error when the body does not match `T`.
    pub async fn request_json<T: DeserializeOwned>(&self, options: RequestOptions) -> Result<T> {
        self.request(options).await?.json()
    }
}

impl ConnectionInner {
    /// Pump the queue: dispatch tasks while the budget allows. Runs as its
    /// own spawned task so every settle path can re-invoke it through a
    /// plain function call instead of recursing.
    fn run_queue(self: &Arc<Self>) {
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                let mut state = inner.state.lock().await;
                if state.active_tasks >= inner.max_tasks {
                    break;
                }
                let Some(mut task) = state.queue.pop_front() else {
                    break;
                };
                if let Some(pinned) = task.host {
                    if pinned >= state.registry.len() {
                        let _ = task.settle.send(Err(DriverError::Validation(format!(
                            "host index {pinned} is not registered"
                        ))));
                        continue;
                    }
                }
                let host = select_host(&inner, &mut state, &mut task);
                state.active_tasks += 1;
                let transport = state.registry.transport(host);
                drop(state);

                let request = task.request.clone();
                let task_inner = Arc::clone(&inner);
                tokio::spawn(async move {
                    let outcome = transport.send(request).await;
                    let mut state = task_inner.state.lock().await;
                    settle_task(&task_inner, &mut state, task, host, outcome);
                    drop(state);
                    task_inner.run_queue();
                });
            }
        });
    }
}

// ---------------------------------------------------------------------------
// Dispatch internals
// ---------------------------------------------------------------------------

/// Resolve the target host for a task and advance the relevant cursor.
///
/// Pinned hosts win unconditionally. Dirty reads rotate their own cursor
/// regardless of strategy and gain the allowance header. ROUND_ROBIN
/// advances the active host after selection; NONE and ONE_RANDOM leave it
/// alone.
fn select_host(inner: &ConnectionInner, state: &mut DispatchState, task: &mut Task) -> usize {
    if let Some(pinned) = task.host {
        return pinned;
    }
    let host_count = state.registry.len();
    if task.allow_dirty_read {
        let host = state.active_dirty_host;
        state.active_dirty_host = (state.active_dirty_host + 1) % host_count;
        task.request
            .headers
            .insert(ALLOW_DIRTY_READ_HEADER.to_string(), "true".to_string());
        host
    } else {
        let host = state.active_host;
        if inner.load_balancing == LoadBalancingStrategy::RoundRobin {
            state.active_host = (state.active_host + 1) % host_count;
        }
        host
    }
}

/// Route one finished transport call: failover bookkeeping, silent retry,
/// leader redirect, or classification and delivery.
fn settle_task(
    inner: &ConnectionInner,
    state: &mut DispatchState,
    mut task: Task,
    used_host: usize,
    outcome: std::result::Result<TransportResponse, TransportError>,
) {
    state.active_tasks -= 1;

    match outcome {
        Err(err) => {
            if inner.use_failover
                && task.host.is_none()
                && !task.allow_dirty_read
                && state.registry.len() > 1
                && state.active_host == used_host
            {
                state.active_host = (state.active_host + 1) % state.registry.len();
                debug!(
                    failed_host = used_host,
                    active_host = state.active_host,
                    "connection error, advanced active host"
                );
            }

            let ceiling = inner.max_retries.ceiling(state.registry.len());
            let retryable = task.host.is_none()
                && matches!(err, TransportError::ConnectionRefused(_))
                && task.retries < ceiling;
            if retryable {
                task.retries += 1;
                debug!(
                    host = used_host,
                    retries = task.retries,
                    ceiling,
                    "connection refused, re-queueing task"
                );
                state.queue.push_back(task);
            } else {
                let _ = task.settle.send(Err(err.into()));
            }
        }
        Ok(response) => {
            let leader = (response.status == 503)
                .then(|| response.headers.get(LEADER_ENDPOINT_HEADER))
                .flatten()
                .cloned();
            if let Some(endpoint) = leader {
                match state
                    .registry
                    .add(std::slice::from_ref(&endpoint), inner.provider.as_ref())
                {
                    Ok(indices) => {
                        let leader_host = indices[0];
                        warn!(
                            endpoint = %endpoint,
                            host = leader_host,
                            "leader changed, following redirect"
                        );
                        task.host = Some(leader_host);
                        if state.active_host == used_host {
                            state.active_host = leader_host;
                        }
                        state.queue.push_back(task);
                    }
                    Err(err) => {
                        let _ = task.settle.send(Err(err));
                    }
                }
            } else {
                let result = classify(response, task.request.expect_binary).map(|mut classified| {
                    classified.host = Some(used_host);
                    classified
                });
                let _ = task.settle.send(result);
            }
        }
    }
}

/// Serialize a request body and name its content type.
fn encode_body(body: Body) -> Result<(&'static str, Option<Vec<u8>>)> {
    Ok(match body {
        Body::None => ("text/plain", None),
        Body::Json(value) => ("application/json", Some(serde_json::to_vec(&value)?)),
        Body::Text(text) => ("text/plain", Some(text.into_bytes())),
        Body::Binary(bytes) => ("application/octet-stream", Some(bytes)),
    })
}

/// Assemble the request path and encoded query string.
fn build_url(base_path: &str, path: &str, query: &[(String, String)]) -> RequestUrl {
    let pathname = format!("{base_path}{path}");
    let search = if query.is_empty() {
        None
    } else {
        Some(
            form_urlencoded::Serializer::new(String::new())
                .extend_pairs(query)
                .finish(),
        )
    };
    RequestUrl { pathname, search }
}

/// Merge request headers. Per-call entries win over connection defaults,
/// which win over protocol headers. Names are lowercased so later layers
/// reliably shadow earlier ones.
fn merge_headers(
    protocol: HashMap<String, String>,
    defaults: &HashMap<String, String>,
    per_call: HashMap<String, String>,
) -> HashMap<String, String> {
    let mut merged = protocol;
    for (name, value) in defaults {
        merged.insert(name.to_lowercase(), value.clone());
    }
    for (name, value) in per_call {
        merged.insert(name.to_lowercase(), value);
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_build_url() {
        let url = build_url("/_db/_system", "/_api/version", &[]);
        assert_eq!(url.pathname, "/_db/_system/_api/version");
        assert_eq!(url.search, None);

        let query = vec![
            ("details".to_string(), "true".to_string()),
            ("name".to_string(), "a b".to_string()),
        ];
        let url = build_url("", "/_api/collection", &query);
        assert_eq!(url.pathname, "/_api/collection");
        assert_eq!(url.search.as_deref(), Some("details=true&name=a+b"));
    }

    #[test]
    fn test_encode_body_content_types() {
        let (content_type, payload) = encode_body(Body::None).unwrap();
        assert_eq!(content_type, "text/plain");
        assert!(payload.is_none());

        let (content_type, payload) = encode_body(Body::Json(json!({"a": 1}))).unwrap();
        assert_eq!(content_type, "application/json");
        assert_eq!(payload.as_deref(), Some(br#"{"a":1}"#.as_slice()));

        let (content_type, _) = encode_body(Body::Text("hi".into())).unwrap();
        assert_eq!(content_type, "text/plain");

        let (content_type, payload) = encode_body(Body::Binary(vec![1, 2])).unwrap();
        assert_eq!(content_type, "application/octet-stream");
        assert_eq!(payload.as_deref(), Some(&[1u8, 2][..]));
    }

    #[test]
    fn test_retry_ceiling() {
        assert_eq!(MaxRetries::Disabled.ceiling(5), 0);
        assert_eq!(MaxRetries::Auto.ceiling(1), 0);
        assert_eq!(MaxRetries::Auto.ceiling(4), 3);
        assert_eq!(MaxRetries::Limit(0).ceiling(4), 0);
        assert_eq!(MaxRetries::Limit(7).ceiling(2), 7);
    }

    #[test]
    fn test_merge_header_precedence() {
        let mut protocol = HashMap::new();
        protocol.insert("x-arango-version".to_string(), "30400".to_string());
        protocol.insert("content-type".to_string(), "text/plain".to_string());

        let mut defaults = HashMap::new();
        defaults.insert("Authorization".to_string(), "Basic abc".to_string());
        defaults.insert("x-arango-version".to_string(), "30500".to_string());

        let mut per_call = HashMap::new();
        per_call.insert("AUTHORIZATION".to_string(), "Bearer xyz".to_string());

        let merged = merge_headers(protocol, &defaults, per_call);
        assert_eq!(merged.get("authorization").map(String::as_str), Some("Bearer xyz"));
        assert_eq!(merged.get("x-arango-version").map(String::as_str), Some("30500"));
        assert_eq!(merged.get("content-type").map(String::as_str), Some("text/plain"));
        assert_eq!(merged.get("Authorization"), None);
    }

    #[test]
    fn test_default_options() {
        let options = ConnectionOptions::default();
        assert!(options.urls.is_empty());
        assert_eq!(options.arango_version, 30400);
        assert_eq!(options.load_balancing, LoadBalancingStrategy::None);
        assert_eq!(options.max_retries, MaxRetries::Auto);
    }
}
