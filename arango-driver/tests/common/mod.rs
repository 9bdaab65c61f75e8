// SPDX-License-Identifier: PMPL-1.0-or-later
//! Scripted transport shared by the dispatch and API tests.
//!
//! [`ScriptedNet`] plays the cluster: each normalized host URL gets a list
//! of scripted reactions, consumed one per send with the last step repeating
//! once reached. Every send is recorded for later assertions, and an
//! in-flight high-water mark captures how much overlap the dispatcher
//! actually produced.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};

use arango_driver::{
    Method, Transport, TransportError, TransportProvider, TransportRequest, TransportResponse,
};

/// One scripted reaction of a host.
#[derive(Clone)]
pub enum Script {
    /// 200 with the given JSON body.
    Json(Value),
    /// Arbitrary status with the given JSON body.
    Status(u16, Value),
    /// 503 naming a leader endpoint.
    Redirect(String),
    /// Transport-level failure.
    Fail(TransportError),
}

impl Script {
    pub fn ok() -> Script {
        Script::Json(json!({ "error": false, "code": 200 }))
    }

    pub fn refuse() -> Script {
        Script::Fail(TransportError::ConnectionRefused(
            "connect ECONNREFUSED".to_string(),
        ))
    }
}

/// One request as a host transport saw it.
#[derive(Clone)]
pub struct SentRequest {
    pub url: String,
    pub method: Method,
    pub pathname: String,
    pub search: Option<String>,
    pub headers: HashMap<String, String>,
    pub body: Option<Vec<u8>>,
}

impl SentRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    pub fn json_body(&self) -> Value {
        serde_json::from_slice(self.body.as_deref().unwrap_or_default()).unwrap()
    }
}

#[derive(Default)]
struct ScriptQueue {
    steps: Vec<Script>,
    cursor: usize,
}

impl ScriptQueue {
    fn next(&mut self) -> Script {
        if self.steps.is_empty() {
            return Script::ok();
        }
        let step = self.steps[self.cursor.min(self.steps.len() - 1)].clone();
        self.cursor += 1;
        step
    }
}

#[derive(Default)]
struct NetInner {
    scripts: Mutex<HashMap<String, ScriptQueue>>,
    sent: Mutex<Vec<SentRequest>>,
    opened: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    high_water: AtomicUsize,
    closed: AtomicUsize,
}

/// Scripted cluster plus the assertions it supports.
#[derive(Clone, Default)]
pub struct ScriptedNet {
    inner: Arc<NetInner>,
}

impl ScriptedNet {
    pub fn new() -> ScriptedNet {
        ScriptedNet::default()
    }

    /// Provider handle to pass into `Connection::with_provider`.
    pub fn provider(&self) -> Box<dyn TransportProvider> {
        Box::new(ScriptedProvider {
            inner: Arc::clone(&self.inner),
        })
    }

    /// Script a host's reactions. Hosts without a script answer
    /// `{"error": false, "code": 200}` forever.
    pub fn script(&self, url: &str, steps: Vec<Script>) {
        let mut scripts = self.inner.scripts.lock().unwrap();
        scripts.insert(url.to_string(), ScriptQueue { steps, cursor: 0 });
    }

    /// Every send in dispatch order.
    pub fn sent(&self) -> Vec<SentRequest> {
        self.inner.sent.lock().unwrap().clone()
    }

    /// Host URLs in dispatch order.
    pub fn hosts_hit(&self) -> Vec<String> {
        self.inner
            .sent
            .lock()
            .unwrap()
            .iter()
            .map(|request| request.url.clone())
            .collect()
    }

    /// Most concurrent sends observed so far.
    pub fn high_water(&self) -> usize {
        self.inner.high_water.load(Ordering::SeqCst)
    }

    /// URLs the provider was asked to open, in order.
    pub fn opened(&self) -> Vec<String> {
        self.inner.opened.lock().unwrap().clone()
    }

    /// Transport handles closed so far.
    pub fn close_count(&self) -> usize {
        self.inner.closed.load(Ordering::SeqCst)
    }
}

struct ScriptedProvider {
    inner: Arc<NetInner>,
}

impl TransportProvider for ScriptedProvider {
    fn open(&self, url: &str) -> arango_driver::Result<Arc<dyn Transport>> {
        self.inner.opened.lock().unwrap().push(url.to_string());
        Ok(Arc::new(ScriptedTransport {
            url: url.to_string(),
            inner: Arc::clone(&self.inner),
        }))
    }
}

struct ScriptedTransport {
    url: String,
    inner: Arc<NetInner>,
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        let inner = &self.inner;
        let concurrent = inner.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        inner.high_water.fetch_max(concurrent, Ordering::SeqCst);

        inner.sent.lock().unwrap().push(SentRequest {
            url: self.url.clone(),
            method: request.method,
            pathname: request.url.pathname.clone(),
            search: request.url.search.clone(),
            headers: request.headers.clone(),
            body: request.body.clone(),
        });

        // Let sibling dispatch tasks start so overlap registers in the
        // high-water mark.
        tokio::task::yield_now().await;

        let script = {
            let mut scripts = inner.scripts.lock().unwrap();
            scripts.entry(self.url.clone()).or_default().next()
        };
        let result = match script {
            Script::Json(body) => Ok(json_response(200, &[], body)),
            Script::Status(status, body) => Ok(json_response(status, &[], body)),
            Script::Redirect(endpoint) => Ok(json_response(
                503,
                &[("x-arango-endpoint", endpoint.as_str())],
                json!({
                    "error": true,
                    "code": 503,
                    "errorNum": 1496,
                    "errorMessage": "not a leader",
                }),
            )),
            Script::Fail(error) => Err(error),
        };

        inner.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn close(&self) {
        self.inner.closed.fetch_add(1, Ordering::SeqCst);
    }
}

fn json_response(status: u16, extra: &[(&str, &str)], body: Value) -> TransportResponse {
    let mut headers = HashMap::new();
    headers.insert("content-type".to_string(), "application/json".to_string());
    for (name, value) in extra {
        headers.insert((*name).to_string(), (*value).to_string());
    }
    TransportResponse {
        status,
        headers,
        body: body.to_string().into_bytes(),
    }
}
