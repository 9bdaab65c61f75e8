// SPDX-License-Identifier: PMPL-1.0-or-later
//! Host registry: the append-only list of known coordinator endpoints.
//!
//! Every host is stored under its normalized URL together with the
//! transport handle minted for it. Indices are positional and stable for
//! the life of the connection; in-flight tasks reference hosts by index,
//! so entries are never removed or reordered.

use std::sync::Arc;

use url::Url;

use crate::error::{DriverError, Result};
use crate::transport::{Transport, TransportProvider};

/// Known coordinator endpoints and their transports.
pub(crate) struct HostRegistry {
    urls: Vec<String>,
    transports: Vec<Arc<dyn Transport>>,
}

impl HostRegistry {
    pub(crate) fn new() -> Self {
        Self {
            urls: Vec::new(),
            transports: Vec::new(),
        }
    }

    /// Register endpoint URLs, minting a transport for each URL not seen
    /// before. Returns the registry index for every input URL in input
    /// order, whether it was new or already known.
    pub(crate) fn add(
        &mut self,
        urls: &[String],
        provider: &dyn TransportProvider,
    ) -> Result<Vec<usize>> {
        let mut indices = Vec::with_capacity(urls.len());
        for raw in urls {
            let normalized = normalize_url(raw)?;
            let index = match self.urls.iter().position(|known| *known == normalized) {
                Some(existing) => existing,
                None => {
                    let transport = provider.open(&normalized)?;
                    self.urls.push(normalized);
                    self.transports.push(transport);
                    self.urls.len() - 1
                }
            };
            indices.push(index);
        }
        Ok(indices)
    }

    pub(crate) fn len(&self) -> usize {
        self.urls.len()
    }

    pub(crate) fn urls(&self) -> &[String] {
        &self.urls
    }

    pub(crate) fn transport(&self, index: usize) -> Arc<dyn Transport> {
        Arc::clone(&self.transports[index])
    }

    /// Close every transport. Entries stay registered; the handles decide
    /// what closing means for them.
    pub(crate) fn close_all(&self) {
        for transport in &self.transports {
            transport.close();
        }
    }
}

/// Normalize an endpoint URL: cluster scheme aliases (`tcp`, `ssl`, `tls`,
/// `http+tcp`, `http+ssl`) mapped onto `http`/`https`, scheme and host
/// lowercased, default ports dropped, trailing slash stripped.
///
/// # Errors
/// Rejects URLs that do not parse or that resolve to a non-HTTP scheme.
pub(crate) fn normalize_url(raw: &str) -> Result<String> {
    let mapped = map_endpoint_scheme(raw);
    let parsed = Url::parse(&mapped)
        .map_err(|e| DriverError::Validation(format!("invalid endpoint URL {raw:?}: {e}")))?;
    match parsed.scheme() {
        "http" | "https" => {}
        other => {
            return Err(DriverError::Validation(format!(
                "unsupported endpoint scheme {other:?} in {raw:?}"
            )))
        }
    }
    Ok(parsed.to_string().trim_end_matches('/').to_string())
}

/// Rewrite the endpoint scheme aliases ArangoDB uses in cluster endpoint
/// lists onto plain HTTP schemes. Unknown schemes pass through untouched
/// and fail later in [`normalize_url`].
fn map_endpoint_scheme(raw: &str) -> String {
    let Some((scheme, rest)) = raw.split_once("://") else {
        return raw.to_string();
    };
    let mapped = match scheme.to_ascii_lowercase().as_str() {
        "tcp" | "http+tcp" => "http",
        "ssl" | "tls" | "http+ssl" | "http+tls" => "https",
        _ => return raw.to_string(),
    };
    format!("{mapped}://{rest}")
}
