// SPDX-License-Identifier: PMPL-1.0-or-later
//! Batched consumption of AQL query results.
//!
//! A query returns its first batch inline. Remaining batches live on the
//! coordinator that executed the query and are fetched on demand with
//! `PUT /_api/cursor/{id}`, so follow-up fetches are pinned to that host.

use std::collections::VecDeque;

use serde::Deserialize;
use serde_json::Value;

use crate::connection::RequestOptions;
use crate::database::Database;
use crate::error::Result;
use crate::transport::Method;

/// Wire shape of one batch as returned by `/_api/cursor`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CursorPage {
    pub(crate) result: Vec<Value>,
    #[serde(default)]
    pub(crate) has_more: bool,
    #[serde(default)]
    pub(crate) id: Option<String>,
    #[serde(default)]
    pub(crate) count: Option<u64>,
    #[serde(default)]
    pub(crate) extra: Option<Value>,
}

/// Lazily fetched result set of an AQL query.
///
/// The first batch is buffered locally. [`Cursor::next`], [`Cursor::next_batch`]
/// and [`Cursor::all`] refill the buffer from the server until the cursor is
/// exhausted.
#[derive(Debug)]
pub struct Cursor {
    db: Database,
    id: Option<String>,
    host: Option<usize>,
    allow_dirty_read: bool,
    buffer: VecDeque<Value>,
    has_more: bool,
    count: Option<u64>,
    extra: Option<Value>,
}

impl Cursor {
    pub(crate) fn new(
        db: Database,
        page: CursorPage,
        host: Option<usize>,
        allow_dirty_read: bool,
    ) -> Self {
        // No id means the whole result fit in the first batch.
        let has_more = page.id.is_some() && page.has_more;
        Cursor {
            db,
            id: page.id,
            host,
            allow_dirty_read,
            buffer: page.result.into(),
            has_more,
            count: page.count,
            extra: page.extra,
        }
    }

    /// Total result count, when the query was submitted with `count: true`.
    pub fn count(&self) -> Option<u64> {
        self.count
    }

    /// Extra metadata reported by the server (warnings, stats, profile).
    pub fn extra(&self) -> Option<&Value> {
        self.extra.as_ref()
    }

    /// Whether the server still holds batches this cursor has not fetched.
    pub fn has_more(&self) -> bool {
        self.has_more
    }

    /// Whether another call to [`Cursor::next`] can yield a value.
    pub fn has_next(&self) -> bool {
        self.has_more || !self.buffer.is_empty()
    }

    /// Next result value, or `None` once the cursor is exhausted.
    ///
    /// # Errors
    /// Fails if fetching a follow-up batch fails.
    pub async fn next(&mut self) -> Result<Option<Value>> {
        while self.buffer.is_empty() && self.has_more {
            self.fetch_batch().await?;
        }
        Ok(self.buffer.pop_front())
    }

    /// Everything currently buffered, fetching a batch first if the buffer is
    /// empty. Returns `None` once the cursor is exhausted.
    ///
    /// # Errors
    /// Fails if fetching a follow-up batch fails.
    pub async fn next_batch(&mut self) -> Result<Option<Vec<Value>>> {
        while self.buffer.is_empty() && self.has_more {
            self.fetch_batch().await?;
        }
        if self.buffer.is_empty() {
            return Ok(None);
        }
        Ok(Some(std::mem::take(&mut self.buffer).into()))
    }

    /// Drain every remaining batch and return the full result set.
    ///
    /// # Errors
    /// Fails if fetching a follow-up batch fails.
    pub async fn all(&mut self) -> Result<Vec<Value>> {
        while self.has_more {
            self.fetch_batch().await?;
        }
        Ok(std::mem::take(&mut self.buffer).into())
    }

    /// Discard the server-side cursor without consuming it. No-op when every
    /// batch has already been delivered.
    ///
    /// # Errors
    /// Fails if the server rejects the delete.
    pub async fn kill(&mut self) -> Result<()> {
        if !self.has_more {
            return Ok(());
        }
        let Some(id) = self.id.as_deref() else {
            return Ok(());
        };
        let path = format!("/_api/cursor/{id}");
        self.db
            .request(RequestOptions {
                method: Method::Delete,
                path,
                ..RequestOptions::default()
            })
            .await?;
        self.has_more = false;
        Ok(())
    }

    async fn fetch_batch(&mut self) -> Result<()> {
        let Some(id) = self.id.as_deref() else {
            self.has_more = false;
            return Ok(());
        };
        let path = format!("/_api/cursor/{id}");
        let response = self
            .db
            .request(RequestOptions {
                method: Method::Put,
                path,
                host: self.host,
                allow_dirty_read: self.allow_dirty_read,
                ..RequestOptions::default()
            })
            .await?;
        let page: CursorPage = response.json()?;
        self.buffer.extend(page.result);
        self.has_more = page.has_more;
        Ok(())
    }
}
