//! Shared per-request bookkeeping handed to every task body.
//!
//! The scheduler treats the context as opaque. This one carries its own
//! lock so bodies running on different workers can record into it
//! concurrently without further coordination.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Progress and timing of a single downstream transfer.
#[derive(Debug, Clone, Serialize)]
pub struct ResponseRecord {
    pub request_id: String,
    pub downstream: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub total_bytes: u64,
    pub transferred_bytes: u64,
    pub retry_count: u32,
    pub custom_data: Option<String>,
}

impl ResponseRecord {
    /// Start a record for `downstream` with a fresh request id.
    pub fn new(downstream: impl Into<String>) -> Self {
        Self {
            request_id: format!("REQ_{}", Uuid::new_v4().simple()),
            downstream: downstream.into(),
            start_time: Utc::now(),
            end_time: None,
            total_bytes: 0,
            transferred_bytes: 0,
            retry_count: 0,
            custom_data: None,
        }
    }

    /// Transfer progress as a percentage (0 when the total is unknown).
    pub fn progress(&self) -> f64 {
        if self.total_bytes == 0 {
            return 0.0;
        }
        self.transferred_bytes as f64 * 100.0 / self.total_bytes as f64
    }

    /// Elapsed milliseconds between start and end, `None` while unfinished.
    pub fn duration_ms(&self) -> Option<i64> {
        self.end_time
            .map(|end| end.signed_duration_since(self.start_time).num_milliseconds())
    }

    pub fn finish(&mut self) {
        self.end_time = Some(Utc::now());
    }
}

/// Aggregate view over every record in a context.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ContextSummary {
    pub requests: usize,
    pub finished: usize,
    pub total_bytes: u64,
    pub transferred_bytes: u64,
    pub retries: u64,
}

/// Execution context shared by reference across all workers.
#[derive(Debug, Default)]
pub struct TransferContext {
    responses: RwLock<HashMap<String, ResponseRecord>>,
}

impl TransferContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert (or replace) a record, returning its request id.
    pub fn record(&self, record: ResponseRecord) -> String {
        let id = record.request_id.clone();
        let mut map = self.responses.write().unwrap_or_else(|e| e.into_inner());
        map.insert(id.clone(), record);
        id
    }

    /// Mutate an existing record in place. Returns false if the id is unknown.
    pub fn update<F>(&self, request_id: &str, f: F) -> bool
    where
        F: FnOnce(&mut ResponseRecord),
    {
        let mut map = self.responses.write().unwrap_or_else(|e| e.into_inner());
        match map.get_mut(request_id) {
            Some(record) => {
                f(record);
                true
            }
            None => false,
        }
    }

    pub fn get(&self, request_id: &str) -> Option<ResponseRecord> {
        let map = self.responses.read().unwrap_or_else(|e| e.into_inner());
        map.get(request_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.responses.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn summary(&self) -> ContextSummary {
        let map = self.responses.read().unwrap_or_else(|e| e.into_inner());
        map.values().fold(ContextSummary::default(), |mut acc, r| {
            acc.requests += 1;
            if r.end_time.is_some() {
                acc.finished += 1;
            }
            acc.total_bytes += r.total_bytes;
            acc.transferred_bytes += r.transferred_bytes;
            acc.retries += u64::from(r.retry_count);
            acc
        })
    }
}
