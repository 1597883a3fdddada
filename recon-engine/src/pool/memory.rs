//! In-memory connector
//!
//! Serves canned results keyed by query text. Used to exercise pipelines
//! without a database and to script failure modes (latency, transient
//! errors, panics).

use async_trait::async_trait;
use recon_core::domain::mapping::SystemId;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use super::{ColumnSpec, Connector, ConnectorError, ConnectorFactory, RowSet};

#[derive(Default)]
pub struct MemoryConnector {
    results: HashMap<String, (RowSet, Option<Duration>)>,
    tables: HashMap<String, Vec<ColumnSpec>>,
    panic_on: Option<String>,
    transient_failures: AtomicU32,
    calls: AtomicU32,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_result(mut self, query: &str, rows: RowSet) -> Self {
        self.results.insert(normalize(query), (rows, None));
        self
    }

    /// Result that only arrives after `delay`
    pub fn with_slow_result(mut self, query: &str, rows: RowSet, delay: Duration) -> Self {
        self.results.insert(normalize(query), (rows, Some(delay)));
        self
    }

    pub fn with_table(mut self, table: &str, columns: Vec<ColumnSpec>) -> Self {
        self.tables.insert(table.trim().to_ascii_uppercase(), columns);
        self
    }

    /// Panics when `query` is executed
    pub fn panicking_on(mut self, query: &str) -> Self {
        self.panic_on = Some(normalize(query));
        self
    }

    /// The first `n` calls fail with a transient error
    pub fn failing_first(self, n: u32) -> Self {
        self.transient_failures.store(n, Ordering::SeqCst);
        self
    }

    /// Number of calls received so far, failed ones included
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    fn take_transient_failure(&self) -> bool {
        self.transient_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn fetch(&self, query: &str, row_cap: Option<usize>) -> Result<RowSet, ConnectorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.take_transient_failure() {
            return Err(ConnectorError::Transient("connection reset by peer".to_string()));
        }

        let key = normalize(query);
        if self.panic_on.as_deref() == Some(key.as_str()) {
            panic!("driver fault while executing: {}", key);
        }

        let (rows, delay) = self
            .results
            .get(&key)
            .ok_or_else(|| ConnectorError::Query(format!("syntax error or unknown relation in: {}", key)))?;

        if let Some(delay) = delay {
            tokio::time::sleep(*delay).await;
        }

        let mut rows = rows.clone();
        if let Some(cap) = row_cap
            && rows.rows.len() > cap
        {
            rows.rows.truncate(cap);
            rows.truncated = true;
        }
        Ok(rows)
    }

    async fn describe(&self, table: &str) -> Result<Vec<ColumnSpec>, ConnectorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.take_transient_failure() {
            return Err(ConnectorError::Transient("connection reset by peer".to_string()));
        }

        self.tables
            .get(&table.trim().to_ascii_uppercase())
            .cloned()
            .ok_or_else(|| ConnectorError::Query(format!("table not found: {}", table)))
    }
}

/// Hands out the same two in-memory handles to every run
pub struct MemoryConnectorFactory {
    source: Arc<MemoryConnector>,
    target: Arc<MemoryConnector>,
    unreachable: Option<SystemId>,
}

impl MemoryConnectorFactory {
    pub fn new(source: MemoryConnector, target: MemoryConnector) -> Self {
        Self {
            source: Arc::new(source),
            target: Arc::new(target),
            unreachable: None,
        }
    }

    /// Every attempt to open `system` fails with a transient error
    pub fn unreachable(mut self, system: SystemId) -> Self {
        self.unreachable = Some(system);
        self
    }

    pub fn source(&self) -> &MemoryConnector {
        &self.source
    }

    pub fn target(&self) -> &MemoryConnector {
        &self.target
    }
}

#[async_trait]
impl ConnectorFactory for MemoryConnectorFactory {
    async fn open(&self, system: SystemId) -> Result<Arc<dyn Connector>, ConnectorError> {
        if self.unreachable == Some(system) {
            return Err(ConnectorError::Transient(format!("{} refused the connection", system)));
        }
        let handle: Arc<dyn Connector> = match system {
            SystemId::Source => self.source.clone(),
            SystemId::Target => self.target.clone(),
        };
        Ok(handle)
    }
}

/// Collapses whitespace so canned queries match regardless of formatting
fn normalize(query: &str) -> String {
    query.split_whitespace().collect::<Vec<_>>().join(" ")
}
