//! Connection pool
//!
//! Holds exactly one long-lived handle per system for the duration of a run.
//! Every call is bounded by the caller's timeout; transient connection
//! failures are retried with exponential backoff, query failures never are.
//!
//! Handles are trait objects so runs can execute against PostgreSQL-wire
//! systems ([`postgres::PgConnector`]) or in-memory fixtures
//! ([`memory::MemoryConnector`]).

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use recon_core::domain::mapping::SystemId;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::error::PoolError;

/// Column metadata returned by schema introspection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>, nullable: bool) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            nullable,
        }
    }
}

/// A bounded, fully materialised query result
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RowSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<serde_json::Value>>,
    /// Set when the row cap stopped the fetch before the result was exhausted
    pub truncated: bool,
    /// Per column: whether the system declared a numeric type, so textual
    /// cells (exact decimals) compare by value rather than byte for byte
    #[serde(default)]
    pub numeric: Vec<bool>,
}

impl RowSet {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<serde_json::Value>>) -> Self {
        Self {
            columns,
            rows,
            truncated: false,
            numeric: Vec::new(),
        }
    }

    /// Marks the named columns as numerically typed
    pub fn with_numeric_columns(mut self, names: &[&str]) -> Self {
        self.numeric = self
            .columns
            .iter()
            .map(|c| names.iter().any(|n| n.eq_ignore_ascii_case(c)))
            .collect();
        self
    }

    pub fn is_numeric(&self, column: usize) -> bool {
        self.numeric.get(column).copied().unwrap_or(false)
    }

    /// Single-row, single-column result
    pub fn scalar(column: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        Self::new(vec![column.into()], vec![vec![value.into()]])
    }

    pub fn first_value(&self) -> Option<&serde_json::Value> {
        self.rows.first().and_then(|row| row.first())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Failure reported by a handle, classified for the retry policy
#[derive(Debug, Clone, Error)]
pub enum ConnectorError {
    /// Network or pool level failure worth retrying
    #[error("transient connection failure: {0}")]
    Transient(String),

    /// Malformed SQL, permission denied, missing table; never retried
    #[error("{0}")]
    Query(String),
}

/// A live handle to one system
#[async_trait]
pub trait Connector: Send + Sync {
    /// Runs `query`, stopping after `row_cap` rows when given
    async fn fetch(&self, query: &str, row_cap: Option<usize>) -> Result<RowSet, ConnectorError>;

    /// Lists the columns of `table` (`schema.table` or bare table name)
    async fn describe(&self, table: &str) -> Result<Vec<ColumnSpec>, ConnectorError>;
}

/// Opens the handles for a run
#[async_trait]
pub trait ConnectorFactory: Send + Sync {
    async fn open(&self, system: SystemId) -> Result<Arc<dyn Connector>, ConnectorError>;
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff: Duration,
}

impl From<&EngineConfig> for RetryPolicy {
    fn from(config: &EngineConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            backoff: config.retry_backoff,
        }
    }
}

/// The two handles owned by one run
pub struct ConnectionPool {
    source: Arc<dyn Connector>,
    target: Arc<dyn Connector>,
    retry: RetryPolicy,
}

impl ConnectionPool {
    pub fn new(source: Arc<dyn Connector>, target: Arc<dyn Connector>, retry: RetryPolicy) -> Self {
        Self {
            source,
            target,
            retry,
        }
    }

    /// Opens one handle per system, retrying transient failures
    pub async fn open(factory: &dyn ConnectorFactory, config: &EngineConfig) -> Result<Self, PoolError> {
        let retry = RetryPolicy::from(config);

        let source = with_retry(SystemId::Source, retry, config.connect_timeout, || {
            factory.open(SystemId::Source)
        })
        .await?;
        let target = with_retry(SystemId::Target, retry, config.connect_timeout, || {
            factory.open(SystemId::Target)
        })
        .await?;

        debug!("Opened source and target handles");
        Ok(Self::new(source, target, retry))
    }

    /// Executes `query` on `system`
    pub async fn execute(
        &self,
        system: SystemId,
        query: &str,
        timeout: Duration,
        row_cap: Option<usize>,
    ) -> Result<RowSet, PoolError> {
        let handle = self.handle(system);
        debug!(%system, "Executing query: {}", query);
        with_retry(system, self.retry, timeout, || handle.fetch(query, row_cap)).await
    }

    /// Introspects the columns of `table` on `system`
    pub async fn describe_schema(
        &self,
        system: SystemId,
        table: &str,
        timeout: Duration,
    ) -> Result<Vec<ColumnSpec>, PoolError> {
        let handle = self.handle(system);
        debug!(%system, "Describing table: {}", table);
        with_retry(system, self.retry, timeout, || handle.describe(table)).await
    }

    fn handle(&self, system: SystemId) -> &Arc<dyn Connector> {
        match system {
            SystemId::Source => &self.source,
            SystemId::Target => &self.target,
        }
    }
}

/// Runs `op` under `timeout`, retrying transient failures with exponential backoff
///
/// The timeout covers all attempts. Dropping the in-flight future on timeout
/// hands the handle back without waiting for the abandoned call.
async fn with_retry<T, F, Fut>(
    system: SystemId,
    retry: RetryPolicy,
    timeout: Duration,
    mut op: F,
) -> Result<T, PoolError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ConnectorError>>,
{
    let attempts = async {
        let mut attempt = 0;
        let mut delay = retry.backoff;

        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(ConnectorError::Query(message)) => {
                    return Err(PoolError::Query { system, message });
                }
                Err(ConnectorError::Transient(message)) => {
                    if attempt >= retry.max_retries {
                        return Err(PoolError::Connection { system, message });
                    }
                    attempt += 1;
                    warn!(
                        "Transient failure on {} (attempt {}/{}): {}",
                        system, attempt, retry.max_retries, message
                    );
                    tokio::time::sleep(delay).await;
                    delay = delay.saturating_mul(2);
                }
            }
        }
    };

    match tokio::time::timeout(timeout, attempts).await {
        Ok(result) => result,
        Err(_) => {
            warn!("Call on {} timed out after {:?}", system, timeout);
            Err(PoolError::Timeout {
                system,
                after: timeout,
            })
        }
    }
}
