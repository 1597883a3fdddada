//! PostgreSQL-wire connector
//!
//! Each handle is an sqlx pool capped at a single connection, so a run holds
//! exactly one session per system. A call abandoned on timeout drops its
//! connection; the next acquire tests or replaces it before reuse.

use async_trait::async_trait;
use futures::TryStreamExt;
use recon_core::domain::mapping::SystemId;
use serde_json::Value;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Column, Decode, Postgres, Row, Type, TypeInfo};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use super::{ColumnSpec, Connector, ConnectorError, ConnectorFactory, RowSet};

pub struct PgConnector {
    pool: PgPool,
}

impl PgConnector {
    pub async fn connect(url: &str, connect_timeout: Duration) -> Result<Self, ConnectorError> {
        let pool = PgPoolOptions::new()
            .max_connections(1)
            .min_connections(0)
            .acquire_timeout(connect_timeout)
            .test_before_acquire(true)
            .connect(url)
            .await
            .map_err(classify)?;

        Ok(Self { pool })
    }
}

#[async_trait]
impl Connector for PgConnector {
    async fn fetch(&self, query: &str, row_cap: Option<usize>) -> Result<RowSet, ConnectorError> {
        let mut stream = sqlx::query(query).fetch(&self.pool);
        let mut result = RowSet::default();

        while let Some(row) = stream.try_next().await.map_err(classify)? {
            if result.columns.is_empty() {
                result.columns = row.columns().iter().map(|c| c.name().to_string()).collect();
                result.numeric = row
                    .columns()
                    .iter()
                    .map(|c| is_numeric_type(c.type_info().name()))
                    .collect();
            }
            if row_cap.is_some_and(|cap| result.rows.len() >= cap) {
                result.truncated = true;
                break;
            }
            result.rows.push(decode_row(&row));
        }

        Ok(result)
    }

    async fn describe(&self, table: &str) -> Result<Vec<ColumnSpec>, ConnectorError> {
        let (schema, name) = split_table(table);

        let rows: Vec<(String, String, String)> = sqlx::query_as(
            "SELECT column_name, data_type, is_nullable \
             FROM information_schema.columns \
             WHERE upper(table_schema) = upper($1) AND upper(table_name) = upper($2) \
             ORDER BY ordinal_position",
        )
        .bind(schema)
        .bind(name)
        .fetch_all(&self.pool)
        .await
        .map_err(classify)?;

        if rows.is_empty() {
            return Err(ConnectorError::Query(format!("table not found: {}", table)));
        }

        Ok(rows
            .into_iter()
            .map(|(name, data_type, nullable)| ColumnSpec::new(name, data_type, nullable == "YES"))
            .collect())
    }
}

/// Opens [`PgConnector`]s for the configured source and target URLs
pub struct PgConnectorFactory {
    source_url: String,
    target_url: String,
    connect_timeout: Duration,
}

impl PgConnectorFactory {
    pub fn new(source_url: impl Into<String>, target_url: impl Into<String>, connect_timeout: Duration) -> Self {
        Self {
            source_url: source_url.into(),
            target_url: target_url.into(),
            connect_timeout,
        }
    }
}

#[async_trait]
impl ConnectorFactory for PgConnectorFactory {
    async fn open(&self, system: SystemId) -> Result<Arc<dyn Connector>, ConnectorError> {
        let url = match system {
            SystemId::Source => &self.source_url,
            SystemId::Target => &self.target_url,
        };
        let connector = PgConnector::connect(url, self.connect_timeout).await?;
        info!("Connected to {} system", system);
        Ok(Arc::new(connector))
    }
}

/// `schema.table` -> (`schema`, `table`); bare names resolve against `public`
fn split_table(table: &str) -> (&str, &str) {
    let trimmed = table.trim();
    match trimmed.rsplit_once('.') {
        Some((qualifier, name)) => {
            // database.schema.table keeps only the schema
            let schema = qualifier.rsplit('.').next().unwrap_or(qualifier);
            (unquote(schema), unquote(name))
        }
        None => ("public", unquote(trimmed)),
    }
}

fn unquote(ident: &str) -> &str {
    ident.trim_matches('"')
}

fn classify(err: sqlx::Error) -> ConnectorError {
    let transient = match &err {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed
        | sqlx::Error::Protocol(_) => true,
        // class 08 is connection exception; 57P01 is admin_shutdown
        sqlx::Error::Database(db) => db
            .code()
            .is_some_and(|code| code.starts_with("08") || code == "57P01"),
        _ => false,
    };

    if transient {
        ConnectorError::Transient(err.to_string())
    } else {
        ConnectorError::Query(err.to_string())
    }
}

fn is_numeric_type(type_name: &str) -> bool {
    matches!(
        type_name.to_ascii_uppercase().as_str(),
        "INT2" | "INT4" | "INT8" | "FLOAT4" | "FLOAT8" | "NUMERIC" | "OID"
    )
}

fn decode_row(row: &PgRow) -> Vec<Value> {
    (0..row.columns().len()).map(|idx| decode_value(row, idx)).collect()
}

fn decode_value(row: &PgRow, idx: usize) -> Value {
    let type_name = row.columns()[idx].type_info().name().to_ascii_uppercase();

    let decoded = match type_name.as_str() {
        "BOOL" => get::<bool>(row, idx),
        "INT2" => get::<i16>(row, idx),
        "INT4" => get::<i32>(row, idx),
        "INT8" => get::<i64>(row, idx),
        "FLOAT4" => get::<f32>(row, idx),
        "FLOAT8" => get::<f64>(row, idx),
        // exact decimals travel as text so no precision is lost
        "NUMERIC" => get_with::<rust_decimal::Decimal>(row, idx, |d| Value::String(d.normalize().to_string())),
        "TIMESTAMPTZ" => get_with::<chrono::DateTime<chrono::Utc>>(row, idx, |t| Value::String(t.to_rfc3339())),
        "TIMESTAMP" => get_with::<chrono::NaiveDateTime>(row, idx, |t| Value::String(t.to_string())),
        "DATE" => get_with::<chrono::NaiveDate>(row, idx, |d| Value::String(d.to_string())),
        "TIME" => get_with::<chrono::NaiveTime>(row, idx, |t| Value::String(t.to_string())),
        "UUID" => get_with::<uuid::Uuid>(row, idx, |u| Value::String(u.to_string())),
        "JSON" | "JSONB" => get::<Value>(row, idx),
        _ => get::<String>(row, idx),
    };

    match decoded {
        Ok(Some(value)) => value,
        Ok(None) => Value::Null,
        Err(_) => Value::String(format!("<undecodable {}>", type_name)),
    }
}

fn get<'r, T>(row: &'r PgRow, idx: usize) -> Result<Option<Value>, sqlx::Error>
where
    T: Decode<'r, Postgres> + Type<Postgres> + Into<Value>,
{
    get_with::<T>(row, idx, Into::into)
}

fn get_with<'r, T>(row: &'r PgRow, idx: usize, convert: impl FnOnce(T) -> Value) -> Result<Option<Value>, sqlx::Error>
where
    T: Decode<'r, Postgres> + Type<Postgres>,
{
    row.try_get::<Option<T>, _>(idx).map(|v| v.map(convert))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_table() {
        assert_eq!(split_table("SALES.ORDERS"), ("SALES", "ORDERS"));
        assert_eq!(split_table("DW.SALES.ORDERS"), ("SALES", "ORDERS"));
        assert_eq!(split_table("orders"), ("public", "orders"));
        assert_eq!(split_table("\"Dim\".\"Customer\""), ("Dim", "Customer"));
    }

    #[test]
    fn test_numeric_types() {
        assert!(is_numeric_type("NUMERIC"));
        assert!(is_numeric_type("int8"));
        assert!(!is_numeric_type("TEXT"));
        assert!(!is_numeric_type("VARCHAR"));
    }

    #[test]
    fn test_classify() {
        assert!(matches!(classify(sqlx::Error::PoolTimedOut), ConnectorError::Transient(_)));
        assert!(matches!(classify(sqlx::Error::RowNotFound), ConnectorError::Query(_)));
    }
}
