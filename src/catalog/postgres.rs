use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::{json, Map, Value};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{Column, PgPool, Row, TypeInfo};

use super::{Catalog, CatalogError};

const MAX_ATTEMPTS: u32 = 3;
const BACKOFF_STEP: Duration = Duration::from_millis(200);

/// Postgres-backed catalog accessor.
///
/// Every query runs in a short-lived READ ONLY transaction with a statement
/// timeout. Transient connection failures are retried with linear backoff up
/// to MAX_ATTEMPTS before the error escapes.
pub struct PgCatalog {
    pool: PgPool,
}

impl PgCatalog {
    pub async fn connect(database_url: &str) -> Result<Self, CatalogError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(10))
            .connect(database_url)
            .await
            .map_err(|e| CatalogError::Connection(e.to_string()))?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn execute_once(&self, sql: &str) -> Result<Vec<Value>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        // First statements of the transaction: the accessor's own discipline,
        // independent of what the safety filter already guaranteed.
        sqlx::query("SET TRANSACTION READ ONLY")
            .execute(&mut *tx)
            .await?;
        sqlx::query("SET LOCAL statement_timeout = '15s'")
            .execute(&mut *tx)
            .await?;

        let rows = sqlx::query(sql).fetch_all(&mut *tx).await?;
        tx.commit().await?;

        rows.iter().map(row_to_json).collect()
    }
}

#[async_trait]
impl Catalog for PgCatalog {
    async fn execute(&self, sql: &str) -> Result<Vec<Value>, CatalogError> {
        let mut attempt = 1;
        loop {
            match self.execute_once(sql).await {
                Ok(rows) => return Ok(rows),
                Err(e) if is_transient(&e) && attempt < MAX_ATTEMPTS => {
                    tracing::warn!(
                        "catalog attempt {}/{} failed ({}), retrying",
                        attempt,
                        MAX_ATTEMPTS,
                        e
                    );
                    tokio::time::sleep(BACKOFF_STEP * attempt).await;
                    attempt += 1;
                }
                Err(e) if is_transient(&e) => {
                    return Err(CatalogError::Connection(e.to_string()));
                }
                Err(e) => return Err(CatalogError::Execution(e.to_string())),
            }
        }
    }

    async fn ping(&self) -> bool {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await.is_ok()
    }
}

/// Connection-level failures worth retrying. Anything the database itself
/// rejected (syntax, unknown column, permission) is not transient.
fn is_transient(e: &sqlx::Error) -> bool {
    matches!(
        e,
        sqlx::Error::Io(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::Tls(_)
    )
}

/// Decode one row into a JSON object keyed by column name.
///
/// The planner writes arbitrary SELECT lists, so columns are decoded by
/// runtime type name rather than a compile-time row struct. Types outside
/// the known set fall back to their text representation.
fn row_to_json(row: &PgRow) -> Result<Value, sqlx::Error> {
    let mut object = Map::with_capacity(row.columns().len());

    for (idx, column) in row.columns().iter().enumerate() {
        let type_name = column.type_info().name().to_uppercase();
        let value = match type_name.as_str() {
            "INT2" => row
                .try_get::<Option<i16>, _>(idx)?
                .map(|v| json!(v))
                .unwrap_or(Value::Null),
            "INT4" => row
                .try_get::<Option<i32>, _>(idx)?
                .map(|v| json!(v))
                .unwrap_or(Value::Null),
            "INT8" => row
                .try_get::<Option<i64>, _>(idx)?
                .map(|v| json!(v))
                .unwrap_or(Value::Null),
            "FLOAT4" => row
                .try_get::<Option<f32>, _>(idx)?
                .map(|v| json!(v))
                .unwrap_or(Value::Null),
            "FLOAT8" => row
                .try_get::<Option<f64>, _>(idx)?
                .map(|v| json!(v))
                .unwrap_or(Value::Null),
            "NUMERIC" => row
                .try_get::<Option<Decimal>, _>(idx)?
                .map(decimal_to_json)
                .unwrap_or(Value::Null),
            "BOOL" => row
                .try_get::<Option<bool>, _>(idx)?
                .map(|v| json!(v))
                .unwrap_or(Value::Null),
            "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" => row
                .try_get::<Option<String>, _>(idx)?
                .map(Value::String)
                .unwrap_or(Value::Null),
            _ => match row.try_get::<Option<String>, _>(idx) {
                Ok(v) => v.map(Value::String).unwrap_or(Value::Null),
                Err(_) => {
                    tracing::warn!(
                        "column '{}' has undecodable type {}, emitting null",
                        column.name(),
                        type_name
                    );
                    Value::Null
                }
            },
        };
        object.insert(column.name().to_string(), value);
    }

    Ok(Value::Object(object))
}

/// Whole-number decimals (prices) become JSON integers, everything else a
/// float, falling back to text when out of f64 range.
fn decimal_to_json(d: Decimal) -> Value {
    let text = d.normalize().to_string();
    if let Ok(i) = text.parse::<i64>() {
        return json!(i);
    }
    if let Ok(f) = text.parse::<f64>() {
        if f.is_finite() {
            return json!(f);
        }
    }
    Value::String(text)
}
