pub mod postgres;
pub mod seed;

use async_trait::async_trait;
use serde_json::Value;

pub use postgres::PgCatalog;

/// Errors surfaced by the catalog accessor.
///
/// Connection errors are transient and already retried inside the accessor;
/// when one escapes it means the retry budget is exhausted. Execution errors
/// (bad SQL, unknown column) are not retried - the planner may reformulate.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("catalog connection failed: {0}")]
    Connection(String),
    #[error("query execution failed: {0}")]
    Execution(String),
}

/// Read-only query execution capability over the listings catalog.
///
/// The accessor owns connection discipline (pooling, retry, backoff) and the
/// row wire shape. It does NOT decide what is safe to run - every query it
/// receives has already passed the safety filter.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Execute a structured query and return rows as JSON objects keyed by
    /// column name.
    async fn execute(&self, sql: &str) -> Result<Vec<Value>, CatalogError>;

    /// Cheap connectivity probe for the health endpoint.
    async fn ping(&self) -> bool;
}

/// In-memory catalog for tests: serves preset rows for any query and records
/// everything asked of it.
#[cfg(test)]
pub struct MemCatalog {
    pub rows: Vec<Value>,
    pub executed: std::sync::Mutex<Vec<String>>,
}

#[cfg(test)]
impl MemCatalog {
    pub fn with_rows(rows: Vec<Value>) -> Self {
        Self {
            rows,
            executed: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn empty() -> Self {
        Self::with_rows(Vec::new())
    }

    pub fn executed_queries(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }
}

#[cfg(test)]
#[async_trait]
impl Catalog for MemCatalog {
    async fn execute(&self, sql: &str) -> Result<Vec<Value>, CatalogError> {
        self.executed.lock().unwrap().push(sql.to_string());
        Ok(self.rows.clone())
    }

    async fn ping(&self) -> bool {
        true
    }
}
