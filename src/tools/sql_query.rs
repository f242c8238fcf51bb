use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use crate::catalog::Catalog;
use crate::runtime::toolport::{ToolError, ToolInput, ToolOutput, ToolPort};
use crate::safety::{self, Verdict};

/// The one tool the planner can call: run a read-only query against the
/// listings catalog.
///
/// Every query passes the safety filter INSIDE this tool, so there is no
/// code path from model output to the catalog that skips classification.
pub struct SqlQueryTool {
    catalog: Arc<dyn Catalog>,
}

impl SqlQueryTool {
    pub fn new(catalog: Arc<dyn Catalog>) -> Self {
        Self { catalog }
    }
}

#[async_trait]
impl ToolPort for SqlQueryTool {
    fn name(&self) -> &str {
        "sql_query"
    }

    async fn execute(&self, input: ToolInput) -> Result<ToolOutput, ToolError> {
        let sql = input
            .payload
            .get("sql")
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                ToolError::InvalidParameters("arguments must carry a non-empty 'sql' string".into())
            })?;

        match safety::classify(sql) {
            Verdict::Blocked(reason) => {
                tracing::warn!("blocked unsafe query ({}): {}", reason, sql);
                return Err(ToolError::Rejected(reason));
            }
            Verdict::Safe => {}
        }

        tracing::info!("🔍 executing catalog query: {}", sql);
        let mut rows = self.catalog.execute(sql).await?;

        let total = rows.len();
        let truncated = total > input.row_cap;
        if truncated {
            rows.truncate(input.row_cap);
        }

        Ok(ToolOutput {
            payload: json!({
                "sql": sql,
                "rows": rows,
                "row_count": total,
                "truncated": truncated,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::MemCatalog;
    use serde_json::{json, Value};

    fn input(payload: Value) -> ToolInput {
        ToolInput {
            payload,
            row_cap: 12,
        }
    }

    #[tokio::test]
    async fn safe_query_reaches_the_catalog() {
        let catalog = Arc::new(MemCatalog::with_rows(vec![json!({"id": 1})]));
        let tool = SqlQueryTool::new(catalog.clone());

        let out = tool
            .execute(input(json!({"sql": "SELECT * FROM properties LIMIT 5"})))
            .await
            .unwrap();

        assert_eq!(out.payload["row_count"], 1);
        assert_eq!(out.payload["sql"], "SELECT * FROM properties LIMIT 5");
        assert_eq!(catalog.executed_queries().len(), 1);
    }

    #[tokio::test]
    async fn blocked_query_never_reaches_the_catalog() {
        let catalog = Arc::new(MemCatalog::empty());
        let tool = SqlQueryTool::new(catalog.clone());

        let result = tool
            .execute(input(json!({"sql": "DELETE FROM properties"})))
            .await;

        assert!(matches!(result, Err(ToolError::Rejected(_))));
        assert!(catalog.executed_queries().is_empty());
    }

    #[tokio::test]
    async fn missing_sql_argument_is_invalid() {
        let tool = SqlQueryTool::new(Arc::new(MemCatalog::empty()));
        for payload in [json!({}), json!({"sql": ""}), json!({"sql": 42})] {
            let result = tool.execute(input(payload)).await;
            assert!(matches!(result, Err(ToolError::InvalidParameters(_))));
        }
    }

    #[tokio::test]
    async fn rows_are_capped_and_flagged() {
        let rows: Vec<Value> = (0..20).map(|i| json!({"id": i})).collect();
        let tool = SqlQueryTool::new(Arc::new(MemCatalog::with_rows(rows)));

        let out = tool
            .execute(input(json!({"sql": "SELECT * FROM properties"})))
            .await
            .unwrap();

        assert_eq!(out.payload["rows"].as_array().unwrap().len(), 12);
        assert_eq!(out.payload["row_count"], 20);
        assert_eq!(out.payload["truncated"], true);
    }
}
