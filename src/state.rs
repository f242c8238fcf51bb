use std::sync::Arc;

use anyhow::{Context, Result};

use crate::catalog::{seed, Catalog, PgCatalog};
use crate::llm;
use crate::runtime::executor::Executor;
use crate::runtime::toolport::ToolRegistry;
use crate::tools::sql_query::SqlQueryTool;

/// Service knobs, all env-overridable with sensible defaults.
#[derive(Clone, Debug)]
pub struct ServiceConfig {
    pub bind_addr: String,
    pub request_timeout_secs: u64,
    pub max_iterations: usize,
    pub default_row_cap: usize,
}

impl ServiceConfig {
    pub fn from_env() -> Self {
        Self {
            bind_addr: env_or("LISTINGD_ADDR", "0.0.0.0:5000"),
            request_timeout_secs: env_parse("LISTINGD_REQUEST_TIMEOUT_SECS", 45),
            max_iterations: env_parse("LISTINGD_MAX_ITERATIONS", 12),
            default_row_cap: env_parse("LISTINGD_ROW_CAP", 12),
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Process-wide services, constructed once at startup and injected into
/// request handlers. Nothing here is reachable as an ambient global.
#[derive(Clone)]
pub struct AppState {
    pub executor: Arc<Executor>,
    pub catalog: Arc<dyn Catalog>,
    pub config: ServiceConfig,
}

impl AppState {
    pub async fn init() -> Result<Self> {
        let config = ServiceConfig::from_env();

        let database_url = std::env::var("DATABASE_URL")
            .context("DATABASE_URL environment variable is missing")?;
        let pg = PgCatalog::connect(&database_url)
            .await
            .context("failed to connect to the property catalog")?;
        tracing::info!("Database connection established");

        // The catalog collaborator owns schema and sample data; disable with
        // LISTINGD_SEED=0 when pointing at a managed database.
        if env_or("LISTINGD_SEED", "1") != "0" {
            seed::init_schema(pg.pool())
                .await
                .context("schema initialization failed")?;
            seed::populate_if_sparse(pg.pool())
                .await
                .context("sample data population failed")?;
        }

        let catalog: Arc<dyn Catalog> = Arc::new(pg);

        let llm = llm::build_llm_from_env()?;

        let mut registry = ToolRegistry::new();
        registry.register(SqlQueryTool::new(catalog.clone()));
        tracing::info!("Registered tools: {}", registry.list_tools().join(", "));

        let executor = Arc::new(Executor::new(
            llm,
            Arc::new(registry),
            config.max_iterations,
            config.default_row_cap,
        ));

        Ok(Self {
            executor,
            catalog,
            config,
        })
    }
}
