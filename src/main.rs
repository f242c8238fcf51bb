use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

mod catalog;
mod errors;
mod llm;
mod model;
mod pipeline;
mod routes;
mod runtime;
mod safety;
mod state;
mod tools;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("listingd=info,tower_http=info")),
        )
        .init();

    // Shared services are built once here and injected; teardown is the
    // process exit dropping the pool.
    let app_state = state::AppState::init().await?;
    let addr = app_state.config.bind_addr.clone();

    let app = routes::routes()
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(app_state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    println!("🏙️ listingd running at http://{}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}
