use anyhow::{Context, Result};
use axum::http::HeaderValue;
use axum::Router;
use pixelforge_core::Config;
use pixelforge_runtime_api::ModelLoader;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::api;
use crate::state::AppState;

fn cors_layer(origins: &[String]) -> Result<CorsLayer> {
    let allow_origin = if origins.iter().any(|o| o == "*") {
        AllowOrigin::any()
    } else {
        let values = origins
            .iter()
            .map(|o| HeaderValue::from_str(o).with_context(|| format!("invalid CORS origin '{}'", o)))
            .collect::<Result<Vec<_>>>()?;
        AllowOrigin::list(values)
    };

    Ok(CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(Any)
        .allow_headers(Any))
}

/// Application with CORS and request tracing applied
pub fn router(state: Arc<AppState>) -> Result<Router> {
    let cors = cors_layer(&state.config.daemon.allowed_origins)?;
    Ok(api::routes(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http()))
}

pub async fn run_server(config: Config, loader: Arc<dyn ModelLoader>) -> Result<()> {
    let addr = format!("{}:{}", config.daemon.host, config.daemon.port);
    let state = Arc::new(AppState::new(config, loader));
    let app = router(state)?;

    tracing::info!("Starting daemon on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    axum::serve(listener, app).await?;

    Ok(())
}
