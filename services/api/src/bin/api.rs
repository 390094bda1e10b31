//! services/api/src/bin/api.rs

use axum::http::{header::{ACCEPT, CONTENT_TYPE}, HeaderName, HeaderValue, Method};
use axum::Router;
use poc_api_lib::{
    adapters::PocketBaseAdapter,
    config::{Config, ConfigError},
    error::ApiError,
    web::{router, ApiDoc, AppState},
};
use poc_portal_core::{PortalService, RecordStore, SystemClock};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");
    info!(
        backend = %config.backend.base_url,
        service_account = %config.backend.admin_email,
        shared_secret = if config.shared_secret.is_some() { "SET" } else { "NOT SET" },
        "Backend settings"
    );

    // --- 2. Initialize the Record Store Adapter ---
    let store = Arc::new(PocketBaseAdapter::new(config.backend.clone())?);
    match store.health().await {
        Ok(()) => info!("Backend reachable"),
        // The API still starts; every request will surface the backend error itself.
        Err(e) => warn!("Backend connectivity check failed: {}", e),
    }

    // --- 3. Build the Shared AppState ---
    let service = PortalService::new(store, Arc::new(SystemClock))
        .with_link_page_size(config.link_page_size);
    let app_state = Arc::new(AppState::new(service, config.clone()));

    // --- 4. Create the Web Router ---
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, ACCEPT, HeaderName::from_static("x-api-key")]);
    let cors = match config.cors_origin.as_deref() {
        Some(origin) => cors.allow_origin(origin.parse::<HeaderValue>().map_err(|e| {
            ConfigError::InvalidValue("CORS_ORIGIN".to_string(), e.to_string())
        })?),
        None => cors.allow_origin(Any),
    };

    // Merge the API router with the Swagger UI router for a complete application.
    let app = Router::new()
        .merge(router(app_state).layer(cors))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // --- 5. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
