mod api;
mod arrivals;
mod config;
mod prefs;
mod presentation;
mod providers;
mod regions;
mod store;
mod sync;

use std::path::Path;
use std::sync::Arc;

use axum::http::{header, HeaderValue, Method};
use sqlx::sqlite::SqlitePoolOptions;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_axum::router::OpenApiRouter;
use utoipa_axum::routes;
use utoipa_swagger_ui::SwaggerUi;

use api::{ApiDoc, AppState};
use config::Config;
use providers::oba::ObaClient;
use sync::SyncManager;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "busboard=debug,tower_http=debug,axum::rejection=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting busboard rider information server");

    let config_path =
        std::env::var("BUSBOARD_CONFIG").unwrap_or_else(|_| "config.yaml".to_string());
    let config = if Path::new(&config_path).exists() {
        info!(path = %config_path, "Loading config");
        Config::load(&config_path)?
    } else {
        info!(path = %config_path, "No config file found, using defaults");
        serde_yaml::from_str("{}")?
    };

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;

    let client = Arc::new(ObaClient::new(config.api_key.clone())?);

    // Region sync: schema, initial load, then the periodic refresh loop.
    let sync_manager = Arc::new(SyncManager::new(pool.clone(), client.clone(), &config));
    sync_manager.init_schema().await?;
    let regions = sync_manager.region_snapshot();
    tokio::spawn(sync_manager.start());

    let state = AppState {
        pool,
        regions,
        client,
        config: Arc::new(config.clone()),
    };

    // Configure CORS
    let cors = if config.cors_permissive {
        CorsLayer::new().allow_origin(Any)
    } else {
        let origins: Vec<HeaderValue> = config
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new().allow_origin(origins)
    }
    .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
    .allow_headers([header::CONTENT_TYPE]);

    // Build router
    let (app, openapi) = OpenApiRouter::with_openapi(ApiDoc::openapi())
        .routes(routes!(api::arrivals::get_stop_arrivals))
        .routes(routes!(api::regions::list_regions))
        .routes(routes!(api::regions::find_closest_region))
        .routes(routes!(
            api::preferences::get_preferences,
            api::preferences::put_preferences
        ))
        .routes(routes!(
            api::favorites::list_favorites,
            api::favorites::add_favorite,
            api::favorites::remove_favorite
        ))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .split_for_parts();

    let app = app.merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", openapi));

    // Start server
    info!(addr = %config.listen_addr, "Listening");
    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;

    axum::serve(listener, app).await?;

    Ok(())
}
