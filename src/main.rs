use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use clap::Parser;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use studyabroad::config::{Cli, Config};
use studyabroad::geocode::NominatimGeocoder;
use studyabroad::state::AppState;
use studyabroad::storage::LocalStorage;
use studyabroad::{db, email, routes};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Parse CLI args and load config
    let cli = Cli::parse();
    let data_dir = Config::data_dir(&cli);
    std::fs::create_dir_all(&data_dir)?;
    tracing::info!("Data directory: {}", data_dir.display());

    let config = Config::load(&cli)?;

    // Ensure uploads directory exists
    std::fs::create_dir_all(config.uploads_path())?;

    // Initialize database
    let pool = db::create_pool(config.db_path())?;
    db::run_migrations(&pool)?;

    // Build app state
    let state = AppState {
        db: pool,
        storage: Arc::new(LocalStorage::new(config.uploads_path().clone())),
        geocoder: Arc::new(NominatimGeocoder::new(&config.geocoder)),
        mailer: email::build_mailer(&config.email),
        config: config.clone(),
    };

    // Build router
    let app = Router::new()
        .route("/", get(routes::home::landing))
        .nest_service("/uploads", ServeDir::new(config.uploads_path()))
        .nest_service("/assets", ServeDir::new("assets"))
        .merge(routes::schools::router())
        .merge(routes::reviews::router())
        .merge(routes::users::router())
        .merge(routes::ranking::router())
        .merge(routes::inquiry::router())
        .merge(routes::auth::router())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Start server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    tracing::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
