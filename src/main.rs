mod cards;
mod config;
mod countdown;
mod db;
mod duties;
mod duty;
mod errors;
mod manager;
mod users;

use anyhow::Result;
use axum::routing::{get, get_service};
use axum::Router;
use dotenvy::EnvLoader;
use std::fs;
use tower_http::services::ServeDir;
use tracing_subscriber::EnvFilter;

use crate::config::AppConfig;

#[tokio::main]
async fn main() -> Result<()> {
    let _env = EnvLoader::new().load().unwrap_or_default();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::load();
    if let Some(tz) = &config.timezone {
        config::init_timezone(tz);
    }

    // Initialize database
    let database_url = config.database_url();
    let pool = db::init_db(&database_url).await?;
    tracing::info!("database initialized at {}", database_url);

    fs::create_dir_all("static")?;
    let static_dir = ServeDir::new("static");

    // build our application, everything lives under the duty pages
    let app = Router::new()
        .route("/", get(duties::duty_page))
        .nest("/duty", duties::router())
        .with_state(pool)
        .nest_service("/static", get_service(static_dir));

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("listening on {}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}
