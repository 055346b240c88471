//! Session Gate server
//!
//! Connects to Postgres, activates the auth plugin and serves its routes.
//! Reads `DATABASE_URL` (required) and `PORT` (default: 3000).

use session_gate::{AuthPlugin, Plugin};
use sqlx::PgPool;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer())
        .init();

    let database_url = std::env::var("DATABASE_URL")
        .map_err(|_| "DATABASE_URL environment variable must be set")?;
    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3000);

    let pool = PgPool::connect(&database_url).await?;

    let plugin = AuthPlugin::new();
    plugin.activate(pool).await?;

    let app = plugin
        .router()
        .await
        .ok_or("auth plugin did not provide routes")?
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    tracing::info!(port, "Server listening");
    axum::serve(listener, app).await?;

    Ok(())
}
