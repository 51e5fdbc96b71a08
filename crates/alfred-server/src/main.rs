use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod configuration;
mod routes;
mod state;

use alfred::bootstrap::build_agent;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = configuration::Settings::new()?;
    let addr = settings.server.socket_addr()?;

    let agent = build_agent(&settings.agent).await?;
    let app = routes::configure(state::AppState::new(agent));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}
