use quiz_engine::{build_state, config::Settings, routes::build_router, telemetry};
use std::net::SocketAddr;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    telemetry::init_tracing();

    let settings = Settings::from_env();
    let state = build_state(&settings)?;
    tracing::info!(
        modules = state.registry.len(),
        content_dir = %settings.content_dir.display(),
        "content loaded"
    );
    let app = build_router(state);

    let addr: SocketAddr = format!("{}:{}", settings.host, settings.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("quiz content service listening on {}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}
