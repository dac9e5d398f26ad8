use anyhow::Result;
use convo_console::create_app;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown requested");
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).with_target(false).init();

    let (state, app) = create_app().await?;
    let addr = format!("{}:{}", state.config.server.host, state.config.server.port);
    info!(addr = %addr, "console backend listening");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}
