use anyhow::Context;
use buywhenready::{
    frontend::{self, FrontendState},
    AppConfig,
};
use clap::Parser;
use std::path::PathBuf;
use tokio::net::TcpListener;

#[derive(Parser)]
#[command(name = "frontend")]
#[command(about = "Chat frontend for the BuyWhenReady shopping agent")]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = AppConfig::load_with_env_overrides(args.config.as_ref())?;
    if let Some(port) = args.port {
        config.frontend.port = port;
    }
    config.logging.init();
    config.validate()?;

    let state = FrontendState::new(&config.frontend, &config.demo)?;
    let address = config.frontend_address();
    let app = frontend::router(state);

    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind {}", address))?;
    tracing::info!(
        auth = %config.frontend.auth_server_url,
        runtime = %config.frontend.runtime_url,
        "Frontend listening on {}",
        address
    );

    axum::serve(listener, app).await?;

    Ok(())
}
