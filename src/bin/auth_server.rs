use anyhow::Context;
use buywhenready::{
    auth::{server, AuthServerState},
    AppConfig,
};
use clap::Parser;
use std::path::PathBuf;
use tokio::net::TcpListener;

#[derive(Parser)]
#[command(name = "auth-server")]
#[command(about = "Demo Kite login server: email, OTP and agent configuration")]
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
        config.auth.port = port;
    }
    config.logging.init();
    config.validate()?;

    let address = config.auth_address();
    let app = server::router(AuthServerState::new(config.auth));

    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind {}", address))?;
    tracing::info!("Auth server listening on {}", address);

    axum::serve(listener, app).await?;

    Ok(())
}
