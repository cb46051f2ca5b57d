use anyhow::Context;
use buywhenready::{
    agent::{OpenAiBackend, Runner, SessionService},
    runtime::{self, RuntimeState},
    shopping::{root_agent, Shop},
    AppConfig,
};
use clap::Parser;
use std::{path::PathBuf, sync::Arc};
use tokio::net::TcpListener;

#[derive(Parser)]
#[command(name = "agent-runtime")]
#[command(about = "Runs the BuyWhenReady shopping agent behind a session API")]
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
        config.runtime.port = port;
    }
    config.logging.init();
    config.validate()?;

    if config.get_llm_api_key().is_none() {
        tracing::warn!("No LLM API key configured; model calls will fail until one is set");
    }

    let shop = Shop::new(config.demo.clone());
    let runner = Runner::new(
        config.runtime.app_name.clone(),
        root_agent(&config.llm.model, &shop),
        Arc::new(OpenAiBackend::new(&config.llm)),
        Arc::new(SessionService::new()),
    )
    .with_max_steps(config.runtime.max_steps);

    let address = config.runtime_address();
    let app = runtime::router(RuntimeState::new([runner]));

    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind {}", address))?;
    tracing::info!(
        model = %config.llm.model,
        app = %config.runtime.app_name,
        "Agent runtime listening on {}",
        address
    );

    axum::serve(listener, app).await?;

    Ok(())
}
