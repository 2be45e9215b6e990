//! Palisade server binary.

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use palisade_server::{build_state, routes, ServerConfig};

/// Edge policy proxy for GraphQL.
#[derive(Debug, Parser)]
#[command(name = "palisade-server", version)]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long, env = "PALISADE_CONFIG")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = ServerConfig::from_file(&args.config)?;
    config.apply_env_overrides();

    let filter = config
        .log_filter
        .clone()
        .unwrap_or_else(|| "palisade_server=info,palisade_core=info".to_string());
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Palisade v{}", env!("CARGO_PKG_VERSION"));

    config.validate()?;
    let state = build_state(&config)?;
    let app = routes::router(state);

    let address = config.listen.address();
    let listener = tokio::net::TcpListener::bind(&address).await?;
    tracing::info!(
        address = %address,
        origin = %config.proxy.origin_url,
        mode = ?config.mode,
        "listening"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
