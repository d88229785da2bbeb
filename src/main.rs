use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mimic::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mimic=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { config, port, host } => {
            mimic::cli::serve(config, port, host).await?;
        }
        Commands::Chat {
            config,
            model_dir,
            identity,
            persona,
            input,
        } => {
            mimic::cli::chat(config, model_dir, identity, persona, input).await?;
        }
    }

    Ok(())
}
