use anyhow::Context;
use clap::Parser;
use portal_fns::config::PortalConfig;
use portal_fns::utils::{logger, validation::Validate};

#[derive(Parser)]
#[command(name = "portal-server")]
#[command(about = "Serve the portal functions over HTTP for local development")]
struct Args {
    /// TOML configuration file; the environment is used when omitted
    #[arg(short, long)]
    config: Option<String>,

    /// Override server.port
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    logger::init_server_logger();

    let mut config = match &args.config {
        Some(path) => {
            tracing::info!("📁 Loading configuration from: {}", path);
            PortalConfig::from_file(path)
                .with_context(|| format!("failed to load config file '{}'", path))?
        }
        None => PortalConfig::from_env().context("failed to read configuration from environment")?,
    };

    if let Some(port) = args.port {
        config.server.port = port;
    }

    if let Err(e) = config.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
        return Err(e.into());
    }

    portal_fns::server::serve(config).await?;
    Ok(())
}
