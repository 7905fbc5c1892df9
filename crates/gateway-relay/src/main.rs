//! gateway-relay - chat gateway to host bridge relay
//!
//! Opens one gateway session with the given token and writes every inbound
//! message as a JSON line to the host bridge socket (or stdout).

use clap::Parser;
use gateway_proto::IdentifyPayload;
use gateway_relay::{EventSink, GatewayClient, LineSink, RelayConfig, TokenSource};
use std::path::PathBuf;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser)]
#[command(name = "gateway-relay")]
#[command(about = "Relay chat gateway events to a host bridge")]
#[command(version)]
struct Cli {
    /// Host bridge socket path
    bridge: PathBuf,

    /// Account token
    #[arg(env = "GATEWAY_RELAY_TOKEN", required_unless_present = "token_file")]
    token: Option<String>,

    /// Read the token from a file (takes precedence over TOKEN)
    #[arg(long)]
    token_file: Option<PathBuf>,

    /// Path to a JSON config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Gateway WebSocket URL (overrides the config file)
    #[arg(long, env = "GATEWAY_RELAY_URL")]
    gateway_url: Option<String>,

    /// Write events to stdout instead of the bridge socket
    #[arg(long)]
    stdout: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env().add_directive("gateway_relay=info".parse()?))
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => RelayConfig::from_file(path)?,
        None => RelayConfig::default(),
    };
    if let Some(url) = cli.gateway_url {
        config.gateway_url = url;
        config.validate()?;
    }

    let token_source = match (cli.token, cli.token_file) {
        (_, Some(path)) => TokenSource::File(path),
        (Some(token), None) => TokenSource::Explicit(token),
        (None, None) => anyhow::bail!("a token or --token-file is required"),
    };
    let payload = IdentifyPayload::new(token_source.resolve()?, config.client.clone());

    info!(
        gateway = %config.gateway_url,
        sink = if cli.stdout { "stdout" } else { "bridge" },
        "starting gateway-relay"
    );

    if cli.stdout {
        run_session(&config, &payload, &LineSink::stdout()).await
    } else {
        run_bridge(&config, &payload, &cli.bridge).await
    }
}

#[cfg(unix)]
async fn run_bridge(
    config: &RelayConfig,
    payload: &IdentifyPayload,
    bridge: &std::path::Path,
) -> anyhow::Result<()> {
    let sink = LineSink::bridge(bridge).await?;
    run_session(config, payload, &sink).await
}

#[cfg(not(unix))]
async fn run_bridge(
    _config: &RelayConfig,
    _payload: &IdentifyPayload,
    _bridge: &std::path::Path,
) -> anyhow::Result<()> {
    anyhow::bail!("the bridge socket needs a unix platform; use --stdout")
}

async fn run_session<K: EventSink>(
    config: &RelayConfig,
    payload: &IdentifyPayload,
    sink: &K,
) -> anyhow::Result<()> {
    let client = GatewayClient::new(config.client_options());

    let shutdown = client.shutdown_token();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("interrupt received, closing session");
                shutdown.cancel();
            }
            Err(e) => warn!(error = %e, "failed to listen for interrupt"),
        }
    });

    match client.start(&config.gateway_url, payload, sink).await {
        Ok(reason) => {
            info!(%reason, "gateway session finished");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, phase = %client.phase(), "gateway session failed");
            anyhow::bail!("{e}")
        }
    }
}
