use clap::Parser;
use me_config::{ClientConfig, ClientConfigStore};
use me_connector::auth::{resolve_api_key, resolve_base_url};
use me_connector::{Connector, HttpForwarder, Transport, WsForwarder};
use tokio::io::BufReader;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Bridge a local stdio MCP client to a hosted instance.
#[derive(Parser)]
#[command(name = "connector", version)]
struct Cli {
    /// Id of the hosted instance to bridge to
    target_id: Option<String>,

    /// Keep one WebSocket open instead of one HTTP request per call
    #[arg(long)]
    ws: bool,

    /// Override the remote base URL
    #[arg(long)]
    base_url: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout is protocol traffic; everything else goes to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let Some(target_id) = cli.target_id else {
        eprintln!("Usage: connector <TARGET_ID> [--ws] [--base-url <URL>]");
        std::process::exit(1);
    };

    let config = match ClientConfigStore::new() {
        Ok(store) => store.load(),
        Err(e) => {
            warn!("Could not locate config directory: {}", e);
            ClientConfig::default()
        }
    };

    let base_url = resolve_base_url(cli.base_url, &config);
    let api_key = resolve_api_key(&target_id, &config);
    if api_key.is_none() {
        warn!(
            "No API key resolved for '{}', sending unauthenticated requests",
            target_id
        );
    }

    let transport = if cli.ws {
        Transport::Ws(WsForwarder::new(&base_url, &target_id, api_key))
    } else {
        Transport::Http(HttpForwarder::new(&base_url, &target_id, api_key)?)
    };
    let connector = Connector::new(transport);

    let stdin = BufReader::new(tokio::io::stdin());
    let mut stdout = tokio::io::stdout();

    tokio::select! {
        result = connector.run(stdin, &mut stdout) => {
            result?;
        }
        signal = shutdown_signal() => {
            info!("Received {}, exiting", signal);
        }
    }

    connector.close().await;
    Ok(())
}

/// Resolves when SIGINT or SIGTERM arrives.
async fn shutdown_signal() -> &'static str {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(stream) => stream,
            Err(_) => {
                let _ = tokio::signal::ctrl_c().await;
                return "SIGINT";
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => "SIGINT",
            _ = sigterm.recv() => "SIGTERM",
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        "ctrl-c"
    }
}
