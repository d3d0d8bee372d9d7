//! code-server proxy
//!
//! Fronts many code-server instances, each bound to its own local port,
//! under a single public address.
//!
//! # Architecture Overview
//!
//! ```text
//!                        ┌──────────────────────────────────────────────┐
//!                        │                  PROXY                       │
//!   Client request       │  ┌────────┐   ┌────────────┐   ┌──────────┐  │
//!   ─────────────────────┼─▶│  http  │──▶│  routing   │──▶│ forward  │──┼──▶ code-server :port
//!                        │  │ server │   │  registry  │   │ / tunnel │  │
//!                        │  └───┬────┘   └─────┬──────┘   └──────────┘  │
//!                        │      │              │                        │
//!                        │      ▼              ▼                        │
//!                        │  ┌────────┐   ┌────────────┐                 │
//!                        │  │ health │   │  backend   │                 │
//!                        │  │ status │   │ store file │                 │
//!                        │  └────────┘   └────────────┘                 │
//!                        └──────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use code_server_proxy::config::validation::validate_config;
use code_server_proxy::config::{load_config, ConfigError, LogFormat, ProxyConfig};
use code_server_proxy::lifecycle::{self, signals, Shutdown};
use code_server_proxy::observability::{logging, metrics};

#[derive(Parser, Debug)]
#[command(name = "code-server-proxy", version, about = "Reverse proxy for code-server instances")]
struct Cli {
    /// Proxy config file (TOML). Defaults apply when omitted.
    #[arg(short, long, env = "CONFIG")]
    config: Option<PathBuf>,

    /// Listen address, overrides the config file.
    #[arg(long, env = "BIND")]
    bind: Option<String>,

    /// Backend set file, overrides the config file.
    #[arg(long, env = "BACKENDS_FILE")]
    backends: Option<PathBuf>,

    /// Log output format, overrides the config file.
    #[arg(long, env = "LOG_FORMAT", value_enum)]
    log_format: Option<LogFormat>,
}

impl Cli {
    fn into_config(self) -> Result<ProxyConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => load_config(path)?,
            None => ProxyConfig::default(),
        };
        if let Some(bind) = self.bind {
            config.listener.bind_address = bind;
        }
        if let Some(file) = self.backends {
            config.backends.file = file.to_string_lossy().into_owned();
        }
        if let Some(format) = self.log_format {
            config.observability.log_format = format;
        }
        validate_config(&config).map_err(ConfigError::Validation)?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Cli::parse().into_config()?;

    logging::init(config.observability.log_format)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "code-server-proxy starting");

    if config.observability.metrics_enabled {
        let addr: SocketAddr = config.observability.metrics_address.parse()?;
        metrics::init_metrics(addr)?;
    }

    tracing::info!(
        bind_address = %config.listener.bind_address,
        backends_file = %config.backends.file,
        backend_host = %config.backends.host,
        fallback = ?config.routing.fallback,
        "Configuration loaded"
    );

    let bootstrap = lifecycle::prepare(&config)?;
    let listener = TcpListener::bind(&config.listener.bind_address).await?;

    let shutdown = Shutdown::new();
    signals::spawn_signal_handler(shutdown.clone());

    let lifecycle::Bootstrap {
        registry,
        server,
        persister,
    } = bootstrap;
    drop(registry);

    server.run(listener, shutdown.subscribe()).await?;

    if let Err(e) = persister.await {
        tracing::error!(error = %e, "Persister task failed");
    }
    tracing::info!("Shutdown complete");
    Ok(())
}
