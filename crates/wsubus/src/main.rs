//! # wsubus
//!
//! Bridge binary: loads settings, serves the local bus over WebSocket, and
//! federates with the configured peers until interrupted.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use wsubus_core::{AccessPolicy, AllowAll, Bus, DenyAll, LocalBus, StaticAcl};
use wsubus_federation::{Credentials, FederationClient, PeerConfig};
use wsubus_server::{ServerConfig, ServerContext, SessionObject, WsubusServer};
use wsubus_settings::{
    AccessMode, AccessSettings, FederationSettings, PeerSettings, WsubusSettings,
};

/// ubus JSON-RPC over WebSocket.
#[derive(Parser, Debug)]
#[command(name = "wsubus", about = "ubus JSON-RPC over WebSocket bridge")]
struct Cli {
    /// Settings file (defaults to `~/.wsubus/settings.json`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Host to bind.
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (0 for auto-assign).
    #[arg(long)]
    port: Option<u16>,

    /// Peer bridge to federate with (repeatable).
    #[arg(long = "peer", value_name = "URL")]
    peers: Vec<String>,

    /// Log filter directive (e.g. `debug`, `wsubus_server=trace`).
    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    /// Layer command-line flags over loaded settings.
    fn apply(self, settings: &mut WsubusSettings) {
        if let Some(host) = self.host {
            settings.server.host = host;
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(level) = self.log_level {
            settings.logging.level = level;
        }
        settings
            .federation
            .peers
            .extend(self.peers.into_iter().map(PeerSettings::new));
    }
}

fn access_policy(access: &AccessSettings) -> Arc<dyn AccessPolicy> {
    match access.mode {
        AccessMode::AllowAll => Arc::new(AllowAll),
        AccessMode::DenyAll => Arc::new(DenyAll),
        AccessMode::Acl => Arc::new(StaticAcl::new(access.rules.clone())),
    }
}

fn peer_configs(federation: &FederationSettings, max_inflight: usize) -> Vec<PeerConfig> {
    federation
        .peers
        .iter()
        .map(|peer| PeerConfig {
            credentials: Credentials::new(
                peer.username.as_deref().unwrap_or(&federation.username),
                peer.password.as_deref().unwrap_or(&federation.password),
            ),
            max_inflight,
            reconnect_interval: Duration::from_millis(federation.reconnect_interval_ms),
            ..PeerConfig::new(peer.url.clone())
        })
        .collect()
}

fn load(cli: Cli) -> Result<WsubusSettings> {
    let mut settings = match &cli.config {
        Some(path) => wsubus_settings::load_settings_from_path(path)
            .with_context(|| format!("failed to load settings from {}", path.display()))?,
        None => wsubus_settings::load_settings().context("failed to load settings")?,
    };
    cli.apply(&mut settings);
    wsubus_settings::validate(&settings).context("invalid settings")?;
    Ok(settings)
}

#[tokio::main]
async fn main() -> Result<()> {
    let settings = load(Cli::parse())?;
    wsubus_logging::init_subscriber(&settings.logging.level, settings.logging.format);

    let bus = Arc::new(LocalBus::new());
    if settings.session.enabled {
        let _ = SessionObject::new(&settings.session.username, &settings.session.password)
            .register(bus.as_ref())
            .context("failed to register session object")?;
    }

    let ctx = ServerContext::new(
        Arc::clone(&bus) as Arc<dyn Bus>,
        access_policy(&settings.access),
        ServerConfig::from_settings(&settings),
    );
    let mut server = WsubusServer::new(ctx);
    match wsubus_server::metrics::install_recorder() {
        Ok(handle) => server = server.with_metrics(handle),
        Err(e) => warn!(error = %e, "metrics disabled"),
    }

    let (addr, server_handle) = server.listen().await.context("failed to bind server")?;
    info!("wsubus listening on ws://{addr}/ws");

    let mut tasks: Vec<JoinHandle<()>> = vec![server_handle];
    for peer in peer_configs(&settings.federation, settings.rpc.max_inflight_calls) {
        info!(url = %peer.url, "federating with peer");
        let client = FederationClient::new(peer, Arc::clone(&bus) as Arc<dyn Bus>);
        tasks.push(tokio::spawn(client.run(server.shutdown().token())));
    }

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;

    info!("shutting down");
    let _ = server.shutdown().drain(tasks, None).await;
    let _ = server.context().subscriptions.clear_all();
    info!("shutdown complete");
    Ok(())
}
