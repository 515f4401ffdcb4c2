//! RemoteMouse host entry point.
//!
//! Loads the configuration, applies command-line overrides, selects the input
//! sink, and starts the two independent services:
//!
//! ```text
//! main()
//!  └─ load_config() + Cli overrides
//!  └─ platform_sink()         -- SendInput / CoreGraphics / XTest / logging
//!  └─ start services
//!       ├─ DiscoveryResponder (UDP background thread)
//!       └─ ws_server::run_server (Tokio accept loop, one task per session)
//! ```

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::Context;
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use rmouse_core::{
    discovery::{DiscoveryReply, DEFAULT_CAPABILITIES},
    keymap::Platform,
    protocol::messages::PROTOCOL_VERSION,
};
use rmouse_host::application::session_manager::{SessionManager, SessionSettings};
use rmouse_host::infrastructure::{
    input_emulation::platform_sink,
    network::{discovery, ws_server},
    storage::config::{self, HostConfig},
};

/// Command-line options.  Every flag overrides the config file value.
#[derive(Debug, Parser)]
#[command(name = "rmouse-host", version, about = "RemoteMouse host: accepts remote pointer and keyboard input")]
struct Cli {
    /// PIN clients must present.  An empty string disables the check.
    #[arg(long, env = "RMOUSE_PIN", hide_env_values = true)]
    pin: Option<String>,

    /// WebSocket control-channel port.
    #[arg(long)]
    port: Option<u16>,

    /// UDP discovery port.
    #[arg(long)]
    discovery_port: Option<u16>,

    /// Name shown to clients.
    #[arg(long)]
    name: Option<String>,

    /// Maximum concurrent sessions.
    #[arg(long)]
    max_connections: Option<usize>,

    /// Path to config.toml (defaults to the platform config directory).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log input actions instead of injecting them.
    #[arg(long)]
    dry_run: bool,
}

impl Cli {
    fn apply(&self, cfg: &mut HostConfig) {
        if let Some(pin) = &self.pin {
            cfg.host.pin = pin.clone();
        }
        if let Some(port) = self.port {
            cfg.network.ws_port = port;
        }
        if let Some(port) = self.discovery_port {
            cfg.network.discovery_port = port;
        }
        if let Some(name) = &self.name {
            cfg.host.name = name.clone();
        }
        if let Some(max) = self.max_connections {
            cfg.host.max_connections = max;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Level is overridden by `RUST_LOG`.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut cfg = match &cli.config {
        Some(path) => config::load_config_from(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => config::load_config().unwrap_or_else(|e| {
            warn!("using default configuration: {e}");
            HostConfig::default()
        }),
    };
    cli.apply(&mut cfg);
    cfg.validate()?;

    info!("RemoteMouse host '{}' starting", cfg.host.name);
    if cfg.host.pin.is_empty() {
        warn!("no PIN configured; any client on the network can connect");
    }

    let bind_ip: IpAddr = cfg
        .network
        .bind_address
        .parse()
        .with_context(|| format!("invalid bind address '{}'", cfg.network.bind_address))?;

    let sink = platform_sink(cli.dry_run).context("failed to initialise input injection")?;
    let manager = Arc::new(SessionManager::new(
        SessionSettings {
            pin: cfg.host.pin.clone(),
            max_sessions: cfg.host.max_connections,
            server_name: cfg.host.name.clone(),
            pointer_speed: cfg.host.pointer_speed,
            platform: Platform::current(),
            max_message_size: cfg.network.max_message_size,
        },
        sink,
    ));

    // Shutdown flag shared across all background services.
    let running = Arc::new(AtomicBool::new(true));

    // ── Discovery responder ────────────────────────────────────────────────────
    let reply = DiscoveryReply {
        name: cfg.host.name.clone(),
        ip: discovery::local_ip().to_string(),
        port: cfg.network.ws_port,
        pin_required: manager.pin_required(),
        version: PROTOCOL_VERSION.to_string(),
        capabilities: DEFAULT_CAPABILITIES.iter().map(|c| c.to_string()).collect(),
    };
    let responder = match discovery::start_discovery_responder(
        SocketAddr::new(bind_ip, cfg.network.discovery_port),
        reply,
        Arc::clone(&running),
    ) {
        Ok(responder) => Some(responder),
        Err(e) => {
            // Clients can still connect by address.
            error!("discovery disabled: {e}");
            None
        }
    };

    // ── Ctrl-C / SIGTERM handler ──────────────────────────────────────────────
    let running_clone = Arc::clone(&running);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            running_clone.store(false, Ordering::Relaxed);
        }
    });

    info!("RemoteMouse host ready.  Press Ctrl-C to exit.");

    let server_config = ws_server::ServerConfig {
        bind_addr: SocketAddr::new(bind_ip, cfg.network.ws_port),
        ping_interval: cfg.network.ping_interval(),
        ping_timeout: cfg.network.ping_timeout(),
        auth_timeout: cfg.network.auth_timeout(),
    };
    let result = ws_server::run_server(server_config, manager, Arc::clone(&running)).await;

    running.store(false, Ordering::Relaxed);
    if let Some(responder) = responder {
        tokio::task::spawn_blocking(move || responder.join())
            .await
            .ok();
    }

    info!("RemoteMouse host stopped");
    result
}
