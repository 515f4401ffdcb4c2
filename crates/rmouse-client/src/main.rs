//! RemoteMouse command-line client.
//!
//! ```text
//! rmouse-client discover            -- one broadcast window, print the hosts
//! rmouse-client hosts               -- print the saved host list
//! rmouse-client connect --host IP   -- interactive remote
//! ```
//!
//! In `connect` mode every stdin line is one command:
//!
//! ```text
//! move 10 -5        click left [down|up]     key hello world
//! hotkey cmd c      scroll 0 1               ping
//! status            retry                    quit
//! ```
//!
//! State changes are printed as they happen.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use rmouse_client::infrastructure::{
    discovery::{discover_once, DiscoveryConfig},
    host_store::{HostListStore, JsonFileStore, KeyValueStore, MemoryStore},
    network::{ClientConfig, RemoteClient},
};
use rmouse_core::{
    discovery::{HostList, DEFAULT_DISCOVERY_PORT},
    keymap::MouseButton,
    protocol::{messages::DEFAULT_CONTROL_PORT, ControlMessage},
};

#[derive(Debug, Parser)]
#[command(name = "rmouse-client", version, about = "RemoteMouse client: control a host from the terminal")]
struct Cli {
    /// Do not read or write the saved host list.
    #[arg(long, global = true)]
    no_store: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Broadcast one discovery request and list the hosts that answer.
    Discover {
        #[arg(long, default_value_t = DEFAULT_DISCOVERY_PORT)]
        port: u16,
        /// Address the request is sent to.
        #[arg(long, default_value_t = IpAddr::V4(Ipv4Addr::BROADCAST))]
        broadcast: IpAddr,
        /// Reply collection window in milliseconds.
        #[arg(long, default_value_t = 3000)]
        window_ms: u64,
    },
    /// Print the saved host list.
    Hosts,
    /// Connect to a host and read commands from stdin.
    Connect {
        #[arg(long)]
        host: IpAddr,
        #[arg(long, default_value_t = DEFAULT_CONTROL_PORT)]
        port: u16,
        #[arg(long, env = "RMOUSE_PIN", hide_env_values = true, default_value = "")]
        pin: String,
    },
}

/// One parsed line of interactive input.
#[derive(Debug, PartialEq)]
enum Line {
    Send(ControlMessage),
    Status,
    Retry,
    Help,
    Quit,
}

const HELP: &str = "commands: move DX DY | click [left|right|middle] [down|up] | key TEXT | \
                    hotkey KEY... | scroll DX DY | ping | status | retry | quit";

fn parse_line(line: &str) -> Result<Line, String> {
    let line = line.trim();
    let (verb, rest) = line.split_once(' ').unwrap_or((line, ""));
    let args: Vec<&str> = rest.split_whitespace().collect();

    let msg = match verb.to_ascii_lowercase().as_str() {
        "move" | "m" => {
            let [dx, dy] = two_args::<f64>(&args)?;
            ControlMessage::Move { dx, dy }
        }
        "scroll" | "s" => {
            let [dx, dy] = two_args::<i32>(&args)?;
            ControlMessage::Scroll { dx, dy }
        }
        "click" | "c" => {
            let button = match args.first() {
                Some(name) => MouseButton::from_name(name)
                    .ok_or_else(|| format!("unknown button '{name}'"))?,
                None => MouseButton::Left,
            };
            let down = match args.get(1).map(|s| s.to_ascii_lowercase()) {
                None => None,
                Some(s) if s == "down" => Some(true),
                Some(s) if s == "up" => Some(false),
                Some(s) => return Err(format!("expected down or up, got '{s}'")),
            };
            ControlMessage::Click {
                btn: button.name().to_string(),
                down,
            }
        }
        "key" | "type" => {
            if rest.is_empty() {
                return Err("key needs text".into());
            }
            ControlMessage::Key {
                text: rest.to_string(),
            }
        }
        "hotkey" => {
            if args.is_empty() {
                return Err("hotkey needs at least one key".into());
            }
            ControlMessage::Hotkey {
                keys: args.iter().map(|k| k.to_string()).collect(),
            }
        }
        "ping" => ControlMessage::Ping,
        "status" => return Ok(Line::Status),
        "retry" => return Ok(Line::Retry),
        "help" | "?" => return Ok(Line::Help),
        "quit" | "exit" | "q" => return Ok(Line::Quit),
        "" => return Err("empty command".into()),
        other => return Err(format!("unknown command '{other}'")),
    };
    Ok(Line::Send(msg))
}

fn two_args<T: std::str::FromStr>(args: &[&str]) -> Result<[T; 2], String> {
    match args {
        [a, b] => {
            let a = a.parse().map_err(|_| format!("invalid number '{a}'"))?;
            let b = b.parse().map_err(|_| format!("invalid number '{b}'"))?;
            Ok([a, b])
        }
        _ => Err("expected two numbers".into()),
    }
}

fn host_store(disabled: bool) -> HostListStore {
    let store: Arc<dyn KeyValueStore> = if disabled {
        Arc::new(MemoryStore::new())
    } else {
        match JsonFileStore::at_default_location() {
            Ok(store) => Arc::new(store),
            Err(e) => {
                warn!("host list will not be saved: {e}");
                Arc::new(MemoryStore::new())
            }
        }
    };
    HostListStore::new(store)
}

fn print_hosts(hosts: &HostList) {
    if hosts.is_empty() {
        println!("no hosts");
        return;
    }
    for host in hosts.as_slice() {
        println!(
            "{:<24} {}:{:<6} v{}{}",
            host.name,
            host.address,
            host.port,
            host.version,
            if host.pin_required { "  (pin)" } else { "" }
        );
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
    let store = host_store(cli.no_store);

    match cli.command {
        Command::Discover {
            port,
            broadcast,
            window_ms,
        } => {
            let config = DiscoveryConfig {
                target: broadcast,
                port,
                window: Duration::from_millis(window_ms),
                ..DiscoveryConfig::default()
            };
            let found = discover_once(&config).await?;
            print_hosts(&found);

            let mut saved = store.load().unwrap_or_default();
            saved.merge(found);
            if let Err(e) = store.save(&saved) {
                warn!("failed to save host list: {e}");
            }
            Ok(())
        }
        Command::Hosts => {
            print_hosts(&store.load().context("failed to read saved hosts")?);
            Ok(())
        }
        Command::Connect { host, port, pin } => {
            run_remote(SocketAddr::new(host, port), pin, store).await
        }
    }
}

async fn run_remote(addr: SocketAddr, pin: String, store: HostListStore) -> anyhow::Result<()> {
    let client = RemoteClient::with_host_store(ClientConfig::default(), store);
    let mut transitions = client.transitions();
    client.connect(addr, pin);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    println!("{HELP}");

    loop {
        tokio::select! {
            state = transitions.recv() => match state {
                Ok(state) => {
                    let status = client.current_status();
                    match status.last_error {
                        Some(err) if !state.is_in_flight() => println!("[{state}] {err}"),
                        _ => println!("[{state}]"),
                    }
                }
                Err(RecvError::Lagged(n)) => warn!("missed {n} state changes"),
                Err(RecvError::Closed) => break,
            },
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if line.trim().is_empty() {
                    continue;
                }
                match parse_line(&line) {
                    Ok(Line::Send(msg)) => {
                        if let Err(e) = client.send(msg) {
                            println!("not sent: {e}");
                        }
                    }
                    Ok(Line::Status) => {
                        let s = client.current_status();
                        println!("{} (retries {})", s.state, s.retry_count);
                        if let Some(err) = s.last_error {
                            println!("last error: {err}");
                        }
                    }
                    Ok(Line::Retry) => client.retry()?,
                    Ok(Line::Help) => println!("{HELP}"),
                    Ok(Line::Quit) => break,
                    Err(e) => println!("{e}"),
                }
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    client.disconnect();
    info!("RemoteMouse client stopped");
    Ok(())
}
