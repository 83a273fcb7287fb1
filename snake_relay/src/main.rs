// CLI entry point for the snake relay.
//
// Starts a standalone relay server that game clients connect to. The relay
// pairs players and forwards their commands; it never runs the game. See
// `server.rs` for the networking architecture and `dispatcher.rs` for the
// session rules.
//
// Configuration is layered: built-in defaults, then an optional JSON file
// (`--config`), then individual flags. Logging goes through `env_logger`;
// `RUST_LOG` overrides the level chosen here.

use std::path::PathBuf;
use std::process::ExitCode;
use std::thread;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use log::{error, info};

use snake_relay::config::{RelayConfig, TransportKind};
use snake_relay::server::start_relay;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum TransportArg {
    Tcp,
    Udp,
}

impl From<TransportArg> for TransportKind {
    fn from(arg: TransportArg) -> Self {
        match arg {
            TransportArg::Tcp => TransportKind::Tcp,
            TransportArg::Udp => TransportKind::Udp,
        }
    }
}

/// Two-player snake matchmaking relay.
#[derive(Parser, Debug)]
#[command(name = "relay", version, about)]
struct Args {
    /// JSON config file; flags below override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Address to bind.
    #[arg(long)]
    host: Option<String>,

    /// Listen port (default: 7777).
    #[arg(long)]
    port: Option<u16>,

    /// Transport to listen on.
    #[arg(long, value_enum)]
    transport: Option<TransportArg>,

    /// Seat TCP clients on connect (lobby clients) instead of waiting for JOIN.
    #[arg(long)]
    auto_join: bool,

    /// Disconnect TCP clients silent for this many seconds (0 = never).
    #[arg(long)]
    idle_timeout_secs: Option<u64>,

    /// Log per-frame traffic.
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    let config = match build_config(&args) {
        Ok(config) => config,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let (_handle, addr) = match start_relay(config) {
        Ok(result) => result,
        Err(e) => {
            error!("failed to start relay: {e}");
            return ExitCode::FAILURE;
        }
    };

    info!("relay running on {addr}; stop with Ctrl+C");

    // The relay threads do all the work. SIGINT/SIGTERM end the process,
    // which closes every socket with it.
    loop {
        thread::sleep(Duration::from_secs(60));
    }
}

fn build_config(args: &Args) -> Result<RelayConfig, snake_relay::RelayError> {
    let mut config = match &args.config {
        Some(path) => RelayConfig::from_json_file(path)?,
        None => RelayConfig::default(),
    };
    if let Some(host) = &args.host {
        config.host = host.clone();
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(transport) = args.transport {
        config.transport = transport.into();
    }
    if args.auto_join {
        config.auto_join = true;
    }
    if let Some(secs) = args.idle_timeout_secs {
        config.idle_timeout_secs = Some(secs);
    }
    Ok(config)
}
