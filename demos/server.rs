//! Reference WebSocket server.
//!
//! Demonstrates:
//! - Building a transport with the default backend probe
//! - Subscribing to transport and socket events
//! - Echoing messages back through the socket
//! - Serving `/ws` and a static index page on one port
//!
//! Usage:
//!   cargo run --example server
//!   cargo run --example server -- --debug
//!   cargo run --example server -- --port 9000
//!   cargo run --example server -- --backend-upgrade --pull

// ============================================================================
// Imports
// ============================================================================

use std::net::{IpAddr, Ipv4Addr};

use tracing_subscriber::EnvFilter;
use ws_transport::backend::{callback, pull};
use ws_transport::{Dispatcher, Payload, Result, Server, Transport, UpgradeMode};

// ============================================================================
// Constants
// ============================================================================

const DEFAULT_PORT: u16 = 8000;

// ============================================================================
// Args
// ============================================================================

#[derive(Debug, Clone)]
struct Args {
    debug: bool,
    port: u16,
    backend_upgrade: bool,
    pull: bool,
}

impl Args {
    fn parse() -> Self {
        let args: Vec<String> = std::env::args().collect();
        let port = args
            .iter()
            .position(|a| a == "--port")
            .and_then(|i| args.get(i + 1))
            .and_then(|p| p.parse().ok())
            .unwrap_or(DEFAULT_PORT);

        Self {
            debug: args.iter().any(|a| a == "--debug"),
            port,
            backend_upgrade: args.iter().any(|a| a == "--backend-upgrade"),
            pull: args.iter().any(|a| a == "--pull"),
        }
    }
}

fn init_logging(debug: bool) {
    let filter = if debug {
        "ws_transport=debug"
    } else {
        "ws_transport=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .init();
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logging(args.debug);

    if let Err(e) = run(args).await {
        eprintln!("\n[ERROR] {e}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    let transport = if args.pull {
        Transport::builder().backend(pull::FACTORY).build()?
    } else {
        Transport::builder()
            .backend(callback::FACTORY)
            .backend(pull::FACTORY)
            .build()?
    };

    println!("[Transport] backend: {}", transport.backend_name());

    transport.on_open(|socket| {
        let id = socket.id();
        println!("socket[{id}] open");

        let echo = socket.clone();
        socket.on_message(move |payload| {
            println!("socket[{id}] message: {payload}");
            let reply = match payload {
                Payload::Json(value) => echo.send(value.clone()),
                Payload::Text(text) => echo.send(text.clone()),
                Payload::Binary(data) => echo.send(data.clone()),
            };
            if let Err(e) = reply {
                println!("socket[{id}] echo skipped: {e}");
            }
        });
        socket.on_close(move |reason| println!("socket[{id}] close: {reason}"));
    });

    transport.on_message(|payload| println!("connection message: {payload}"));
    transport.on_close(|reason| println!("connection close: {reason}"));

    let mode = if args.backend_upgrade {
        UpgradeMode::Backend
    } else {
        UpgradeMode::Server
    };

    let server = Server::builder()
        .bind(IpAddr::V4(Ipv4Addr::UNSPECIFIED), args.port)
        .upgrade_mode(mode)
        .dispatcher(Dispatcher::standard(transport))
        .build()
        .await?;

    println!("[Server] listening on {} ({mode:?} upgrade)", server.ws_url("/ws"));
    println!("Press Ctrl+C to exit...");

    tokio::signal::ctrl_c().await?;
    server.shutdown().await;

    Ok(())
}
