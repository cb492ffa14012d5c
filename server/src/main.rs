use clap::Parser;
use log::{error, info};
use server::session::{ServerState, SessionServer};
use server::{config::ServerConfig, console, logging, transport};
use shared::RealmData;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Main-method of the application.
/// Parses command-line arguments, loads the configuration, then wires the
/// transport, session loop, and operator console together.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Command line arguments
    #[derive(Parser, Debug)]
    #[clap(author, version, about)]
    struct Args {
        /// Path to the configuration file
        #[clap(short, long, default_value = "server.cfg")]
        config: String,
        /// Log level filter (debug, info, error)
        #[clap(short, long, default_value = "info")]
        log_level: String,
        /// Path to the append-only log file
        #[clap(short = 'f', long, default_value = "server.log")]
        log_file: String,
    }

    let args = Args::parse();

    let level = args.log_level.parse::<log::LevelFilter>()?;
    logging::init(level, Path::new(&args.log_file))?;

    let config = ServerConfig::load(Path::new(&args.config))?;

    // Realm mutations leave through the emitter; the session loop routes
    // them to live connections.
    let (realm_tx, realm_rx) = mpsc::unbounded_channel();
    let mut realm = RealmData::new();
    realm.set_emitter(realm_tx);
    let state = Arc::new(ServerState::new(realm));

    // Failing to bind the listener is the only startup-fatal condition.
    let (transport_tx, transport_rx) = mpsc::unbounded_channel();
    let bind_addr = SocketAddr::new(config.address, config.port);
    transport::start(bind_addr, transport_tx).await?;

    let session = SessionServer::new(Arc::clone(&state), transport_rx, realm_rx);
    let session_handle = tokio::spawn(session.run());
    let console_handle = tokio::spawn(console::run(state));

    // Handle shutdown gracefully
    tokio::select! {
        result = session_handle => {
            if let Err(e) = result {
                error!("session loop panicked: {}", e);
            }
        }
        result = console_handle => {
            if let Err(e) = result {
                error!("console task panicked: {}", e);
            }
            info!("operator requested shutdown");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("received Ctrl+C, shutting down gracefully");
        }
    }

    Ok(())
}
