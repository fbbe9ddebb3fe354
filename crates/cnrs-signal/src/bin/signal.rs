//! cnrs Signal Server
//!
//! Assigns tunnel addresses to peers joining a room and relays room events.
//!
//! # Usage
//!
//! ```bash
//! # In-memory mode (default)
//! cnrs-signal --port 8080
//!
//! # With SQLite persistence
//! cnrs-signal --port 8080 --db /var/lib/cnrs/signal.db
//!
//! # Print a sample configuration
//! cnrs-signal --print-config
//! ```

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cnrs_core::{Config, SystemClock};
use cnrs_signal::{
    BroadcastHub, ListStore, MemoryStore, RequestHandler, RoomCoordinator, SignalServer,
    SqliteStore,
};

#[derive(Parser, Debug)]
#[command(name = "cnrs-signal")]
#[command(about = "cnrs signaling server for tunnel address assignment")]
#[command(version)]
struct Args {
    /// Config file (defaults to the platform config directory)
    #[arg(short, long, env = "CNRS_CONFIG")]
    config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Bind address
    #[arg(short, long)]
    bind: Option<IpAddr>,

    /// SQLite database path for persistence (uses in-memory if not specified)
    #[arg(short, long, env = "CNRS_DB")]
    db: Option<PathBuf>,

    /// Print a sample configuration and exit
    #[arg(long)]
    print_config: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(Level::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let args = Args::parse();

    if args.print_config {
        print!("{}", Config::sample());
        return Ok(());
    }

    let mut config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load(),
    };
    if let Some(port) = args.port {
        config.signal.port = port;
    }
    if let Some(bind) = args.bind {
        config.signal.bind = bind;
    }
    if args.db.is_some() {
        config.signal.db_path = args.db.clone();
    }
    config.validate()?;

    let addr = SocketAddr::new(config.signal.bind, config.signal.port);

    info!("Starting cnrs Signal Server");
    info!(
        "Room capacity {}, inactivity threshold {}s, block {}.{}.0.0/16",
        config.room.capacity,
        config.room.inactivity_threshold_secs,
        config.room.address_prefix[0],
        config.room.address_prefix[1]
    );

    // Initialize storage
    let store: Arc<dyn ListStore> = if let Some(db_path) = &config.signal.db_path {
        // Create parent directory if it doesn't exist
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        info!("Using SQLite persistence: {:?}", db_path);
        let store = SqliteStore::open(db_path)?;
        info!(
            "Loaded {} rooms with {} peers from database",
            store.room_count().unwrap_or(0),
            store.total_peer_count().unwrap_or(0)
        );
        Arc::new(store)
    } else {
        info!("Using in-memory storage (no persistence)");
        Arc::new(MemoryStore::new())
    };

    info!("Room store backend: {}", store.name());

    let hub = Arc::new(BroadcastHub::new());
    let coordinator = RoomCoordinator::new(
        store,
        hub.clone(),
        Arc::new(SystemClock),
        &config.room,
    );
    let handler = Arc::new(RequestHandler::new(Arc::new(coordinator)));

    let server = SignalServer::new(handler, hub);
    server.serve(addr).await?;

    Ok(())
}
