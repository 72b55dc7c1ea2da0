//! redlite server entry point.
//!
//! Parses the command line into the runtime configuration, loads the
//! snapshot, then accepts clients until Ctrl+C.

use anyhow::Context;
use clap::Parser;
use redlite::commands::CommandHandler;
use redlite::config::{self, Config};
use redlite::connection::{handle_connection, ConnectionStats};
use redlite::snapshot::load_snapshot;
use redlite::storage::{Keyspace, StorageEngine};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// A small Redis-compatible in-memory key-value server
#[derive(Parser, Debug)]
#[command(name = "redlite")]
#[command(version)]
struct Args {
    /// Host to bind to
    #[arg(long, default_value = redlite::DEFAULT_HOST)]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value_t = redlite::DEFAULT_PORT)]
    port: u16,

    /// Directory holding the snapshot file
    #[arg(long, default_value = config::DEFAULT_DIR)]
    dir: String,

    /// Snapshot file name
    #[arg(long, default_value = config::DEFAULT_DBFILENAME)]
    dbfilename: String,
}

impl Args {
    fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    fn runtime_config(&self) -> Config {
        Config::from_pairs([
            (config::DIR, self.dir.as_str()),
            (config::DBFILENAME, self.dbfilename.as_str()),
        ])
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!("redlite v{}", redlite::VERSION);

    let config = Arc::new(args.runtime_config());
    let storage: Arc<dyn Keyspace> = Arc::new(StorageEngine::new());

    // A snapshot that exists but can't be read must stop startup.
    let loaded = load_snapshot(&config, storage.as_ref()).with_context(|| {
        format!(
            "failed to load snapshot {}",
            config.snapshot_path().display()
        )
    })?;
    info!(keys = loaded, "Keyspace ready");

    let stats = Arc::new(ConnectionStats::new());

    let listener = TcpListener::bind(args.bind_address())
        .await
        .with_context(|| format!("failed to bind {}", args.bind_address()))?;
    info!("Listening on {}", args.bind_address());

    let shutdown = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Shutdown signal received, stopping server...");
    };

    let handler = CommandHandler::new(storage, config);

    tokio::select! {
        _ = accept_loop(listener, handler, Arc::clone(&stats)) => {}
        _ = shutdown => {}
    }

    info!(
        connections = stats.connections_accepted.load(Ordering::Relaxed),
        commands = stats.commands_processed.load(Ordering::Relaxed),
        "Server shutdown complete"
    );
    Ok(())
}

/// Accepts clients forever, one task per connection.
async fn accept_loop(listener: TcpListener, handler: CommandHandler, stats: Arc<ConnectionStats>) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let handler = handler.clone();
                let stats = Arc::clone(&stats);

                tokio::spawn(async move {
                    handle_connection(stream, addr.to_string(), handler, stats).await;
                });
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}
