//! SnapKV - A Redis-Compatible Key-Value Server with Snapshots
//!
//! Entry point: parses the command line, sets up logging, and runs the
//! accept loop until Ctrl+C.

use snapkv::commands::CommandHandler;
use snapkv::config::{CliAction, ServerConfig};
use snapkv::connection::handle_connection;
use snapkv::snapshot::Snapshot;
use snapkv::storage::Store;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn print_help() {
    println!(
        r#"
SnapKV - A Redis-Compatible Key-Value Server with Snapshots

USAGE:
    snapkv [OPTIONS]

OPTIONS:
        --dir <DIR>              Directory holding the snapshot file (default: .)
        --dbfilename <NAME>      Snapshot file name (default: dump.rdb)
    -h, --host <HOST>            Host to bind to (default: 127.0.0.1)
    -p, --port <PORT>            Port to listen on (default: 6379)
    -v, --version                Print version information
        --help                   Print this help message

EXAMPLES:
    snapkv                                     # Start on 127.0.0.1:6379
    snapkv --dir /tmp/data --dbfilename db.rdb # Persist to /tmp/data/db.rdb
    snapkv --port 6380                         # Start on port 6380

LOGGING:
    Set RUST_LOG to control verbosity, e.g. RUST_LOG=snapkv=debug
"#
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = match ServerConfig::from_args(std::env::args().skip(1)) {
        Ok(CliAction::Run(config)) => config,
        Ok(CliAction::Help) => {
            print_help();
            return Ok(());
        }
        Ok(CliAction::Version) => {
            println!("SnapKV version {}", snapkv::VERSION);
            return Ok(());
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            print_help();
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = Arc::new(config);
    let store = Arc::new(Store::new());
    let snapshot = Arc::new(Snapshot::new(config.snapshot_path()));
    info!(
        dir = %config.dir,
        dbfilename = %config.dbfilename,
        "Snapshot file configured"
    );

    let handler = CommandHandler::new(store, snapshot, Arc::clone(&config));

    let listener = TcpListener::bind(config.bind_address()).await?;
    info!(
        version = snapkv::VERSION,
        address = %config.bind_address(),
        "Ready to accept connections"
    );

    let shutdown = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
        info!("Shutdown signal received, stopping server...");
    };

    tokio::select! {
        _ = accept_loop(listener, handler) => {}
        _ = shutdown => {}
    }

    info!("Server shutdown complete");
    Ok(())
}

async fn accept_loop(listener: TcpListener, handler: CommandHandler) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                tokio::spawn(handle_connection(stream, addr, handler.clone()));
            }
            Err(e) => {
                error!(error = %e, "Failed to accept connection");
            }
        }
    }
}
