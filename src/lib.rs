//! # SnapKV - A Redis-Compatible Key-Value Server with Snapshots
//!
//! SnapKV speaks the RESP protocol, keeps string keys in memory with optional
//! millisecond expiry, and persists them to a single RDB-style snapshot file
//! on `SAVE`.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                               SnapKV                                │
//! │                                                                     │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐              │
//! │  │ TCP Server  │───>│ Connection  │───>│  Command    │              │
//! │  │ (Listener)  │    │  Handler    │    │  Handler    │              │
//! │  └─────────────┘    └──────┬──────┘    └──┬───────┬──┘              │
//! │                            │              │       │                 │
//! │                            ▼              ▼       ▼                 │
//! │                     ┌─────────────┐  ┌────────┐ ┌──────────────┐    │
//! │                     │ RESP Parser │  │ Store  │ │  Snapshot    │    │
//! │                     └─────────────┘  │ RwLock │ │ (dir/dbfile) │    │
//! │                                      └────────┘ └──────────────┘    │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use snapkv::{CommandHandler, ServerConfig, Snapshot, Store};
//! use snapkv::connection::handle_connection;
//! use std::sync::Arc;
//! use tokio::net::TcpListener;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Arc::new(ServerConfig::default());
//!     let store = Arc::new(Store::new());
//!     let snapshot = Arc::new(Snapshot::new(config.snapshot_path()));
//!     let handler = CommandHandler::new(store, snapshot, Arc::clone(&config));
//!
//!     let listener = TcpListener::bind(config.bind_address()).await?;
//!     loop {
//!         let (stream, addr) = listener.accept().await?;
//!         tokio::spawn(handle_connection(stream, addr, handler.clone()));
//!     }
//! }
//! ```
//!
//! ## Module Overview
//!
//! - [`protocol`]: RESP value model, parser and serializer
//! - [`storage`]: shared key/value map with lazy expiry
//! - [`snapshot`]: snapshot file encoding, decoding and checksums
//! - [`commands`]: command dispatch
//! - [`connection`]: per-client request loop
//! - [`config`]: command-line configuration
//!
//! ## Reads Go Through the Snapshot
//!
//! `GET` and `KEYS` consult the snapshot file first. `GET` falls back to the
//! in-memory store when the file has no live value for the key; `KEYS` only
//! ever reports what the file holds, so keys appear there after a `SAVE`.

pub mod commands;
pub mod config;
pub mod connection;
pub mod protocol;
pub mod snapshot;
pub mod storage;

pub use commands::CommandHandler;
pub use config::{CliAction, ConfigError, ServerConfig};
pub use connection::handle_connection;
pub use protocol::{ParseError, RespParser, RespValue};
pub use snapshot::{Snapshot, SnapshotError};
pub use storage::Store;

/// Default listen port (same as Redis)
pub const DEFAULT_PORT: u16 = 6379;

/// Default bind host
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Version of SnapKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
