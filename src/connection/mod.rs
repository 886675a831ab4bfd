//! Client Connections
//!
//! Every accepted TCP connection gets its own Tokio task running a
//! [`ConnectionHandler`]. There is no pool and no cap on concurrent clients;
//! a stalled client only blocks its own task.
//!
//! ```ignore
//! let (stream, addr) = listener.accept().await?;
//! tokio::spawn(handle_connection(stream, addr, command_handler.clone()));
//! ```

pub mod handler;

pub use handler::{handle_connection, ConnectionError, ConnectionHandler};
