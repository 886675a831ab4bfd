//! Command Layer
//!
//! Turns a parsed request into a reply:
//!
//! ```text
//! RespValue::Array ──> upper-case verb ──> Command ──> handler ──> RespValue
//!                                                        │
//!                                          Store ◄───────┴───────► Snapshot
//! ```
//!
//! ## Supported Commands
//!
//! - `PING [message]`
//! - `ECHO message`
//! - `SET key value [PX milliseconds]`
//! - `GET key`
//! - `CONFIG GET dir|dbfilename`
//! - `SAVE`
//! - `KEYS pattern`
//!
//! Unknown verbs get an empty status reply and the connection stays open.

pub mod handler;

pub use handler::{Command, CommandHandler};
