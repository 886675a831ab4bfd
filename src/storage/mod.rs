//! In-Memory Storage
//!
//! A single map from key to [`Entry`], guarded by one reader/writer lock and
//! shared across all connections. Entries may carry an absolute expiry that
//! is enforced lazily on read.

pub mod engine;

pub use engine::{from_unix_millis, unix_millis, Entry, Store};
