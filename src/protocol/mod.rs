//! RESP Wire Protocol
//!
//! Requests arrive as arrays of bulk strings; replies go out as simple
//! strings, errors, bulk strings (including the `$-1` null) and arrays.
//!
//! - `types`: the [`RespValue`] enum and its serializer
//! - `parser`: the incremental frame parser
//!
//! ```
//! use snapkv::protocol::{parse_message, RespValue};
//!
//! let (request, _) = parse_message(b"*2\r\n$3\r\nGET\r\n$3\r\nfoo\r\n").unwrap().unwrap();
//! assert!(matches!(request, RespValue::Array(ref args) if args.len() == 2));
//!
//! assert_eq!(RespValue::null().serialize(), b"$-1\r\n");
//! ```

pub mod parser;
pub mod types;

pub use parser::{parse_message, ParseError, ParseResult, RespParser};
pub use types::RespValue;
