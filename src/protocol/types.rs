//! RESP Wire Values
//!
//! Every request and reply that crosses a client connection is one of the
//! variants of [`RespValue`]. Each variant starts with its own prefix byte
//! and every line ends with CRLF:
//!
//! | Variant        | Framing                              |
//! |----------------|--------------------------------------|
//! | SimpleString   | `+OK\r\n`                            |
//! | Error          | `-ERR unable to read file\r\n`       |
//! | Integer        | `:42\r\n`                            |
//! | BulkString     | `$3\r\nbar\r\n`                      |
//! | Null           | `$-1\r\n`                            |
//! | Array          | `*2\r\n$3\r\nGET\r\n$3\r\nfoo\r\n`   |

use bytes::Bytes;
use std::fmt;

/// Line terminator for every RESP frame.
pub const CRLF: &[u8] = b"\r\n";

/// Type prefix bytes.
pub mod prefix {
    pub const SIMPLE_STRING: u8 = b'+';
    pub const ERROR: u8 = b'-';
    pub const INTEGER: u8 = b':';
    pub const BULK_STRING: u8 = b'$';
    pub const ARRAY: u8 = b'*';
}

/// A single value of the wire protocol.
///
/// The payload always matches the tag: strings for the scalar variants,
/// a sequence of values for `Array`, and nothing at all for `Null`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RespValue {
    /// Non binary-safe status line, e.g. `+PONG\r\n`.
    SimpleString(String),

    /// Error line, e.g. `-ERR syntax error\r\n`.
    Error(String),

    /// Signed 64-bit integer.
    Integer(i64),

    /// Length-prefixed, binary-safe payload.
    BulkString(Bytes),

    /// The null bulk string, serialized as `$-1\r\n`.
    Null,

    /// Count-prefixed sequence of nested values.
    Array(Vec<RespValue>),
}

impl RespValue {
    pub fn simple_string(s: impl Into<String>) -> Self {
        RespValue::SimpleString(s.into())
    }

    pub fn error(s: impl Into<String>) -> Self {
        RespValue::Error(s.into())
    }

    /// Creates a bulk string reply.
    ///
    /// # Example
    /// ```
    /// use snapkv::protocol::RespValue;
    /// let reply = RespValue::bulk_string("bar");
    /// assert_eq!(reply.serialize(), b"$3\r\nbar\r\n");
    /// ```
    pub fn bulk_string(data: impl Into<Bytes>) -> Self {
        RespValue::BulkString(data.into())
    }

    pub fn null() -> Self {
        RespValue::Null
    }

    pub fn array(values: Vec<RespValue>) -> Self {
        RespValue::Array(values)
    }

    /// `+OK`
    pub fn ok() -> Self {
        RespValue::SimpleString("OK".to_string())
    }

    /// `+PONG`
    pub fn pong() -> Self {
        RespValue::SimpleString("PONG".to_string())
    }

    /// Status reply carrying client-supplied text.
    ///
    /// A status line cannot hold CR or LF, so such payloads go out as a
    /// bulk string instead.
    pub fn status(text: &[u8]) -> Self {
        if text.iter().any(|&b| b == b'\r' || b == b'\n') {
            RespValue::BulkString(Bytes::copy_from_slice(text))
        } else {
            RespValue::SimpleString(String::from_utf8_lossy(text).into_owned())
        }
    }

    /// The empty status line sent back for verbs the server does not know.
    pub fn empty() -> Self {
        RespValue::SimpleString(String::new())
    }

    /// Serializes the value into a freshly allocated buffer.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.serialize_into(&mut buf);
        buf
    }

    /// Appends the wire encoding of this value to `buf`.
    pub fn serialize_into(&self, buf: &mut Vec<u8>) {
        match self {
            RespValue::SimpleString(s) => write_line(buf, prefix::SIMPLE_STRING, s.as_bytes()),
            RespValue::Error(s) => write_line(buf, prefix::ERROR, s.as_bytes()),
            RespValue::Integer(n) => write_line(buf, prefix::INTEGER, n.to_string().as_bytes()),
            RespValue::BulkString(data) => {
                write_line(buf, prefix::BULK_STRING, data.len().to_string().as_bytes());
                buf.extend_from_slice(data);
                buf.extend_from_slice(CRLF);
            }
            RespValue::Null => write_line(buf, prefix::BULK_STRING, b"-1"),
            RespValue::Array(values) => {
                write_line(buf, prefix::ARRAY, values.len().to_string().as_bytes());
                for value in values {
                    value.serialize_into(buf);
                }
            }
        }
    }

    /// Returns the payload of a bulk or simple string as raw bytes.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            RespValue::BulkString(b) => Some(b),
            RespValue::SimpleString(s) => Some(s.as_bytes()),
            _ => None,
        }
    }

    /// Returns the payload of a bulk or simple string if it is valid UTF-8.
    pub fn as_str(&self) -> Option<&str> {
        self.as_bytes().and_then(|b| std::str::from_utf8(b).ok())
    }

    /// Converts a string-carrying value into an owned `Bytes`.
    pub fn to_bytes(&self) -> Option<Bytes> {
        match self {
            RespValue::BulkString(b) => Some(b.clone()),
            RespValue::SimpleString(s) => Some(Bytes::copy_from_slice(s.as_bytes())),
            _ => None,
        }
    }
}

#[inline]
fn write_line(buf: &mut Vec<u8>, tag: u8, body: &[u8]) {
    buf.push(tag);
    buf.extend_from_slice(body);
    buf.extend_from_slice(CRLF);
}

impl fmt::Display for RespValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RespValue::SimpleString(s) => write!(f, "{}", s),
            RespValue::Error(s) => write!(f, "(error) {}", s),
            RespValue::Integer(n) => write!(f, "(integer) {}", n),
            RespValue::BulkString(data) => match std::str::from_utf8(data) {
                Ok(s) => write!(f, "\"{}\"", s),
                Err(_) => write!(f, "(binary data, {} bytes)", data.len()),
            },
            RespValue::Null => write!(f, "(nil)"),
            RespValue::Array(values) if values.is_empty() => write!(f, "(empty array)"),
            RespValue::Array(values) => {
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        writeln!(f)?;
                    }
                    write!(f, "{}) {}", i + 1, v)?;
                }
                Ok(())
            }
        }
    }
}
