//! Snapshot byte layout: markers and the string length prefix.
//!
//! ```text
//! "REDIS0011"
//! FA <len>"redis-ver"  <len>"7.2.0"
//! FA <len>"redis-bits" C0 40
//! FE 00                          db section, db index 0
//! FB <count:u8> 00               hashtable size, expire count (unused)
//! [FC <expiry ms:u64 LE>] 00 <len>key <len>value      x count
//! FF
//! <crc64:u64 LE>
//! ```

use super::SnapshotError;

pub const MAGIC: &[u8; 9] = b"REDIS0011";

pub const STRING_TYPE: u8 = 0x00;
pub const METADATA: u8 = 0xFA;
pub const DB_SECTION: u8 = 0xFE;
pub const DB_INDEX: u8 = 0x00;
pub const HASHTABLE_SIZE: u8 = 0xFB;
pub const EXPIRY_MS: u8 = 0xFC;
pub const EOF: u8 = 0xFF;

pub const REDIS_VER_KEY: &str = "redis-ver";
pub const REDIS_VER: &str = "7.2.0";
pub const REDIS_BITS_KEY: &str = "redis-bits";
pub const REDIS_BITS: [u8; 2] = [0xC0, 0x40];

/// Most entries one snapshot can declare; the count is a single byte.
pub const MAX_ENTRIES: usize = u8::MAX as usize;

/// Strings must be shorter than this to fit the two-byte prefix.
pub const MAX_STRING_LEN: usize = 1 << 14;

/// Length prefix for a string of `len` bytes.
///
/// `00xxxxxx` holds 0..=63 directly. `01xxxxxx xxxxxxxx` holds 64..=16383
/// with the high six bits in the first byte.
pub fn encode_length(len: usize) -> Result<([u8; 2], usize), SnapshotError> {
    if len < 1 << 6 {
        Ok(([len as u8, 0], 1))
    } else if len < MAX_STRING_LEN {
        Ok(([((len >> 8) as u8) | 0x40, len as u8], 2))
    } else {
        Err(SnapshotError::StringTooLong(len))
    }
}

/// Appends a length-prefixed string to `buf`.
pub fn put_string(buf: &mut Vec<u8>, s: &[u8]) -> Result<(), SnapshotError> {
    let (prefix, n) = encode_length(s.len())?;
    buf.extend_from_slice(&prefix[..n]);
    buf.extend_from_slice(s);
    Ok(())
}
