//! Snapshot encoding.

use super::crc64;
use super::format::{self, put_string};
use super::SnapshotError;
use crate::storage::{unix_millis, Entry};
use bytes::Bytes;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Encodes `entries` into everything that precedes the checksum trailer.
///
/// Fails without producing output if there are more entries than the
/// one-byte count allows, or a key or value is too long for the length
/// prefix.
pub fn encode<'a, I>(entries: I) -> Result<Vec<u8>, SnapshotError>
where
    I: ExactSizeIterator<Item = (&'a Bytes, &'a Entry)>,
{
    let count = entries.len();
    if count > format::MAX_ENTRIES {
        return Err(SnapshotError::TooManyKeys(count));
    }

    let mut buf = Vec::with_capacity(64 + count * 16);
    buf.extend_from_slice(format::MAGIC);

    buf.push(format::METADATA);
    put_string(&mut buf, format::REDIS_VER_KEY.as_bytes())?;
    put_string(&mut buf, format::REDIS_VER.as_bytes())?;

    buf.push(format::METADATA);
    put_string(&mut buf, format::REDIS_BITS_KEY.as_bytes())?;
    buf.extend_from_slice(&format::REDIS_BITS);

    buf.extend_from_slice(&[
        format::DB_SECTION,
        format::DB_INDEX,
        format::HASHTABLE_SIZE,
        count as u8,
        0x00,
    ]);

    for (key, entry) in entries {
        if let Some(expires_at) = entry.expires_at {
            buf.push(format::EXPIRY_MS);
            buf.extend_from_slice(&unix_millis(expires_at).to_le_bytes());
        }
        buf.push(format::STRING_TYPE);
        put_string(&mut buf, key)?;
        put_string(&mut buf, &entry.value)?;
    }

    buf.push(format::EOF);
    Ok(buf)
}

/// Truncates `path`, writes `body`, then appends the CRC-64 of the bytes
/// read back from the file.
pub fn write_file(path: &Path, body: &[u8]) -> Result<u64, SnapshotError> {
    let mut writer = BufWriter::new(File::create(path)?);
    writer.write_all(body)?;
    writer.flush()?;

    let checksum = crc64::checksum_file(path)?;
    writer.write_all(&checksum.to_le_bytes())?;
    writer.flush()?;
    writer.get_ref().sync_all()?;
    Ok(checksum)
}
