//! Snapshot decoding.

use super::crc64;
use super::format;
use super::SnapshotError;
use crate::storage::from_unix_millis;
use bytes::Bytes;
use std::collections::HashMap;
use std::time::SystemTime;
use tracing::trace;

/// A metadata value as it appears in the auxiliary section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataValue {
    Str(String),
    /// `redis-bits` is stored as a raw two-byte little-endian integer.
    Bits(u16),
}

/// The decoded contents of a snapshot file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotData {
    pub metadata: Vec<(String, MetadataValue)>,
    /// Live entries only; expired entries are dropped while decoding.
    pub entries: HashMap<Bytes, Bytes>,
    /// The trailer as read from the file.
    pub checksum: u64,
}

/// Cursor over the raw snapshot bytes.
struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], SnapshotError> {
        let end = self.pos.checked_add(n).ok_or(SnapshotError::Truncated)?;
        let slice = self.buf.get(self.pos..end).ok_or(SnapshotError::Truncated)?;
        self.pos = end;
        Ok(slice)
    }

    fn peek_u8(&self) -> Result<u8, SnapshotError> {
        self.buf.get(self.pos).copied().ok_or(SnapshotError::Truncated)
    }

    fn u8(&mut self) -> Result<u8, SnapshotError> {
        let b = self.peek_u8()?;
        self.pos += 1;
        Ok(b)
    }

    fn u64_le(&mut self) -> Result<u64, SnapshotError> {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(self.take(8)?);
        Ok(u64::from_le_bytes(raw))
    }

    fn expect(&mut self, expected: u8) -> Result<(), SnapshotError> {
        let found = self.u8()?;
        if found != expected {
            return Err(SnapshotError::UnexpectedByte { expected, found });
        }
        Ok(())
    }

    fn length(&mut self) -> Result<usize, SnapshotError> {
        let first = self.u8()?;
        match first >> 6 {
            0b00 => Ok(first as usize),
            0b01 => {
                let second = self.u8()?;
                Ok(((first & 0x3F) as usize) << 8 | second as usize)
            }
            _ => Err(SnapshotError::UnsupportedLength(first)),
        }
    }

    fn string(&mut self) -> Result<&'a [u8], SnapshotError> {
        let len = self.length()?;
        self.take(len)
    }
}

/// Decodes a complete snapshot file, discarding entries whose deadline is
/// before `now`.
pub fn decode(buf: &[u8], now: SystemTime) -> Result<SnapshotData, SnapshotError> {
    if buf.is_empty() {
        return Err(SnapshotError::Empty);
    }

    let mut cur = Cursor::new(buf);
    if cur.take(format::MAGIC.len()).map_err(|_| SnapshotError::BadMagic)? != format::MAGIC {
        return Err(SnapshotError::BadMagic);
    }

    let metadata = read_metadata(&mut cur)?;

    cur.expect(format::DB_SECTION)?;
    let _db_index = cur.u8()?;
    cur.expect(format::HASHTABLE_SIZE)?;
    let count = cur.u8()?;
    let _expire_count = cur.u8()?;

    let mut entries = HashMap::with_capacity(count as usize);
    for _ in 0..count {
        if let Some((key, value)) = read_entry(&mut cur, now)? {
            entries.insert(Bytes::copy_from_slice(key), Bytes::copy_from_slice(value));
        }
    }

    cur.expect(format::EOF)?;
    let body_len = cur.pos;
    let checksum = cur.u64_le()?;
    trace!(checksum, "Snapshot checksum read");

    // An all-zero trailer means the writer did not compute a checksum.
    if checksum != 0 {
        let actual = crc64::checksum(&buf[..body_len]);
        if actual != checksum {
            return Err(SnapshotError::ChecksumMismatch {
                expected: checksum,
                actual,
            });
        }
    }

    Ok(SnapshotData {
        metadata,
        entries,
        checksum,
    })
}

fn read_metadata(cur: &mut Cursor<'_>) -> Result<Vec<(String, MetadataValue)>, SnapshotError> {
    let mut metadata = Vec::new();
    while cur.peek_u8()? != format::DB_SECTION {
        cur.expect(format::METADATA)?;
        let key = String::from_utf8_lossy(cur.string()?).into_owned();
        let value = if key == format::REDIS_BITS_KEY {
            let raw = cur.take(2)?;
            MetadataValue::Bits(u16::from_le_bytes([raw[0], raw[1]]))
        } else {
            MetadataValue::Str(String::from_utf8_lossy(cur.string()?).into_owned())
        };
        metadata.push((key, value));
    }
    Ok(metadata)
}

/// Reads one entry slot. Returns `None` for an entry that already expired.
fn read_entry<'a>(
    cur: &mut Cursor<'a>,
    now: SystemTime,
) -> Result<Option<(&'a [u8], &'a [u8])>, SnapshotError> {
    let mut kind = cur.u8()?;
    let mut expired = false;

    if kind == format::EXPIRY_MS {
        let expires_at = from_unix_millis(cur.u64_le()?);
        expired = now > expires_at;
        kind = cur.u8()?;
    }

    if kind != format::STRING_TYPE {
        return Err(SnapshotError::UnsupportedType(kind));
    }

    let key = cur.string()?;
    let value = cur.string()?;
    Ok((!expired).then_some((key, value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::writer::encode;
    use crate::storage::Entry;
    use std::time::Duration;

    fn with_checksum(mut body: Vec<u8>) -> Vec<u8> {
        let crc = crc64::checksum(&body);
        body.extend_from_slice(&crc.to_le_bytes());
        body
    }

    fn file_of(entries: &[(&str, Entry)]) -> Vec<u8> {
        let map: HashMap<Bytes, Entry> = entries
            .iter()
            .map(|(k, e)| (Bytes::copy_from_slice(k.as_bytes()), e.clone()))
            .collect();
        with_checksum(encode(map.iter()).unwrap())
    }

    #[test]
    fn test_roundtrip_live_entries() {
        let now = SystemTime::now();
        let file = file_of(&[
            ("a", Entry::new(Bytes::from("1"))),
            ("b", Entry::new(Bytes::from(vec![b'x'; 300]))),
            (
                "c",
                Entry::with_expiry(Bytes::from("3"), now + Duration::from_secs(60)),
            ),
        ]);

        let data = decode(&file, now).unwrap();
        assert_eq!(data.entries.len(), 3);
        assert_eq!(data.entries[&b"a"[..]], Bytes::from("1"));
        assert_eq!(data.entries[&b"b"[..]].len(), 300);
        assert_eq!(data.entries[&b"c"[..]], Bytes::from("3"));
    }

    #[test]
    fn test_metadata() {
        let data = decode(&file_of(&[]), SystemTime::now()).unwrap();
        assert_eq!(
            data.metadata,
            vec![
                ("redis-ver".to_string(), MetadataValue::Str("7.2.0".to_string())),
                ("redis-bits".to_string(), MetadataValue::Bits(0x40C0)),
            ]
        );
    }

    #[test]
    fn test_unknown_metadata_key_read_as_string() {
        let mut body = b"REDIS0011\xFA\x05ctime\x03123".to_vec();
        body.extend_from_slice(b"\xFE\x00\xFB\x00\x00\xFF");
        let data = decode(&with_checksum(body), SystemTime::now()).unwrap();
        assert_eq!(
            data.metadata,
            vec![("ctime".to_string(), MetadataValue::Str("123".to_string()))]
        );
    }

    #[test]
    fn test_expired_entry_skipped() {
        let now = SystemTime::now();
        let file = file_of(&[
            (
                "old",
                Entry::with_expiry(Bytes::from("gone"), now - Duration::from_secs(1)),
            ),
            ("live", Entry::new(Bytes::from("here"))),
        ]);

        let data = decode(&file, now).unwrap();
        assert_eq!(data.entries.len(), 1);
        assert!(data.entries.contains_key(&b"live"[..]));
    }

    #[test]
    fn test_expiry_decided_by_clock() {
        let deadline = SystemTime::now() + Duration::from_secs(10);
        let file = file_of(&[("k", Entry::with_expiry(Bytes::from("v"), deadline))]);

        assert_eq!(decode(&file, deadline - Duration::from_secs(1)).unwrap().entries.len(), 1);
        assert!(decode(&file, deadline + Duration::from_secs(1))
            .unwrap()
            .entries
            .is_empty());
    }

    #[test]
    fn test_empty_file() {
        assert!(matches!(decode(b"", SystemTime::now()), Err(SnapshotError::Empty)));
    }

    #[test]
    fn test_bad_magic() {
        assert!(matches!(
            decode(b"REDIS0003\xFE", SystemTime::now()),
            Err(SnapshotError::BadMagic)
        ));
        assert!(matches!(
            decode(b"RED", SystemTime::now()),
            Err(SnapshotError::BadMagic)
        ));
    }

    #[test]
    fn test_unknown_type_byte() {
        let body = b"REDIS0011\xFE\x00\xFB\x01\x00\x02\x01k\x01v\xFF".to_vec();
        assert!(matches!(
            decode(&with_checksum(body), SystemTime::now()),
            Err(SnapshotError::UnsupportedType(0x02))
        ));
    }

    #[test]
    fn test_missing_eof_marker() {
        let body = b"REDIS0011\xFE\x00\xFB\x00\x00\x00".to_vec();
        assert!(matches!(
            decode(&with_checksum(body), SystemTime::now()),
            Err(SnapshotError::UnexpectedByte {
                expected: 0xFF,
                found: 0x00
            })
        ));
    }

    #[test]
    fn test_truncated_inputs() {
        let file = file_of(&[("key", Entry::new(Bytes::from("value")))]);
        for cut in [12, 30, 40, file.len() - 9, file.len() - 3] {
            assert!(
                matches!(
                    decode(&file[..cut], SystemTime::now()),
                    Err(SnapshotError::Truncated)
                ),
                "cut at {}",
                cut
            );
        }
    }

    #[test]
    fn test_unsupported_length_prefix() {
        let body = b"REDIS0011\xFE\x00\xFB\x01\x00\x00\x80k\x01v\xFF".to_vec();
        assert!(matches!(
            decode(&with_checksum(body), SystemTime::now()),
            Err(SnapshotError::UnsupportedLength(0x80))
        ));
    }

    #[test]
    fn test_checksum_mismatch() {
        let mut file = file_of(&[("k", Entry::new(Bytes::from("v")))]);
        let last = file.len() - 1;
        file[last] ^= 0xFF;
        assert!(matches!(
            decode(&file, SystemTime::now()),
            Err(SnapshotError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_zero_checksum_accepted() {
        let mut body = encode(HashMap::<Bytes, Entry>::new().iter()).unwrap();
        body.extend_from_slice(&[0u8; 8]);
        let data = decode(&body, SystemTime::now()).unwrap();
        assert_eq!(data.checksum, 0);
    }
}
