//! Shared Key-Value Store with Lazy Expiry
//!
//! One `HashMap` behind one `RwLock`, shared by every connection. The lock
//! covers the whole map, so concurrent writers to different keys still take
//! turns.
//!
//! Expired entries are never swept in the background. A read that finds an
//! entry past its deadline removes it under the write lock and reports the
//! key as missing.

use bytes::Bytes;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// A stored value with an optional absolute deadline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub value: Bytes,
    /// `None` means the entry never expires.
    pub expires_at: Option<SystemTime>,
}

impl Entry {
    pub fn new(value: Bytes) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    pub fn with_expiry(value: Bytes, expires_at: SystemTime) -> Self {
        Self {
            value,
            expires_at: Some(expires_at),
        }
    }

    /// True once `now` has passed the deadline.
    #[inline]
    pub fn is_expired_at(&self, now: SystemTime) -> bool {
        self.expires_at.is_some_and(|exp| now > exp)
    }
}

/// Milliseconds since the Unix epoch, clamped to `0..=u64::MAX`.
pub fn unix_millis(t: SystemTime) -> u64 {
    t.duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

/// Inverse of [`unix_millis`].
pub fn from_unix_millis(ms: u64) -> SystemTime {
    UNIX_EPOCH + Duration::from_millis(ms)
}

/// The in-memory dataset.
///
/// Wrap it in an `Arc` and hand a clone to every connection.
///
/// ```
/// use snapkv::storage::Store;
/// use bytes::Bytes;
///
/// let store = Store::new();
/// store.set(Bytes::from("foo"), Bytes::from("bar"), None);
/// assert_eq!(store.get(b"foo"), Some(Bytes::from("bar")));
/// ```
#[derive(Debug, Default)]
pub struct Store {
    data: RwLock<HashMap<Bytes, Entry>>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces `key`, attaching `expires_at` if given.
    pub fn set(&self, key: Bytes, value: Bytes, expires_at: Option<SystemTime>) {
        let entry = Entry { value, expires_at };
        self.data
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, entry);
    }

    /// Looks up `key`, removing it first if its deadline has passed.
    pub fn get(&self, key: &[u8]) -> Option<Bytes> {
        self.get_at(key, SystemTime::now())
    }

    /// [`Store::get`] against an explicit clock reading.
    pub fn get_at(&self, key: &[u8], now: SystemTime) -> Option<Bytes> {
        // Fast path: a live entry only needs the read lock.
        {
            let data = self.data.read().unwrap_or_else(PoisonError::into_inner);
            match data.get(key) {
                None => return None,
                Some(entry) if !entry.is_expired_at(now) => return Some(entry.value.clone()),
                Some(_) => {}
            }
        }

        let mut data = self.data.write().unwrap_or_else(PoisonError::into_inner);
        match data.get(key) {
            Some(entry) if entry.is_expired_at(now) => {
                data.remove(key);
                None
            }
            // Another connection replaced the entry between the two locks.
            Some(entry) => Some(entry.value.clone()),
            None => None,
        }
    }

    /// Runs `f` over the whole map while holding the write lock, so no
    /// mutation can interleave with what `f` observes.
    pub fn with_locked<R>(&self, f: impl FnOnce(&HashMap<Bytes, Entry>) -> R) -> R {
        let data = self.data.write().unwrap_or_else(PoisonError::into_inner);
        f(&data)
    }

    /// Number of entries, including expired ones not yet touched.
    pub fn len(&self) -> usize {
        self.data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True if an entry for `key` is physically present, expired or not.
    pub fn contains(&self, key: &[u8]) -> bool {
        self.data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }
}
