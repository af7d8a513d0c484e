//! In-process accelerator backed by a sharded map.
//!
//! Used for single-node deployments and throughout the test suite. It mirrors
//! the Redis semantics the rest of the crate relies on: integer values are
//! decimal text, `incr_by` keeps an existing expiry, and scans are
//! cursor-based and tolerate concurrent writes.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry as MapEntry;
use tokio::time::Instant;

use crate::application::accelerator::{Accelerator, AcceleratorError, ScanPage, decode_counter};

#[derive(Debug)]
struct Entry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
    /// Insertion order; doubles as the scan cursor.
    seq: u64,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

/// Writes between full sweeps of expired entries.
const SWEEP_EVERY_WRITES: u64 = 1024;

#[derive(Debug, Default)]
pub struct MemoryAccelerator {
    entries: DashMap<String, Entry>,
    next_seq: AtomicU64,
    writes: AtomicU64,
}

impl MemoryAccelerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .iter()
            .filter(|entry| entry.value().is_live(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn next_seq(&self) -> u64 {
        self.next_seq.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn purge_expired(&self, now: Instant) {
        self.entries.retain(|_, entry| entry.is_live(now));
    }

    fn note_write(&self, now: Instant) {
        let writes = self.writes.fetch_add(1, Ordering::Relaxed) + 1;
        if writes % SWEEP_EVERY_WRITES == 0 {
            self.purge_expired(now);
        }
    }
}

#[async_trait]
impl Accelerator for MemoryAccelerator {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, AcceleratorError> {
        let now = Instant::now();
        if let Some(entry) = self.entries.get(key) {
            if entry.is_live(now) {
                return Ok(Some(entry.value.clone()));
            }
        }
        self.entries.remove_if(key, |_, entry| !entry.is_live(now));
        Ok(None)
    }

    async fn set(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Option<Duration>,
    ) -> Result<(), AcceleratorError> {
        let now = Instant::now();
        let expires_at = ttl.map(|ttl| now + ttl);
        match self.entries.entry(key.to_string()) {
            MapEntry::Occupied(mut occupied) => {
                let seq = if occupied.get().is_live(now) {
                    occupied.get().seq
                } else {
                    self.next_seq()
                };
                occupied.insert(Entry {
                    value,
                    expires_at,
                    seq,
                });
            }
            MapEntry::Vacant(vacant) => {
                vacant.insert(Entry {
                    value,
                    expires_at,
                    seq: self.next_seq(),
                });
            }
        }
        self.note_write(now);
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> Result<(), AcceleratorError> {
        for key in keys {
            self.entries.remove(key);
        }
        Ok(())
    }

    async fn incr_by(&self, key: &str, delta: i64) -> Result<i64, AcceleratorError> {
        let now = Instant::now();
        match self.entries.entry(key.to_string()) {
            MapEntry::Occupied(mut occupied) if occupied.get().is_live(now) => {
                let entry = occupied.get_mut();
                let current = decode_counter(key, &entry.value)?;
                let next = current
                    .checked_add(delta)
                    .ok_or_else(|| AcceleratorError::decode(key, "increment overflows i64"))?;
                entry.value = next.to_string().into_bytes();
                Ok(next)
            }
            MapEntry::Occupied(mut occupied) => {
                occupied.insert(Entry {
                    value: delta.to_string().into_bytes(),
                    expires_at: None,
                    seq: self.next_seq(),
                });
                Ok(delta)
            }
            MapEntry::Vacant(vacant) => {
                vacant.insert(Entry {
                    value: delta.to_string().into_bytes(),
                    expires_at: None,
                    seq: self.next_seq(),
                });
                Ok(delta)
            }
        }
    }

    async fn scan_prefix(
        &self,
        cursor: u64,
        prefix: &str,
        count: usize,
    ) -> Result<ScanPage, AcceleratorError> {
        let now = Instant::now();
        // a new scan sweeps keys that expired without ever being read again
        if cursor == 0 {
            self.purge_expired(now);
        }
        let mut matches: Vec<(u64, String)> = self
            .entries
            .iter()
            .filter(|entry| {
                entry.value().seq > cursor
                    && entry.key().starts_with(prefix)
                    && entry.value().is_live(now)
            })
            .map(|entry| (entry.value().seq, entry.key().clone()))
            .collect();
        matches.sort_unstable_by_key(|(seq, _)| *seq);

        let count = count.max(1);
        let has_more = matches.len() > count;
        matches.truncate(count);

        let next_cursor = match (has_more, matches.last()) {
            (true, Some((seq, _))) => *seq,
            _ => 0,
        };

        Ok(ScanPage {
            keys: matches.into_iter().map(|(_, key)| key).collect(),
            next_cursor,
        })
    }

    async fn ping(&self) -> Result<(), AcceleratorError> {
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
