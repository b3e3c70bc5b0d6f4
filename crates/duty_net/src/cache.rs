//! TTL cache for expensive remote snapshots (the vCloud usage report).
//!
//! Single slot, thread-safe via `Mutex`; entries expire by age, and callers
//! may invalidate explicitly after a mutation.

use std::sync::Mutex;
use std::time::{Duration, Instant};

const DEFAULT_TTL: Duration = Duration::from_secs(300);

struct Entry<T> {
    data: T,
    stored_at: Instant,
}

pub struct ReportCache<T> {
    slot: Mutex<Option<Entry<T>>>,
    ttl: Duration,
}

impl<T: Clone> ReportCache<T> {
    /// Cache with the default 5-minute TTL.
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_TTL)
    }

    /// Cache with a custom TTL (for testing).
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            slot: Mutex::new(None),
            ttl,
        }
    }

    pub fn get(&self) -> Option<T> {
        let slot = self.slot.lock().unwrap();
        match slot.as_ref() {
            Some(entry) if entry.stored_at.elapsed() < self.ttl => Some(entry.data.clone()),
            _ => None,
        }
    }

    pub fn put(&self, data: T) {
        let mut slot = self.slot.lock().unwrap();
        *slot = Some(Entry {
            data,
            stored_at: Instant::now(),
        });
    }

    pub fn invalidate(&self) {
        let mut slot = self.slot.lock().unwrap();
        *slot = None;
    }
}

impl<T: Clone> Default for ReportCache<T> {
    fn default() -> Self {
        Self::new()
    }
}
