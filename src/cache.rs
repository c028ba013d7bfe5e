use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tokio::time::Instant;
use tracing::trace;

use crate::{AnalysisResult, Fingerprint, Outcome};

/// One week.
pub const DEFAULT_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Body and provenance stored under a fingerprint.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedAnalysis {
    pub result: AnalysisResult,
    pub outcome: Outcome,
}

struct Entry {
    value: CachedAnalysis,
    inserted: Instant,
    expires_at: Instant,
}

/// TTL keyed store shared by real and fallback results.
///
/// When `max_entries` is set, inserting into a full cache first drops expired
/// entries and then the oldest insertion.
pub struct ContentCache {
    entries: Mutex<HashMap<Fingerprint, Entry>>,
    default_ttl: Duration,
    max_entries: Option<usize>,
}

impl Default for ContentCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL, None)
    }
}

impl ContentCache {
    pub fn new(default_ttl: Duration, max_entries: Option<usize>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            default_ttl,
            max_entries: max_entries.filter(|n| *n > 0),
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Fingerprint, Entry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Look up a live entry. Expired entries are removed on access.
    pub fn get(&self, key: &Fingerprint) -> Option<CachedAnalysis> {
        let mut entries = self.lock();
        let now = Instant::now();
        match entries.get(key) {
            Some(entry) if entry.expires_at > now => Some(entry.value.clone()),
            Some(_) => {
                trace!(fingerprint = %key, "cache entry expired");
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn set(&self, key: Fingerprint, value: CachedAnalysis, ttl: Duration) {
        let mut entries = self.lock();
        let now = Instant::now();
        if let Some(max) = self.max_entries {
            if entries.len() >= max && !entries.contains_key(&key) {
                entries.retain(|_, e| e.expires_at > now);
                if entries.len() >= max {
                    let oldest = entries
                        .iter()
                        .min_by_key(|(_, e)| e.inserted)
                        .map(|(k, _)| k.clone());
                    if let Some(oldest) = oldest {
                        trace!(fingerprint = %oldest, "evicting oldest cache entry");
                        entries.remove(&oldest);
                    }
                }
            }
        }
        entries.insert(
            key,
            Entry {
                value,
                inserted: now,
                expires_at: now + ttl,
            },
        );
    }

    /// Insert using the cache's default TTL.
    pub fn insert(&self, key: Fingerprint, value: CachedAnalysis) {
        self.set(key, value, self.default_ttl);
    }

    /// Number of stored entries, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every expired entry and return how many were removed.
    pub fn purge_expired(&self) -> usize {
        let mut entries = self.lock();
        let now = Instant::now();
        let before = entries.len();
        entries.retain(|_, e| e.expires_at > now);
        before - entries.len()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}
