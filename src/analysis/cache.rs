//! Short-lived memo of analysis records, keyed by image name and content

use crate::analysis::ProcessedImageRecord;
use crate::config::CacheConfig;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

struct CacheEntry {
    record: Arc<ProcessedImageRecord>,
    inserted_at: Instant,
}

pub struct ResultCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    ttl: Duration,
    max_entries: usize,
}

impl ResultCache {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
            max_entries,
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(Duration::from_secs(config.ttl_secs), config.max_entries)
    }

    /// `<name>:<sha256 of the bytes>`
    pub fn key(img_name: &str, bytes: &[u8]) -> String {
        format!("{}:{:x}", img_name, Sha256::digest(bytes))
    }

    pub fn get(&self, key: &str) -> Option<Arc<ProcessedImageRecord>> {
        let mut entries = self.entries.lock();
        let expired = match entries.get(key) {
            Some(entry) if entry.inserted_at.elapsed() < self.ttl => return Some(entry.record.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            entries.remove(key);
        }
        None
    }

    pub fn insert(&self, key: String, record: ProcessedImageRecord) -> Arc<ProcessedImageRecord> {
        let record = Arc::new(record);
        if self.max_entries == 0 {
            return record;
        }

        let mut entries = self.entries.lock();
        let ttl = self.ttl;
        entries.retain(|_, entry| entry.inserted_at.elapsed() < ttl);

        if !entries.contains_key(&key) && entries.len() >= self.max_entries {
            let oldest = entries
                .iter()
                .min_by_key(|(_, entry)| entry.inserted_at)
                .map(|(k, _)| k.clone());
            if let Some(oldest) = oldest {
                tracing::debug!("Result cache full, evicting {}", oldest);
                entries.remove(&oldest);
            }
        }

        entries.insert(
            key,
            CacheEntry {
                record: record.clone(),
                inserted_at: Instant::now(),
            },
        );
        record
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}
