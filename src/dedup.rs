//! Duplicate suppression.
//!
//! APRS-IS relays the same packet through multiple igates; a packet is
//! identified by a short fingerprint of its sender and raw content, and
//! suppressed when the fingerprint was seen within a rolling window.

use std::time::Duration;

use moka::future::Cache;
use sha2::{Digest, Sha256};

/// Rolling window within which repeats are suppressed.
pub const DEDUP_TTL: Duration = Duration::from_secs(30);

const MAX_TRACKED_FINGERPRINTS: u64 = 200_000;

/// First 64 bits of SHA-256 over `sender ":" raw_content`, hex-rendered.
pub fn fingerprint(sender: &str, raw_content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(sender.as_bytes());
    hasher.update(b":");
    hasher.update(raw_content.as_bytes());
    hex::encode(&hasher.finalize()[..8])
}

/// TTL presence cache shared by all pipeline workers.
#[derive(Clone)]
pub struct DedupCache {
    cache: Cache<String, ()>,
}

impl DedupCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            cache: Cache::builder()
                .max_capacity(MAX_TRACKED_FINGERPRINTS)
                .time_to_live(ttl)
                .build(),
        }
    }

    pub async fn seen(&self, key: &str) -> bool {
        self.cache.get(key).await.is_some()
    }

    pub async fn insert(&self, key: String) {
        self.cache.insert(key, ()).await;
    }

    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_sender_and_raw_agree() {
        let a = fingerprint("N0CALL", "N0CALL>APRS:>hello");
        let b = fingerprint("N0CALL", "N0CALL>APRS:>hello");
        assert_eq!(a, b);
        assert_eq!(a.len(), 16); // 64 bits in hex
    }

    #[test]
    fn differing_fields_disagree() {
        let base = fingerprint("N0CALL", "N0CALL>APRS:>hello");
        assert_ne!(base, fingerprint("N0CALL-1", "N0CALL>APRS:>hello"));
        assert_ne!(base, fingerprint("N0CALL", "N0CALL>APRS:>hello!"));
    }

    #[tokio::test]
    async fn repeat_within_ttl_is_seen() {
        let cache = DedupCache::new(Duration::from_secs(30));
        let key = fingerprint("N0CALL", "line");
        assert!(!cache.seen(&key).await);
        cache.insert(key.clone()).await;
        assert!(cache.seen(&key).await);
    }

    #[tokio::test]
    async fn entry_expires_after_ttl() {
        let cache = DedupCache::new(Duration::from_millis(50));
        let key = fingerprint("N0CALL", "line");
        cache.insert(key.clone()).await;
        assert!(cache.seen(&key).await);
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(!cache.seen(&key).await);
    }
}
