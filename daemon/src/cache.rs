use common::{CacheStatus, Image};
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Share of the caller's update interval an entry stays fresh for, so the
/// cache always turns over before the caller's next scheduled fetch.
const FRESHNESS_FACTOR: f64 = 0.9;

/// A cached result set
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub expires: Instant,
    pub images: Vec<Image>,
}

/// In-memory result cache keyed by `source::orientation`.
///
/// Entries are only ever overwritten, never evicted; the key space is
/// bounded by the number of configured sources.
#[derive(Debug, Default)]
pub struct CacheStore {
    entries: HashMap<String, CacheEntry>,
}

impl CacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache key for a resolved source and orientation
    pub fn key(source: &str, orientation: &str) -> String {
        format!("{}::{}", source, orientation)
    }

    pub fn get(&self, key: &str) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    /// Store `images` under `key`, fresh for 90% of `update_interval_ms`
    pub fn put(&mut self, key: &str, images: Vec<Image>, update_interval_ms: u64) {
        self.put_at(key, images, update_interval_ms, Instant::now());
    }

    pub fn put_at(&mut self, key: &str, images: Vec<Image>, update_interval_ms: u64, now: Instant) {
        let ttl = Duration::from_millis(update_interval_ms).mul_f64(FRESHNESS_FACTOR);
        self.entries.insert(
            key.to_string(),
            CacheEntry {
                expires: now + ttl,
                images,
            },
        );
    }

    /// True when an unexpired entry holds at least `min_count` images
    pub fn is_fresh(&self, key: &str, min_count: usize) -> bool {
        self.is_fresh_at(key, min_count, Instant::now())
    }

    pub fn is_fresh_at(&self, key: &str, min_count: usize, now: Instant) -> bool {
        self.entries
            .get(key)
            .is_some_and(|entry| now < entry.expires && min_count <= entry.images.len())
    }

    /// Snapshot of every entry, sorted by key
    pub fn status(&self, now: Instant) -> Vec<CacheStatus> {
        let mut status: Vec<CacheStatus> = self
            .entries
            .iter()
            .map(|(key, entry)| CacheStatus {
                key: key.clone(),
                images: entry.images.len(),
                expires_in_ms: entry.expires.saturating_duration_since(now).as_millis() as u64,
            })
            .collect();
        status.sort_by(|a, b| a.key.cmp(&b.key));
        status
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn images(n: usize) -> Vec<Image> {
        (0..n).map(|i| Image::new(format!("https://img/{}.jpg", i))).collect()
    }

    #[test]
    fn test_key_format() {
        assert_eq!(CacheStore::key("/r/EarthPorn", "vertical"), "/r/EarthPorn::vertical");
    }

    #[test]
    fn test_missing_entry_is_stale() {
        let cache = CacheStore::new();
        assert!(!cache.is_fresh("bing::horizontal", 0));
        assert!(cache.get("bing::horizontal").is_none());
    }

    #[test]
    fn test_expiry_is_ninety_percent_of_interval() {
        let mut cache = CacheStore::new();
        let now = Instant::now();
        cache.put_at("k", images(3), 100_000, now);

        assert!(cache.is_fresh_at("k", 3, now + Duration::from_millis(89_000)));
        assert!(!cache.is_fresh_at("k", 3, now + Duration::from_millis(91_000)));
    }

    #[test]
    fn test_requires_enough_images() {
        let mut cache = CacheStore::new();
        let now = Instant::now();
        cache.put_at("k", images(2), 100_000, now);

        assert!(cache.is_fresh_at("k", 2, now));
        assert!(!cache.is_fresh_at("k", 3, now));
    }

    #[test]
    fn test_put_overwrites() {
        let mut cache = CacheStore::new();
        let now = Instant::now();
        cache.put_at("k", images(1), 1_000, now);
        cache.put_at("k", images(4), 1_000, now);

        assert_eq!(cache.status(now).len(), 1);
        assert_eq!(cache.get("k").unwrap().images.len(), 4);
    }

    #[test]
    fn test_status_snapshot() {
        let mut cache = CacheStore::new();
        let now = Instant::now();
        cache.put_at("b::vertical", images(2), 10_000, now);
        cache.put_at("a::vertical", images(1), 10_000, now);

        let status = cache.status(now + Duration::from_millis(20_000));
        assert_eq!(status.len(), 2);
        assert_eq!(status[0].key, "a::vertical");
        assert_eq!(status[0].expires_in_ms, 0);
        assert_eq!(status[1].images, 2);
    }
}
