use std::num::NonZeroUsize;
use std::time::Duration;

use arcstr::ArcStr;
use lru::LruCache;
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::CellKey;

struct Entry {
    place: ArcStr,
    inserted_at: Instant,
}

/// Bounded cache of resolved place names. Entries expire `ttl` after they were
/// inserted; when full, the least recently used entry makes room.
pub struct GeoCache {
    entries: Mutex<LruCache<CellKey, Entry>>,
    ttl: Duration,
}

impl GeoCache {
    pub fn new(capacity: NonZeroUsize, ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            ttl,
        }
    }

    /// Returns the cached place. A hit marks the entry as recently used,
    /// an expired entry is dropped and reported as missing.
    pub fn get(&self, key: &CellKey) -> Option<ArcStr> {
        let mut entries = self.entries.lock();

        let (fresh, place) = entries
            .get(key)
            .map(|entry| (entry.inserted_at.elapsed() < self.ttl, entry.place.clone()))?;

        if !fresh {
            entries.pop(key);
            return None;
        }

        Some(place)
    }

    pub fn insert(&self, key: CellKey, place: ArcStr) {
        let entry = Entry { place, inserted_at: Instant::now() };
        self.entries.lock().put(key, entry);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod test {
    use std::num::NonZeroUsize;
    use std::time::Duration;

    use arcstr::ArcStr;

    use super::GeoCache;
    use crate::CellKey;

    fn cache(capacity: usize, ttl: Duration) -> GeoCache {
        GeoCache::new(NonZeroUsize::new(capacity).unwrap(), ttl)
    }

    #[test]
    fn insert_and_get() {
        let cache = cache(10, Duration::from_secs(60));
        let key = CellKey::new(6.93, 79.86);

        assert_eq!(cache.get(&key), None);

        cache.insert(key.clone(), ArcStr::from("Colombo"));
        assert_eq!(cache.get(&key).as_deref(), Some("Colombo"));

        // insert overwrites
        cache.insert(key.clone(), ArcStr::from("Dehiwala"));
        assert_eq!(cache.get(&key).as_deref(), Some("Dehiwala"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn evicts_least_recently_used() {
        let cache = cache(2, Duration::from_secs(60));

        let a = CellKey::new(1.0, 1.0);
        let b = CellKey::new(2.0, 2.0);
        let c = CellKey::new(3.0, 3.0);

        cache.insert(a.clone(), ArcStr::from("A"));
        cache.insert(b.clone(), ArcStr::from("B"));

        // touch a, so b becomes the oldest entry
        assert!(cache.get(&a).is_some());

        cache.insert(c.clone(), ArcStr::from("C"));

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&b), None);
        assert_eq!(cache.get(&a).as_deref(), Some("A"));
        assert_eq!(cache.get(&c).as_deref(), Some("C"));
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire() {
        let ttl = Duration::from_secs(12 * 60 * 60);
        let cache = cache(10, ttl);
        let key = CellKey::new(7.29, 80.63);

        cache.insert(key.clone(), ArcStr::from("Kandy"));

        tokio::time::advance(ttl - Duration::from_millis(1)).await;
        assert_eq!(cache.get(&key).as_deref(), Some("Kandy"));

        tokio::time::advance(Duration::from_millis(2)).await;
        assert_eq!(cache.get(&key), None);

        // expired entries are dropped on access
        assert!(cache.is_empty());
    }
}
