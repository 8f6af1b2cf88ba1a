use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};

use lru::LruCache;
use strata_store::BlobStore;
use strata_types::BlobId;
use tracing::trace;

struct Location {
    store: Weak<dyn BlobStore>,
    recorded: Instant,
}

/// Remembers which member last held a blob.
///
/// Entries are hints. They hold members weakly, expire after a fixed time
/// and are evicted least-recently-used once the capacity is reached. A hit
/// whose member has been dropped or whose entry has expired is reported as
/// a miss and removed.
pub struct LocationCache {
    entries: Mutex<LruCache<BlobId, Location>>,
    capacity: usize,
    ttl: Duration,
}

impl LocationCache {
    /// A cache holding at most `capacity` entries (at least one). Storage
    /// grows with use rather than being reserved up front.
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(LruCache::unbounded()),
            capacity: capacity.max(1),
            ttl,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn get(&self, blob_id: &BlobId) -> Option<Arc<dyn BlobStore>> {
        let mut entries = self.entries.lock().expect("lock poisoned");
        let live = entries.get(blob_id).and_then(|location| {
            if location.recorded.elapsed() < self.ttl {
                location.store.upgrade()
            } else {
                None
            }
        });
        match live {
            Some(store) => {
                trace!(%blob_id, "location cache hit");
                Some(store)
            }
            None => {
                if entries.pop(blob_id).is_some() {
                    trace!(%blob_id, "dropping stale location");
                }
                None
            }
        }
    }

    pub fn put(&self, blob_id: &BlobId, store: &Arc<dyn BlobStore>) {
        let location = Location {
            store: Arc::downgrade(store),
            recorded: Instant::now(),
        };
        let mut entries = self.entries.lock().expect("lock poisoned");
        if !entries.contains(blob_id) && entries.len() >= self.capacity {
            if let Some((evicted, _)) = entries.pop_lru() {
                trace!(blob_id = %evicted, "evicting location");
            }
        }
        entries.put(blob_id.clone(), location);
    }

    /// Forget a location. No-op when absent.
    pub fn invalidate(&self, blob_id: &BlobId) {
        self.entries.lock().expect("lock poisoned").pop(blob_id);
    }

    pub fn clear(&self) {
        self.entries.lock().expect("lock poisoned").clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for LocationCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocationCache")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .field("ttl", &self.ttl)
            .finish()
    }
}
