use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Mutex;

/// Bounded least-recently-used cache safe to share across request tasks.
///
/// Capacities here are small (tens of entries), so eviction does a linear
/// scan for the oldest entry instead of maintaining a linked list.
pub struct LruCache<K, V> {
    inner: Mutex<Inner<K, V>>,
}

struct Inner<K, V> {
    capacity: usize,
    tick: u64,
    entries: HashMap<K, (V, u64)>,
}

impl<K, V> LruCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                capacity: capacity.max(1),
                tick: 0,
                entries: HashMap::with_capacity(capacity),
            }),
        }
    }

    /// Look up `key`, marking it as recently used. A poisoned lock is a miss.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut inner = self.inner.lock().ok()?;
        inner.tick += 1;
        let tick = inner.tick;
        let (value, last_used) = inner.entries.get_mut(key)?;
        *last_used = tick;
        Some(value.clone())
    }

    pub fn insert(&self, key: K, value: V) {
        let Ok(mut inner) = self.inner.lock() else {
            return;
        };
        inner.tick += 1;
        let tick = inner.tick;

        if !inner.entries.contains_key(&key) && inner.entries.len() >= inner.capacity {
            let oldest = inner
                .entries
                .iter()
                .min_by_key(|(_, (_, last_used))| *last_used)
                .map(|(k, _)| k.clone());
            if let Some(oldest) = oldest {
                inner.entries.remove(&oldest);
            }
        }

        inner.entries.insert(key, (value, tick));
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|inner| inner.entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
