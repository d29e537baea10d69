use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::{Mutex as TokioMutex, OwnedMutexGuard};

struct Entry {
    lock: Arc<TokioMutex<()>>,
    // Holders plus waiters. The map entry is removed when this drops to zero
    // so that idle channels cost nothing.
    refs: usize,
}

/// A keyed mutex: mutual exclusion per key, with no blocking between
/// distinct keys. Locks are acquired with [`Kmutex::lock`] and released by
/// dropping the returned guard.
#[derive(Clone)]
pub struct Kmutex<K: Eq + Hash + Clone> {
    entries: Arc<StdMutex<HashMap<K, Entry>>>,
}

impl<K: Eq + Hash + Clone> Default for Kmutex<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Eq + Hash + Clone> Kmutex<K> {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(StdMutex::new(HashMap::new())),
        }
    }

    /// Acquires the mutex for the given key, creating it if absent.
    pub async fn lock(&self, key: K) -> KmutexGuard<K> {
        let lock = {
            let mut entries = self.entries.lock().expect("kmutex map poisoned");
            let entry = entries.entry(key.clone()).or_insert_with(|| Entry {
                lock: Arc::new(TokioMutex::new(())),
                refs: 0,
            });
            entry.refs += 1;
            Arc::clone(&entry.lock)
        };
        let guard = lock.lock_owned().await;
        KmutexGuard {
            entries: Arc::clone(&self.entries),
            key,
            _guard: guard,
        }
    }

    #[cfg(test)]
    fn entry_count(&self) -> usize {
        self.entries.lock().expect("kmutex map poisoned").len()
    }
}

pub struct KmutexGuard<K: Eq + Hash + Clone> {
    entries: Arc<StdMutex<HashMap<K, Entry>>>,
    key: K,
    _guard: OwnedMutexGuard<()>,
}

impl<K: Eq + Hash + Clone> Drop for KmutexGuard<K> {
    fn drop(&mut self) {
        let mut entries = self.entries.lock().expect("kmutex map poisoned");
        if let Some(entry) = entries.get_mut(&self.key) {
            entry.refs -= 1;
            if entry.refs == 0 {
                entries.remove(&self.key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use super::Kmutex;

    #[tokio::test]
    async fn same_key_excludes() {
        let kmutex = Kmutex::new();
        let in_section = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let kmutex = kmutex.clone();
            let in_section = Arc::clone(&in_section);
            let max_seen = Arc::clone(&max_seen);
            handles.push(tokio::spawn(async move {
                let _guard = kmutex.lock(1u32).await;
                let now = in_section.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                in_section.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
        assert_eq!(kmutex.entry_count(), 0);
    }

    #[tokio::test]
    async fn distinct_keys_run_in_parallel() {
        let kmutex = Kmutex::new();
        let guard_a = kmutex.lock(1u32).await;

        // A second key must not be blocked by the first one being held.
        let guard_b = tokio::time::timeout(Duration::from_millis(50), kmutex.lock(2u32))
            .await
            .expect("lock on a distinct key should not block");

        drop(guard_a);
        drop(guard_b);
        assert_eq!(kmutex.entry_count(), 0);
    }

    #[tokio::test]
    async fn entry_removed_on_last_release() {
        let kmutex = Kmutex::new();
        {
            let _guard = kmutex.lock([7u8; 32]).await;
            assert_eq!(kmutex.entry_count(), 1);
        }
        assert_eq!(kmutex.entry_count(), 0);
    }
}
