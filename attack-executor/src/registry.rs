use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::{OnceCell, RwLock};

/// Per key cache of live objects, created on first use.
///
/// Concurrent first lookups of the same key run the initializer once, the others wait for its
/// result. A failed initialization isn't cached, the next lookup tries again.
pub struct Registry<K, V> {
    entries: RwLock<HashMap<K, Arc<OnceCell<V>>>>,
}

impl<K, V> Default for Registry<K, V> {
    fn default() -> Self {
        Registry {
            entries: RwLock::default(),
        }
    }
}

impl<K, V> Registry<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_or_try_init<F, Fut, E>(&self, key: &K, init: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let cell = self.cell(key).await;
        let value = cell.get_or_try_init(init).await?;
        Ok(value.clone())
    }

    async fn cell(&self, key: &K) -> Arc<OnceCell<V>> {
        {
            if let Some(cell) = self.entries.read().await.get(key) {
                return cell.clone();
            }
        }
        let mut write_guard = self.entries.write().await;
        //check again, another task may have added the key meanwhile
        write_guard
            .entry(key.clone())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone()
    }

    /// Drop the value of `key` if `predicate` holds for it, so the next lookup creates a new one
    pub async fn remove_if<P>(&self, key: &K, predicate: P) -> bool
    where
        P: FnOnce(&V) -> bool,
    {
        let mut write_guard = self.entries.write().await;
        let matched = write_guard
            .get(key)
            .and_then(|cell| cell.get())
            .map(predicate)
            .unwrap_or(false);
        if matched {
            write_guard.remove(key);
        }
        matched
    }

    /// Number of initialized entries
    pub async fn len(&self) -> usize {
        self.entries
            .read()
            .await
            .values()
            .filter(|cell| cell.initialized())
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
