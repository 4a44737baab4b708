use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::{PendingRemoval, Storage};

/// A wrapping type around another `Storage` implementation that
/// logs all the activity going into and out of the store.
///
/// This is a very useful system for debugging issues with your store.
pub struct InstrumentedStorage<S: Storage>(pub S);

impl<S: Storage + Clone> Clone for InstrumentedStorage<S> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

#[async_trait::async_trait]
impl<S: Storage + Send + Sync + 'static> Storage for InstrumentedStorage<S> {
    type Error = S::Error;
    type KeysIter = S::KeysIter;

    async fn put(&self, key: &str, value: &str) -> Result<(), Self::Error> {
        info!(key = key, value = value, "put");
        self.0.put(key, value).await
    }

    async fn put_replicated(&self, key: &str, value: &str) -> Result<(), Self::Error> {
        info!(key = key, value = value, "put_replicated");
        self.0.put_replicated(key, value).await
    }

    async fn get(&self, key: &str) -> Result<Option<String>, Self::Error> {
        info!(key = key, "get");
        self.0.get(key).await
    }

    async fn iter_keys(&self) -> Result<Self::KeysIter, Self::Error> {
        info!("iter_keys");
        self.0.iter_keys().await
    }

    async fn multi_del(
        &self,
        keys: impl Iterator<Item = String> + Send,
    ) -> Result<(), Self::Error> {
        let keys = keys.collect::<Vec<_>>();
        info!(keys = ?keys, "multi_del");
        self.0.multi_del(keys.into_iter()).await
    }

    async fn first_pending(&self) -> Result<Option<(String, String)>, Self::Error> {
        info!("first_pending");
        self.0.first_pending().await
    }

    async fn remove_pending(
        &self,
        key: &str,
        value: &str,
    ) -> Result<PendingRemoval, Self::Error> {
        info!(key = key, value = value, "remove_pending");
        self.0.remove_pending(key, value).await
    }

    async fn close(&self) -> Result<(), Self::Error> {
        info!("close");
        self.0.close().await
    }
}

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct MockError(pub String);

#[derive(Debug, Default)]
struct MemState {
    primary: BTreeMap<String, String>,
    pending: BTreeMap<String, String>,
}

#[derive(Debug, Default, Clone)]
/// A in memory storage implementation.
///
/// Clones share the same state, which lets tests inspect the store a node
/// is running on.
pub struct MemStore {
    state: Arc<RwLock<MemState>>,
    closed: Arc<AtomicBool>,
    fail_writes: Arc<AtomicBool>,
}

impl MemStore {
    /// Makes every following write fail until reset.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::Relaxed);
    }

    /// Returns a copy of the pending namespace.
    pub fn pending_entries(&self) -> BTreeMap<String, String> {
        self.state.read().pending.clone()
    }

    /// Returns a copy of the primary namespace.
    pub fn primary_entries(&self) -> BTreeMap<String, String> {
        self.state.read().primary.clone()
    }

    fn check_open(&self) -> Result<(), MockError> {
        if self.closed.load(Ordering::Relaxed) {
            return Err(MockError("store is closed".to_string()));
        }
        Ok(())
    }

    fn check_writable(&self) -> Result<(), MockError> {
        self.check_open()?;
        if self.fail_writes.load(Ordering::Relaxed) {
            return Err(MockError("injected write failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl Storage for MemStore {
    type Error = MockError;
    type KeysIter = std::vec::IntoIter<String>;

    async fn put(&self, key: &str, value: &str) -> Result<(), Self::Error> {
        self.check_writable()?;
        let mut state = self.state.write();
        state.primary.insert(key.to_string(), value.to_string());
        state.pending.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn put_replicated(&self, key: &str, value: &str) -> Result<(), Self::Error> {
        self.check_writable()?;
        self.state
            .write()
            .primary
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, Self::Error> {
        self.check_open()?;
        Ok(self.state.read().primary.get(key).cloned())
    }

    async fn iter_keys(&self) -> Result<Self::KeysIter, Self::Error> {
        self.check_open()?;
        let keys = self.state.read().primary.keys().cloned().collect::<Vec<_>>();
        Ok(keys.into_iter())
    }

    async fn multi_del(
        &self,
        keys: impl Iterator<Item = String> + Send,
    ) -> Result<(), Self::Error> {
        self.check_writable()?;
        let mut state = self.state.write();
        for key in keys {
            state.primary.remove(&key);
        }
        Ok(())
    }

    async fn first_pending(&self) -> Result<Option<(String, String)>, Self::Error> {
        self.check_open()?;
        let state = self.state.read();
        Ok(state
            .pending
            .iter()
            .next()
            .map(|(key, value)| (key.clone(), value.clone())))
    }

    async fn remove_pending(
        &self,
        key: &str,
        value: &str,
    ) -> Result<PendingRemoval, Self::Error> {
        self.check_writable()?;
        let mut state = self.state.write();
        let matches = match state.pending.get(key) {
            None => return Ok(PendingRemoval::NotFound),
            Some(pending) => pending == value,
        };

        if !matches {
            return Ok(PendingRemoval::ValueMismatch);
        }

        state.pending.remove(key);
        Ok(PendingRemoval::Removed)
    }

    async fn close(&self) -> Result<(), Self::Error> {
        self.closed.store(true, Ordering::Relaxed);
        Ok(())
    }
}
