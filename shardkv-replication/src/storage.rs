use std::error::Error;

use async_trait::async_trait;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// The result of acknowledging a pending entry.
pub enum PendingRemoval {
    /// The pending value matched and the entry has been removed.
    Removed,
    /// No entry is pending for the key.
    NotFound,
    /// An entry is pending for the key but with a different value.
    ///
    /// The entry is left in place.
    ValueMismatch,
}

#[async_trait]
/// The durable storage a shardkv node runs on.
///
/// A store holds two namespaces which are both keyed by the user key:
///
/// - The *primary* namespace, the current key to value state.
/// - The *pending* namespace, writes which no replica has acknowledged yet.
///
/// Every method must be atomic, a failed call leaves no partial write behind
/// in either namespace. Iteration and [Storage::first_pending] follow the
/// namespace's key order.
pub trait Storage {
    type Error: Error + Send + Sync + 'static;
    type KeysIter: Iterator<Item = String> + Send;

    /// Writes the key into the primary namespace and the pending namespace
    /// within one transaction.
    ///
    /// An existing pending entry for the key is overwritten.
    async fn put(&self, key: &str, value: &str) -> Result<(), Self::Error>;

    /// Writes the key into the primary namespace only.
    ///
    /// This is used by replicas to apply what they received from their leader,
    /// replicas never enqueue replicated writes again.
    async fn put_replicated(&self, key: &str, value: &str) -> Result<(), Self::Error>;

    /// Reads a key from the primary namespace.
    async fn get(&self, key: &str) -> Result<Option<String>, Self::Error>;

    /// Produces a snapshot of every key in the primary namespace.
    async fn iter_keys(&self) -> Result<Self::KeysIter, Self::Error>;

    /// Removes a set of keys from the primary namespace in one transaction.
    ///
    /// Keys which do not exist are ignored, the pending namespace is untouched.
    async fn multi_del(
        &self,
        keys: impl Iterator<Item = String> + Send,
    ) -> Result<(), Self::Error>;

    /// Returns the first entry of the pending namespace without removing it.
    async fn first_pending(&self) -> Result<Option<(String, String)>, Self::Error>;

    /// Removes the pending entry for `key` if its value is exactly `value`.
    async fn remove_pending(
        &self,
        key: &str,
        value: &str,
    ) -> Result<PendingRemoval, Self::Error>;

    /// Finishes any outstanding work and releases the store.
    ///
    /// Calls made after closing fail.
    async fn close(&self) -> Result<(), Self::Error> {
        Ok(())
    }
}

#[cfg(any(test, feature = "test-utils"))]
pub mod test_suite {
    use std::any::type_name;

    use crate::test_utils::InstrumentedStorage;
    use crate::{PendingRemoval, Storage};

    /// Runs the storage conformance suite against an empty store.
    pub async fn run_test_suite<S: Storage + Send + Sync + 'static>(storage: S) {
        info!("Starting test suite for storage: {}", type_name::<S>());

        let storage = InstrumentedStorage(storage);

        test_empty_store(&storage).await;
        info!("test_empty_store OK");

        test_put_and_get(&storage).await;
        info!("test_put_and_get OK");

        test_pending_log(&storage).await;
        info!("test_pending_log OK");

        test_pending_overwrite(&storage).await;
        info!("test_pending_overwrite OK");

        test_replicated_writes(&storage).await;
        info!("test_replicated_writes OK");

        test_iter_and_delete(&storage).await;
        info!("test_iter_and_delete OK");

        test_close(&storage).await;
        info!("test_close OK");
    }

    async fn drain_pending<S: Storage>(storage: &S) {
        while let Some((key, value)) =
            storage.first_pending().await.expect("Read pending entry.")
        {
            let res = storage
                .remove_pending(&key, &value)
                .await
                .expect("Remove pending entry.");
            assert_eq!(res, PendingRemoval::Removed);
        }
    }

    #[instrument(name = "test_empty_store", skip(storage))]
    async fn test_empty_store<S: Storage>(storage: &S) {
        let keys = storage.iter_keys().await.expect("Iterate keys.").count();
        assert_eq!(keys, 0, "New store should be empty.");

        let pending = storage.first_pending().await.expect("Read pending entry.");
        assert_eq!(pending, None, "New store should have nothing pending.");

        let value = storage.get("missing").await.expect("Get key.");
        assert_eq!(value, None);
    }

    #[instrument(name = "test_put_and_get", skip(storage))]
    async fn test_put_and_get<S: Storage>(storage: &S) {
        storage.put("USA", "Washington").await.expect("Put key.");
        let value = storage.get("USA").await.expect("Get key.");
        assert_eq!(value.as_deref(), Some("Washington"));

        storage.put("USA", "New York").await.expect("Overwrite key.");
        let value = storage.get("USA").await.expect("Get key.");
        assert_eq!(value.as_deref(), Some("New York"), "Last write should win.");

        drain_pending(storage).await;
        storage
            .multi_del(["USA".to_string()].into_iter())
            .await
            .expect("Delete key.");
    }

    #[instrument(name = "test_pending_log", skip(storage))]
    async fn test_pending_log<S: Storage>(storage: &S) {
        storage.put("key-b", "value-b").await.expect("Put key.");
        storage.put("key-a", "value-a").await.expect("Put key.");

        let pending = storage.first_pending().await.expect("Read pending entry.");
        assert_eq!(
            pending,
            Some(("key-a".to_string(), "value-a".to_string())),
            "Pending entries should follow key order."
        );

        // Reading must not consume the entry.
        let again = storage.first_pending().await.expect("Read pending entry.");
        assert_eq!(pending, again);

        let res = storage
            .remove_pending("key-a", "stale")
            .await
            .expect("Remove pending entry.");
        assert_eq!(res, PendingRemoval::ValueMismatch);
        let pending = storage.first_pending().await.expect("Read pending entry.");
        assert_eq!(
            pending,
            Some(("key-a".to_string(), "value-a".to_string())),
            "A mismatched acknowledgment must leave the entry in place."
        );

        let res = storage
            .remove_pending("key-c", "value-c")
            .await
            .expect("Remove pending entry.");
        assert_eq!(res, PendingRemoval::NotFound);

        let res = storage
            .remove_pending("key-a", "value-a")
            .await
            .expect("Remove pending entry.");
        assert_eq!(res, PendingRemoval::Removed);

        let pending = storage.first_pending().await.expect("Read pending entry.");
        assert_eq!(pending, Some(("key-b".to_string(), "value-b".to_string())));

        // Acknowledging never touches the primary namespace.
        let value = storage.get("key-a").await.expect("Get key.");
        assert_eq!(value.as_deref(), Some("value-a"));

        drain_pending(storage).await;
        storage
            .multi_del(["key-a".to_string(), "key-b".to_string()].into_iter())
            .await
            .expect("Delete keys.");
    }

    #[instrument(name = "test_pending_overwrite", skip(storage))]
    async fn test_pending_overwrite<S: Storage>(storage: &S) {
        storage.put("USA", "v1").await.expect("Put key.");
        storage.put("USA", "v2").await.expect("Put key.");

        let pending = storage.first_pending().await.expect("Read pending entry.");
        assert_eq!(pending, Some(("USA".to_string(), "v2".to_string())));

        let res = storage
            .remove_pending("USA", "v1")
            .await
            .expect("Remove pending entry.");
        assert_eq!(
            res,
            PendingRemoval::ValueMismatch,
            "Stale acknowledgment must not remove the newer write."
        );

        let res = storage
            .remove_pending("USA", "v2")
            .await
            .expect("Remove pending entry.");
        assert_eq!(res, PendingRemoval::Removed);
        assert_eq!(storage.first_pending().await.expect("Read pending."), None);

        storage
            .multi_del(["USA".to_string()].into_iter())
            .await
            .expect("Delete key.");
    }

    #[instrument(name = "test_replicated_writes", skip(storage))]
    async fn test_replicated_writes<S: Storage>(storage: &S) {
        storage
            .put_replicated("USA", "Washington")
            .await
            .expect("Put replicated key.");
        // Applying the same entry again is harmless.
        storage
            .put_replicated("USA", "Washington")
            .await
            .expect("Put replicated key.");

        let value = storage.get("USA").await.expect("Get key.");
        assert_eq!(value.as_deref(), Some("Washington"));

        let pending = storage.first_pending().await.expect("Read pending entry.");
        assert_eq!(pending, None, "Replicated writes must not be enqueued.");

        storage
            .multi_del(["USA".to_string()].into_iter())
            .await
            .expect("Delete key.");
    }

    #[instrument(name = "test_iter_and_delete", skip(storage))]
    async fn test_iter_and_delete<S: Storage>(storage: &S) {
        for key in ["key-3", "key-1", "key-2"] {
            storage.put(key, "value").await.expect("Put key.");
        }

        let keys = storage.iter_keys().await.expect("Iterate keys.").collect::<Vec<_>>();
        assert_eq!(keys, ["key-1", "key-2", "key-3"]);

        storage
            .multi_del(["key-1".to_string(), "missing".to_string()].into_iter())
            .await
            .expect("Delete keys.");

        let keys = storage.iter_keys().await.expect("Iterate keys.").collect::<Vec<_>>();
        assert_eq!(keys, ["key-2", "key-3"]);
        assert_eq!(storage.get("key-1").await.expect("Get key."), None);

        let pending = storage.first_pending().await.expect("Read pending entry.");
        assert_eq!(
            pending,
            Some(("key-1".to_string(), "value".to_string())),
            "Deleting from the primary namespace must not touch pending entries."
        );

        drain_pending(storage).await;
        storage
            .multi_del(["key-2".to_string(), "key-3".to_string()].into_iter())
            .await
            .expect("Delete keys.");
    }

    #[instrument(name = "test_close", skip(storage))]
    async fn test_close<S: Storage + Sync>(storage: &S) {
        storage.close().await.expect("Close store.");

        let res = storage.get("USA").await;
        assert!(res.is_err(), "Closed store should reject calls.");
    }
}
