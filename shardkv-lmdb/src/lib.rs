//! # shardkv LMDB
//!
//! A [Storage] implementation for shardkv nodes on top of LMDB.
//!
//! Both namespaces live in one LMDB environment as two named databases,
//! `kv` for the primary namespace and `replica` for pending writes. This
//! lets a local write land in both within a single transaction.

#[macro_use]
extern crate tracing;

mod db;

use std::io;
use std::path::Path;

use async_trait::async_trait;
pub use db::{StorageHandle, DEFAULT_MAP_SIZE, MAX_KEY_SIZE, PENDING_DB, PRIMARY_DB};
use shardkv_replication::{PendingRemoval, Storage};

#[derive(Debug, thiserror::Error)]
pub enum LmdbStorageError {
    #[error("LMDB error: {0}")]
    Heed(#[from] heed::Error),

    #[error("Failed to prepare the database directory: {0}")]
    Io(#[from] io::Error),

    #[error("The storage has been closed")]
    Closed,

    #[error("Key of {len} bytes exceeds the maximum key size of {max} bytes")]
    KeyTooLong { len: usize, max: usize },
}

pub struct LmdbStorage {
    db: StorageHandle,
}

impl LmdbStorage {
    /// Opens or creates the LMDB database in the given directory.
    ///
    /// This spawns 1 background thread with actions being executed within that thread.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, LmdbStorageError> {
        let db = StorageHandle::open(path).await?;

        Ok(Self { db })
    }

    /// Opens or creates the LMDB database with the given maximum size in bytes.
    ///
    /// See [StorageHandle::open_with_map_size].
    pub async fn open_with_map_size(
        path: impl AsRef<Path>,
        map_size: usize,
    ) -> Result<Self, LmdbStorageError> {
        let db = StorageHandle::open_with_map_size(path, map_size).await?;

        Ok(Self { db })
    }

    /// Access to the LMDB storage handle.
    pub fn handle(&self) -> &StorageHandle {
        &self.db
    }
}

#[async_trait]
impl Storage for LmdbStorage {
    type Error = LmdbStorageError;
    type KeysIter = std::vec::IntoIter<String>;

    async fn put(&self, key: &str, value: &str) -> Result<(), Self::Error> {
        self.handle().put_with_pending(key, value).await
    }

    async fn put_replicated(&self, key: &str, value: &str) -> Result<(), Self::Error> {
        self.handle().put_primary(key, value).await
    }

    async fn get(&self, key: &str) -> Result<Option<String>, Self::Error> {
        self.handle().get(key).await
    }

    async fn iter_keys(&self) -> Result<Self::KeysIter, Self::Error> {
        self.handle().keys().await.map(|keys| keys.into_iter())
    }

    async fn multi_del(
        &self,
        keys: impl Iterator<Item = String> + Send,
    ) -> Result<(), Self::Error> {
        self.handle().delete_many(keys).await
    }

    async fn first_pending(&self) -> Result<Option<(String, String)>, Self::Error> {
        self.handle().first_pending().await
    }

    async fn remove_pending(
        &self,
        key: &str,
        value: &str,
    ) -> Result<PendingRemoval, Self::Error> {
        self.handle().remove_pending(key, value).await
    }

    async fn close(&self) -> Result<(), Self::Error> {
        self.handle().close().await
    }
}
