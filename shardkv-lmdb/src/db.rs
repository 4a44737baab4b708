use std::path::Path;

use flume::{self, Receiver, Sender};
use futures::channel::oneshot;
use heed::types::Str;
use heed::{Database, Env, EnvOpenOptions};
use shardkv_replication::PendingRemoval;

use crate::LmdbStorageError;

type KvDB = Database<Str, Str>;
type Task = Box<dyn FnOnce(&Env, &Namespaces) + Send + 'static>;

/// The default upper bound of the database size.
///
/// The map is reserved as virtual memory, the file only grows as data is
/// written.
#[cfg(target_pointer_width = "64")]
pub const DEFAULT_MAP_SIZE: usize = 4 << 30;
#[cfg(not(target_pointer_width = "64"))]
pub const DEFAULT_MAP_SIZE: usize = 1 << 30;
/// The longest key in bytes LMDB accepts with its default page layout.
pub const MAX_KEY_SIZE: usize = 511;

const MAX_NUM_DBS: u32 = 2;
const CAPACITY: usize = 10;
// Map sizes are rounded up to this, a multiple of every common page size.
const MAP_SIZE_ALIGN: usize = 1 << 20;

/// The name of the primary key to value database.
pub const PRIMARY_DB: &str = "kv";
/// The name of the database holding writes waiting for a replica.
pub const PENDING_DB: &str = "replica";

struct Namespaces {
    primary: KvDB,
    pending: KvDB,
}

enum Op {
    Run(Task),
    Close(oneshot::Sender<()>),
}

#[derive(Debug, Clone)]
/// A asynchronous wrapper around a LMDB database.
///
/// These operations will be ran in a background thread preventing
/// any IO operations from blocking the async context.
pub struct StorageHandle {
    tx: Sender<Op>,
}

impl StorageHandle {
    /// Opens the LMDB environment at the given directory.
    ///
    /// This spawns 1 background thread with every operation being executed
    /// within that thread, one after another.
    ///
    /// If the database does not already exist it will be created.
    ///
    /// ```rust
    /// use shardkv_lmdb::StorageHandle;
    ///
    /// # #[tokio::main]
    /// # async fn main() {
    /// let storage = StorageHandle::open("./my-shard-data").await.expect("Create database");
    /// # drop(storage);
    /// # let _ = std::fs::remove_dir_all("./my-shard-data");
    /// # }
    /// ```
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, LmdbStorageError> {
        Self::open_with_map_size(path, DEFAULT_MAP_SIZE).await
    }

    /// Opens the LMDB environment with the given maximum size in bytes.
    ///
    /// The size is rounded up to a whole number of MiB. Once the map is
    /// full, writes fail until the store is reopened with a larger size.
    pub async fn open_with_map_size(
        path: impl AsRef<Path>,
        map_size: usize,
    ) -> Result<Self, LmdbStorageError> {
        let tx = setup_database(path, align_map_size(map_size)).await?;
        Ok(Self { tx })
    }

    /// Writes the key into both databases within one transaction.
    pub(crate) async fn put_with_pending(
        &self,
        key: &str,
        value: &str,
    ) -> Result<(), LmdbStorageError> {
        check_key(key)?;
        let key = key.to_owned();
        let value = value.to_owned();

        self.submit_task(move |env, dbs| {
            let mut txn = env.write_txn()?;
            dbs.primary.put(&mut txn, &key, &value)?;
            dbs.pending.put(&mut txn, &key, &value)?;
            txn.commit()?;
            Ok(())
        })
        .await
    }

    /// Writes the key into the primary database only.
    pub(crate) async fn put_primary(
        &self,
        key: &str,
        value: &str,
    ) -> Result<(), LmdbStorageError> {
        check_key(key)?;
        let key = key.to_owned();
        let value = value.to_owned();

        self.submit_task(move |env, dbs| {
            let mut txn = env.write_txn()?;
            dbs.primary.put(&mut txn, &key, &value)?;
            txn.commit()?;
            Ok(())
        })
        .await
    }

    pub(crate) async fn get(&self, key: &str) -> Result<Option<String>, LmdbStorageError> {
        if key.len() > MAX_KEY_SIZE {
            return Ok(None);
        }

        let key = key.to_owned();

        self.submit_task(move |env, dbs| {
            let txn = env.read_txn()?;
            let value = dbs.primary.get(&txn, &key)?.map(ToOwned::to_owned);
            Ok(value)
        })
        .await
    }

    /// Collects every key of the primary database in key order.
    pub(crate) async fn keys(&self) -> Result<Vec<String>, LmdbStorageError> {
        self.submit_task(move |env, dbs| {
            let mut keys = Vec::new();
            let txn = env.read_txn()?;

            for pair in dbs.primary.iter(&txn)? {
                let (key, _) = pair?;
                keys.push(key.to_owned());
            }

            Ok(keys)
        })
        .await
    }

    /// Removes many keys from the primary database within one transaction.
    pub(crate) async fn delete_many(
        &self,
        keys: impl Iterator<Item = String>,
    ) -> Result<(), LmdbStorageError> {
        // Keys above the limit can never have been stored.
        let keys = Vec::from_iter(keys.filter(|key| key.len() <= MAX_KEY_SIZE));

        self.submit_task(move |env, dbs| {
            let mut txn = env.write_txn()?;
            for key in keys {
                dbs.primary.delete(&mut txn, &key)?; // Missing keys are skipped.
            }
            txn.commit()?;
            Ok(())
        })
        .await
    }

    /// Gets the first pending entry by key order.
    pub(crate) async fn first_pending(
        &self,
    ) -> Result<Option<(String, String)>, LmdbStorageError> {
        self.submit_task(move |env, dbs| {
            let txn = env.read_txn()?;
            let entry = dbs
                .pending
                .first(&txn)?
                .map(|(key, value)| (key.to_owned(), value.to_owned()));
            Ok(entry)
        })
        .await
    }

    /// Removes the pending entry if it still holds the given value.
    pub(crate) async fn remove_pending(
        &self,
        key: &str,
        value: &str,
    ) -> Result<PendingRemoval, LmdbStorageError> {
        if key.len() > MAX_KEY_SIZE {
            return Ok(PendingRemoval::NotFound);
        }

        let key = key.to_owned();
        let value = value.to_owned();

        self.submit_task(move |env, dbs| {
            let mut txn = env.write_txn()?;

            let matches = match dbs.pending.get(&txn, &key)? {
                None => return Ok(PendingRemoval::NotFound),
                Some(pending) => pending == value,
            };

            if !matches {
                return Ok(PendingRemoval::ValueMismatch);
            }

            dbs.pending.delete(&mut txn, &key)?;
            txn.commit()?;
            Ok(PendingRemoval::Removed)
        })
        .await
    }

    /// Stops the background thread once every queued operation has run.
    ///
    /// Any operation submitted afterwards fails with [LmdbStorageError::Closed].
    pub async fn close(&self) -> Result<(), LmdbStorageError> {
        let (tx, rx) = oneshot::channel();

        self.tx
            .send_async(Op::Close(tx))
            .await
            .map_err(|_| LmdbStorageError::Closed)?;

        rx.await.map_err(|_| LmdbStorageError::Closed)
    }

    /// Submits a task to execute on the KV store.
    async fn submit_task<CB, T>(&self, inner: CB) -> Result<T, LmdbStorageError>
    where
        T: Send + 'static,
        CB: FnOnce(&Env, &Namespaces) -> heed::Result<T> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();

        let cb = move |env: &Env, dbs: &Namespaces| {
            let _ = tx.send(inner(env, dbs));
        };

        self.tx
            .send_async(Op::Run(Box::new(cb)))
            .await
            .map_err(|_| LmdbStorageError::Closed)?;

        let res = rx.await.map_err(|_| LmdbStorageError::Closed)?;
        Ok(res?)
    }
}

fn check_key(key: &str) -> Result<(), LmdbStorageError> {
    if key.len() > MAX_KEY_SIZE {
        return Err(LmdbStorageError::KeyTooLong {
            len: key.len(),
            max: MAX_KEY_SIZE,
        });
    }
    Ok(())
}

fn align_map_size(map_size: usize) -> usize {
    let units = map_size / MAP_SIZE_ALIGN + usize::from(map_size % MAP_SIZE_ALIGN != 0);
    units.max(1).saturating_mul(MAP_SIZE_ALIGN)
}

async fn setup_database(
    path: impl AsRef<Path>,
    map_size: usize,
) -> Result<Sender<Op>, LmdbStorageError> {
    let path = path.as_ref().to_path_buf();
    let (tx, rx) = flume::bounded(CAPACITY);

    tokio::task::spawn_blocking(move || setup_disk_handle(&path, map_size, rx))
        .await
        .map_err(|_| LmdbStorageError::Closed)??;

    Ok(tx)
}

fn setup_disk_handle(
    path: &Path,
    map_size: usize,
    ops: Receiver<Op>,
) -> Result<(), LmdbStorageError> {
    std::fs::create_dir_all(path)?;

    let env = EnvOpenOptions::new()
        .map_size(map_size)
        .max_dbs(MAX_NUM_DBS)
        .open(path)?;

    let mut txn = env.write_txn()?;
    let primary = env.create_database(&mut txn, Some(PRIMARY_DB))?;
    let pending = env.create_database(&mut txn, Some(PENDING_DB))?;
    txn.commit()?;

    debug!(path = %path.display(), map_size = map_size, "Opened LMDB environment.");

    let dbs = Namespaces { primary, pending };
    std::thread::spawn(move || run_ops(env, ops, dbs));

    Ok(())
}

/// Runs all operations received until the store is closed or every
/// handle is dropped.
fn run_ops(env: Env, ops: Receiver<Op>, dbs: Namespaces) {
    let mut on_closed = None;
    while let Ok(op) = ops.recv() {
        match op {
            Op::Run(task) => (task)(&env, &dbs),
            Op::Close(done) => {
                on_closed = Some(done);
                break;
            },
        }
    }

    // The environment must be released before a caller may reopen the path.
    drop(ops);
    drop(dbs);
    drop(env);
    debug!("LMDB background thread exited.");

    if let Some(done) = on_closed {
        let _ = done.send(());
    }
}
