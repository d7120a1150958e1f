use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

use tracing::{debug, info, warn};

use crate::bucket::Bucket;
use crate::error::{StoreError, StoreResult};
use crate::snapshot;
use crate::tx::Tx;
use crate::wal::{self, CommitLog, WalConfig};

/// Handle to an open database.
///
/// `Db` is `Send + Sync`; share it behind an `Arc` and open one
/// transaction per unit of work.
pub struct Db {
    path: Option<PathBuf>,
    committed: RwLock<Arc<Bucket>>,
    log: Option<Mutex<CommitLog>>,
    writer: Mutex<()>,
}

impl Db {
    /// Create a database that lives only in memory.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            committed: RwLock::new(Arc::new(Bucket::new())),
            log: None,
            writer: Mutex::new(()),
        }
    }

    /// Open the database file at `path`, creating an empty database if the
    /// file does not exist yet.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        Self::open_with(path, WalConfig::default())
    }

    /// [`Db::open`] with explicit commit log tuning.
    ///
    /// The snapshot at `path` is loaded first and the commit log next to it
    /// is replayed on top.
    pub fn open_with(path: impl AsRef<Path>, config: WalConfig) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        let (seq, mut root, size) = match snapshot::load(&path)? {
            Some(image) => {
                info!(path = %path.display(), buckets = image.root.len(), "opened database");
                (image.seq, image.root, image.size)
            }
            None => {
                info!(path = %path.display(), "creating new database");
                let root = Bucket::new();
                let size = snapshot::store(&path, 0, &root)?;
                (0, root, size)
            }
        };

        let log_path = wal::log_path(&path);
        let (log, replay) = CommitLog::open(&log_path, &mut root, seq, size, config)?;
        if replay.applied > 0 {
            info!(
                path = %log_path.display(),
                commits = replay.applied,
                seq = replay.seq,
                "replayed commit log"
            );
        }

        Ok(Self {
            path: Some(path),
            committed: RwLock::new(Arc::new(root)),
            log: Some(Mutex::new(log)),
            writer: Mutex::new(()),
        })
    }

    /// Backing file, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Begin a transaction.
    ///
    /// A writable transaction blocks until any other writer has finished.
    pub fn begin(&self, writable: bool) -> Tx<'_> {
        if writable {
            let guard = self.writer.lock().expect("writer lock poisoned");
            let root = self.snapshot().as_ref().clone();
            Tx::write(self, root, guard)
        } else {
            Tx::read(self, self.snapshot())
        }
    }

    /// Run `f` inside a read-only transaction.
    pub fn view<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&Tx<'_>) -> Result<T, E>,
    {
        let tx = self.begin(false);
        f(&tx)
    }

    /// Run `f` inside a writable transaction.
    ///
    /// The transaction commits if `f` returns `Ok` and rolls back if it
    /// returns `Err`. A failed commit is reported as the error.
    pub fn update<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut Tx<'_>) -> Result<T, E>,
        E: From<StoreError>,
    {
        let mut tx = self.begin(true);
        match f(&mut tx) {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            Err(e) => {
                tx.rollback();
                Err(e)
            }
        }
    }

    /// Fold the commit log into a fresh snapshot and empty the log.
    ///
    /// Waits for any running writer. A no-op for in-memory databases.
    pub fn compact(&self) -> StoreResult<()> {
        let Some(log) = &self.log else {
            return Ok(());
        };
        let _writer = self.writer.lock().expect("writer lock poisoned");
        let mut log = log.lock().expect("commit log mutex poisoned");
        let root = self.snapshot();
        self.compact_locked(&mut log, &root)
    }

    fn snapshot(&self) -> Arc<Bucket> {
        Arc::clone(&self.committed.read().expect("snapshot lock poisoned"))
    }

    fn compact_locked(&self, log: &mut CommitLog, root: &Bucket) -> StoreResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let folded = log.len();
        let size = snapshot::store(path, log.seq(), root)?;
        log.reset(size)?;
        debug!(path = %path.display(), seq = log.seq(), folded, size, "snapshot written");
        Ok(())
    }

    /// Make `root` the committed tree. Called with the writer lock held.
    ///
    /// On a file-backed database the changes are logged and synced before
    /// the tree becomes visible. If logging fails nothing is published.
    pub(crate) fn install(&self, root: Bucket) -> StoreResult<()> {
        if let Some(log) = &self.log {
            let mut log = log.lock().expect("commit log mutex poisoned");
            let changes = wal::diff(&self.snapshot(), &root)?;
            if !changes.is_empty() {
                log.append(changes)?;
                if log.should_compact() {
                    if let Err(e) = self.compact_locked(&mut log, &root) {
                        warn!(error = %e, "compaction failed; keeping commit log");
                    }
                }
            }
        }
        *self.committed.write().expect("snapshot lock poisoned") = Arc::new(root);
        Ok(())
    }
}

impl std::fmt::Debug for Db {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Db")
            .field("path", &self.path)
            .field("buckets", &self.snapshot().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use std::thread;

    fn seeded() -> Db {
        let db = Db::in_memory();
        db.update(|tx| -> StoreResult<()> {
            tx.create_bucket_if_not_exists(b"data")?
                .put(b"k", Bytes::from_static(b"v1"))
        })
        .unwrap();
        db
    }

    #[test]
    fn update_commits_on_ok() {
        let db = seeded();
        let value = db
            .view(|tx| -> StoreResult<_> { Ok(tx.bucket(b"data").and_then(|b| b.get(b"k").cloned())) })
            .unwrap();
        assert_eq!(value.as_deref(), Some(&b"v1"[..]));
    }

    #[test]
    fn update_rolls_back_on_err() {
        let db = seeded();
        let result = db.update(|tx| -> StoreResult<()> {
            tx.bucket_mut(b"data")?
                .expect("bucket exists")
                .put(b"k", Bytes::from_static(b"v2"))?;
            Err(StoreError::EmptyKey)
        });
        assert!(result.is_err());

        let tx = db.begin(false);
        assert_eq!(tx.bucket(b"data").unwrap().get(b"k").unwrap().as_ref(), b"v1");
    }

    #[test]
    fn dropped_writer_discards_changes() {
        let db = seeded();
        {
            let mut tx = db.begin(true);
            tx.create_bucket_if_not_exists(b"scratch").unwrap();
        }
        assert!(db.begin(false).bucket(b"scratch").is_none());
    }

    #[test]
    fn read_only_tx_rejects_mutation() {
        let db = seeded();
        let mut tx = db.begin(false);
        assert!(!tx.writable());
        assert!(matches!(
            tx.create_bucket_if_not_exists(b"x"),
            Err(StoreError::TxNotWritable)
        ));
        assert!(matches!(tx.commit(), Err(StoreError::TxNotWritable)));
    }

    #[test]
    fn readers_keep_their_snapshot() {
        let db = seeded();
        let reader = db.begin(false);

        db.update(|tx| -> StoreResult<()> {
            tx.bucket_mut(b"data")?
                .expect("bucket exists")
                .put(b"k", Bytes::from_static(b"v2"))
        })
        .unwrap();

        assert_eq!(reader.bucket(b"data").unwrap().get(b"k").unwrap().as_ref(), b"v1");
        let fresh = db.begin(false);
        assert_eq!(fresh.bucket(b"data").unwrap().get(b"k").unwrap().as_ref(), b"v2");
    }

    #[test]
    fn writers_are_serialized() {
        let db = Arc::new(Db::in_memory());
        db.update(|tx| -> StoreResult<()> {
            tx.create_bucket_if_not_exists(b"c")?
                .put(b"n", Bytes::copy_from_slice(&0u64.to_le_bytes()))
        })
        .unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let db = Arc::clone(&db);
                thread::spawn(move || {
                    for _ in 0..50 {
                        db.update(|tx| -> StoreResult<()> {
                            let bucket = tx.bucket_mut(b"c")?.expect("bucket exists");
                            let current = bucket.get(b"n").expect("counter exists");
                            let mut raw = [0u8; 8];
                            raw.copy_from_slice(current);
                            let next = u64::from_le_bytes(raw) + 1;
                            bucket.put(b"n", Bytes::copy_from_slice(&next.to_le_bytes()))
                        })
                        .unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let tx = db.begin(false);
        let raw = tx.bucket(b"c").unwrap().get(b"n").unwrap();
        let mut buf = [0u8; 8];
        buf.copy_from_slice(raw);
        assert_eq!(u64::from_le_bytes(buf), 400);
    }

    #[test]
    fn file_backed_db_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bkt.db");
        {
            let db = Db::open(&path).unwrap();
            db.update(|tx| -> StoreResult<()> {
                tx.create_bucket_if_not_exists(b"/")?
                    .create_bucket_if_not_exists(b"nested")?
                    .put(b"leaf", Bytes::from_static(b"hello"))
            })
            .unwrap();
        }
        let db = Db::open(&path).unwrap();
        let tx = db.begin(false);
        let leaf = tx
            .bucket(b"/")
            .and_then(|b| b.bucket(b"nested"))
            .and_then(|b| b.get(b"leaf"))
            .cloned();
        assert_eq!(leaf.as_deref(), Some(&b"hello"[..]));
    }

    #[test]
    fn rolled_back_writes_never_reach_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bkt.db");
        {
            let db = Db::open(&path).unwrap();
            db.update(|tx| -> StoreResult<()> {
                tx.create_bucket_if_not_exists(b"kept")?;
                Ok(())
            })
            .unwrap();
            let _ = db.update(|tx| -> StoreResult<()> {
                tx.create_bucket_if_not_exists(b"discarded")?;
                Err(StoreError::EmptyKey)
            });
        }
        let db = Db::open(&path).unwrap();
        let tx = db.begin(false);
        assert!(tx.bucket(b"kept").is_some());
        assert!(tx.bucket(b"discarded").is_none());
    }

    fn file_len(path: &Path) -> u64 {
        std::fs::metadata(path).unwrap().len()
    }

    #[test]
    fn commit_logs_only_what_changed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bkt.db");
        let db = Db::open(&path).unwrap();
        db.update(|tx| -> StoreResult<()> {
            let bulk = tx.create_bucket_if_not_exists(b"bulk")?;
            for i in 0..64u32 {
                bulk.put(&i.to_be_bytes(), Bytes::from(vec![7u8; 4096]))?;
            }
            Ok(())
        })
        .unwrap();
        let snapshot_len = file_len(&path);
        let log_len = file_len(&wal::log_path(&path));
        assert!(log_len > 64 * 4096);

        db.update(|tx| -> StoreResult<()> {
            tx.create_bucket_if_not_exists(b"small")?
                .put(b"k", Bytes::from_static(b"v"))
        })
        .unwrap();

        assert_eq!(file_len(&path), snapshot_len);
        assert!(file_len(&wal::log_path(&path)) - log_len < 256);
    }

    #[test]
    fn read_only_commit_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bkt.db");
        let db = Db::open(&path).unwrap();
        db.update(|tx| -> StoreResult<()> {
            tx.create_bucket_if_not_exists(b"a")?;
            Ok(())
        })
        .unwrap();
        let log_len = file_len(&wal::log_path(&path));

        db.update(|tx| -> StoreResult<()> {
            tx.bucket_mut(b"a")?;
            Ok(())
        })
        .unwrap();
        assert_eq!(file_len(&wal::log_path(&path)), log_len);
    }

    #[test]
    fn large_log_is_folded_into_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bkt.db");
        let config = WalConfig { min_compact_size: 0 };
        {
            let db = Db::open_with(&path, config.clone()).unwrap();
            // Each record is larger than the snapshot before it.
            for (i, size) in [1024usize, 4096, 16384].into_iter().enumerate() {
                db.update(|tx| -> StoreResult<()> {
                    tx.create_bucket_if_not_exists(b"n")?
                        .put(&[i as u8], Bytes::from(vec![1u8; size]))
                })
                .unwrap();
                assert_eq!(file_len(&wal::log_path(&path)), 0);
            }
        }
        let image = snapshot::load(&path).unwrap().unwrap();
        assert_eq!(image.seq, 3);
        assert_eq!(image.root.bucket(b"n").unwrap().len(), 3);

        let db = Db::open_with(&path, config).unwrap();
        let tx = db.begin(false);
        assert_eq!(tx.bucket(b"n").unwrap().get(&[2]).unwrap().len(), 16384);
    }

    #[test]
    fn crash_between_snapshot_and_log_reset_is_harmless() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bkt.db");
        let log_path = wal::log_path(&path);
        {
            let db = Db::open(&path).unwrap();
            db.update(|tx| -> StoreResult<()> {
                tx.create_bucket_if_not_exists(b"x")?
                    .put(b"k", Bytes::from_static(b"1"))
            })
            .unwrap();
            db.update(|tx| -> StoreResult<()> {
                tx.bucket_mut(b"x")?.expect("bucket exists").delete(b"k")?;
                tx.create_bucket_if_not_exists(b"x")?
                    .create_bucket_if_not_exists(b"k")?;
                Ok(())
            })
            .unwrap();
            let stale_log = std::fs::read(&log_path).unwrap();
            db.compact().unwrap();
            assert_eq!(file_len(&log_path), 0);
            std::fs::write(&log_path, stale_log).unwrap();
        }

        let db = Db::open(&path).unwrap();
        let tx = db.begin(false);
        assert!(tx.bucket(b"x").unwrap().bucket(b"k").is_some());
    }

    #[test]
    fn new_database_file_exists_before_first_commit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bkt.db");
        let _db = Db::open(&path).unwrap();
        assert!(path.exists());
        assert_eq!(snapshot::load(&path).unwrap().unwrap().seq, 0);
    }
}
