use std::sync::{Arc, MutexGuard};

use tracing::debug;

use crate::bucket::Bucket;
use crate::db::Db;
use crate::error::{key_name, StoreError, StoreResult};

enum TxState<'db> {
    Read(Arc<Bucket>),
    Write {
        root: Bucket,
        _writer: MutexGuard<'db, ()>,
    },
}

/// A transaction against a [`Db`].
///
/// The top level of a transaction holds only buckets. Read-only
/// transactions pin the snapshot that was current when they began.
/// Writable transactions work on a private copy of the tree and hold the
/// writer lock until they are committed, rolled back, or dropped.
pub struct Tx<'db> {
    db: &'db Db,
    state: TxState<'db>,
}

impl<'db> Tx<'db> {
    pub(crate) fn read(db: &'db Db, snapshot: Arc<Bucket>) -> Self {
        Self {
            db,
            state: TxState::Read(snapshot),
        }
    }

    pub(crate) fn write(db: &'db Db, root: Bucket, writer: MutexGuard<'db, ()>) -> Self {
        Self {
            db,
            state: TxState::Write {
                root,
                _writer: writer,
            },
        }
    }

    /// Whether this transaction may mutate the tree.
    pub fn writable(&self) -> bool {
        matches!(self.state, TxState::Write { .. })
    }

    fn root(&self) -> &Bucket {
        match &self.state {
            TxState::Read(root) => root,
            TxState::Write { root, .. } => root,
        }
    }

    fn root_mut(&mut self) -> StoreResult<&mut Bucket> {
        match &mut self.state {
            TxState::Read(_) => Err(StoreError::TxNotWritable),
            TxState::Write { root, .. } => Ok(root),
        }
    }

    /// Top-level bucket by name.
    pub fn bucket(&self, name: &[u8]) -> Option<&Bucket> {
        self.root().bucket(name)
    }

    /// Mutable top-level bucket by name.
    pub fn bucket_mut(&mut self, name: &[u8]) -> StoreResult<Option<&mut Bucket>> {
        Ok(self.root_mut()?.bucket_mut(name))
    }

    /// Return the top-level bucket `name`, creating it if necessary.
    pub fn create_bucket_if_not_exists(&mut self, name: &[u8]) -> StoreResult<&mut Bucket> {
        self.root_mut()?.create_bucket_if_not_exists(name)
    }

    /// Publish the transaction's changes.
    ///
    /// On a file-backed database the changes are appended to the commit
    /// log before the new tree becomes visible; if that write fails nothing
    /// is published.
    pub fn commit(self) -> StoreResult<()> {
        match self.state {
            TxState::Read(_) => Err(StoreError::TxNotWritable),
            TxState::Write { root, _writer } => {
                let buckets = root.len();
                self.db.install(root)?;
                debug!(buckets, "transaction committed");
                Ok(())
            }
        }
    }

    /// Discard the transaction. Equivalent to dropping it.
    pub fn rollback(self) {
        if self.writable() {
            debug!("transaction rolled back");
        }
    }
}

impl std::fmt::Debug for Tx<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<String> = self.root().keys().map(key_name).collect();
        f.debug_struct("Tx")
            .field("writable", &self.writable())
            .field("buckets", &names)
            .finish()
    }
}
