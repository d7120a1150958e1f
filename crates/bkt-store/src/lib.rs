//! Embedded transactional key/value engine for bkt.
//!
//! The engine stores a tree of named buckets. A bucket maps byte keys to
//! either a nested bucket or a flat value, never both for the same key.
//! All access happens inside a transaction obtained from [`Db::begin`]
//! (or the [`Db::view`] / [`Db::update`] helpers).
//!
//! # Transactions
//!
//! - At most one writable transaction is open at a time; writers queue on
//!   a mutex.
//! - Read-only transactions see the tree as of the last commit, unaffected
//!   by a writer running concurrently.
//! - A writable transaction that is dropped without [`Tx::commit`] is
//!   rolled back; nothing it did becomes visible.
//!
//! # Persistence
//!
//! [`Db::in_memory`] keeps everything in process memory. [`Db::open`] loads
//! a snapshot file (see [`snapshot`]) and replays the commit log beside it
//! (see [`wal`]). Each commit appends only its own changes to the log; the
//! log is folded into a new snapshot once it outgrows the old one.

pub mod bucket;
pub mod db;
pub mod error;
pub mod snapshot;
pub mod tx;
pub mod wal;

pub use bucket::{Bucket, Entry};
pub use db::Db;
pub use error::{StoreError, StoreResult};
pub use tx::Tx;
pub use wal::WalConfig;
