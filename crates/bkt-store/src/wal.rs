//! Append-only commit log.
//!
//! Each commit appends one record holding the changes it made, so the cost
//! of a commit follows the size of the change rather than the size of the
//! tree. The log sits next to the snapshot file and is folded into a fresh
//! snapshot once it grows past [`WalConfig::min_compact_size`] and the size
//! of the current snapshot.
//!
//! On-disk format, one frame per commit:
//! ```text
//! [4 bytes: record length (little-endian u32)]
//! [4 bytes: CRC32 of payload (little-endian u32)]
//! [N bytes: payload (bincode-serialized Record)]
//! ```

use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::bucket::{Bucket, Entry};
use crate::error::{key_name, StoreError, StoreResult};

/// Header size: 4 bytes length + 4 bytes CRC.
const HEADER_SIZE: usize = 8;

/// Tuning for the commit log.
#[derive(Clone, Debug)]
pub struct WalConfig {
    /// The log is never compacted below this size (default: 8 MiB).
    pub min_compact_size: u64,
}

impl Default for WalConfig {
    fn default() -> Self {
        Self {
            min_compact_size: 8 * 1024 * 1024,
        }
    }
}

/// One change to the tree, addressed by the full key path from the root.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Change {
    PutValue { path: Vec<Vec<u8>>, value: Bytes },
    CreateBucket { path: Vec<Vec<u8>> },
    Remove { path: Vec<Vec<u8>> },
}

impl Change {
    fn path(&self) -> &[Vec<u8>] {
        match self {
            Self::PutValue { path, .. } | Self::CreateBucket { path } | Self::Remove { path } => {
                path
            }
        }
    }

    /// Apply the change to `root`. Fails if the tree does not have the
    /// shape the change was recorded against.
    pub fn apply(&self, root: &mut Bucket) -> StoreResult<()> {
        let (key, parents) = self.path().split_last().ok_or(StoreError::EmptyKey)?;
        let mut bucket = root;
        for segment in parents {
            bucket = bucket
                .bucket_mut(segment)
                .ok_or_else(|| StoreError::BucketNotFound(key_name(segment)))?;
        }
        match self {
            Self::PutValue { value, .. } => bucket.put(key, value.clone()),
            Self::CreateBucket { .. } => bucket.create_bucket_if_not_exists(key).map(|_| ()),
            Self::Remove { .. } => match bucket.entry(key) {
                Some(Entry::Bucket(_)) => bucket.delete_bucket(key),
                Some(Entry::Value(_)) => bucket.delete(key).map(|_| ()),
                None => Err(StoreError::BucketNotFound(key_name(key))),
            },
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Record {
    seq: u64,
    changes: Vec<Change>,
}

/// The changes that turn `old` into `new`.
///
/// Subtrees still shared between the two trees are skipped without being
/// visited, so the walk only touches buckets a writer copied.
pub fn diff(old: &Bucket, new: &Bucket) -> StoreResult<Vec<Change>> {
    let mut changes = Vec::new();
    diff_into(&mut Vec::new(), old, new, &mut changes)?;
    Ok(changes)
}

fn child_path(prefix: &[Vec<u8>], key: &[u8]) -> Vec<Vec<u8>> {
    let mut path = prefix.to_vec();
    path.push(key.to_vec());
    path
}

fn same_value(a: &Bytes, b: &Bytes) -> bool {
    (a.as_ptr() == b.as_ptr() && a.len() == b.len()) || a == b
}

fn diff_into(
    prefix: &mut Vec<Vec<u8>>,
    old: &Bucket,
    new: &Bucket,
    out: &mut Vec<Change>,
) -> StoreResult<()> {
    old.for_each(|key, _| {
        if new.entry(key).is_none() {
            out.push(Change::Remove {
                path: child_path(prefix, key),
            });
        }
        Ok(())
    })?;
    new.for_each(|key, entry| {
        match (old.entry(key), entry) {
            (Some(Entry::Bucket(a)), Entry::Bucket(b)) => {
                if !Arc::ptr_eq(a, b) {
                    prefix.push(key.to_vec());
                    diff_into(prefix, a, b, out)?;
                    prefix.pop();
                }
            }
            (Some(Entry::Value(a)), Entry::Value(b)) => {
                if !same_value(a, b) {
                    out.push(Change::PutValue {
                        path: child_path(prefix, key),
                        value: b.clone(),
                    });
                }
            }
            (Some(_), _) => {
                out.push(Change::Remove {
                    path: child_path(prefix, key),
                });
                record_created(prefix, key, entry, out)?;
            }
            (None, _) => record_created(prefix, key, entry, out)?,
        }
        Ok(())
    })
}

fn record_created(
    prefix: &mut Vec<Vec<u8>>,
    key: &[u8],
    entry: &Entry,
    out: &mut Vec<Change>,
) -> StoreResult<()> {
    match entry {
        Entry::Value(value) => {
            out.push(Change::PutValue {
                path: child_path(prefix, key),
                value: value.clone(),
            });
            Ok(())
        }
        Entry::Bucket(bucket) => {
            out.push(Change::CreateBucket {
                path: child_path(prefix, key),
            });
            prefix.push(key.to_vec());
            let result = bucket.for_each(|k, e| record_created(prefix, k, e, out));
            prefix.pop();
            result
        }
    }
}

/// Location of the commit log belonging to the database file `db_path`.
pub fn log_path(db_path: &Path) -> PathBuf {
    let mut name = OsString::from(db_path.as_os_str());
    name.push(".log");
    PathBuf::from(name)
}

/// Outcome of [`replay`].
#[derive(Debug, PartialEq, Eq)]
pub struct Replay {
    /// Sequence number of the last commit now reflected in the tree.
    pub seq: u64,
    /// Records applied.
    pub applied: usize,
    /// Length of the intact prefix of the log.
    pub valid_len: u64,
}

/// Apply every record in the log at `path` newer than commit `after`.
///
/// Reading stops at the first frame that is cut short or fails its
/// checksum; everything from there on is a torn write. A frame that is
/// intact but does not fit the tree is corruption and fails the replay.
pub fn replay(path: &Path, root: &mut Bucket, after: u64) -> StoreResult<Replay> {
    let data = match fs::read(path) {
        Ok(data) => data,
        Err(e) if e.kind() == io::ErrorKind::NotFound => Vec::new(),
        Err(e) => return Err(e.into()),
    };
    let corrupt = |offset: usize, reason: String| StoreError::Corrupt {
        path: path.to_path_buf(),
        reason: format!("commit record at offset {offset}: {reason}"),
    };

    let mut offset = 0usize;
    let mut seq = after;
    let mut applied = 0;
    while offset + HEADER_SIZE <= data.len() {
        let header = &data[offset..offset + HEADER_SIZE];
        let length = u32::from_le_bytes([header[0], header[1], header[2], header[3]]) as usize;
        let expected_crc = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);

        let end = offset + HEADER_SIZE + length;
        if length == 0 || end > data.len() {
            warn!(offset, length, file_len = data.len(), "truncated commit record; stopping replay");
            break;
        }
        let payload = &data[offset + HEADER_SIZE..end];
        let actual_crc = crc32fast::hash(payload);
        if actual_crc != expected_crc {
            warn!(
                offset,
                expected = expected_crc,
                actual = actual_crc,
                "CRC mismatch; stopping replay"
            );
            break;
        }

        let record: Record =
            bincode::deserialize(payload).map_err(|e| corrupt(offset, e.to_string()))?;
        if record.seq > seq {
            if record.seq != seq + 1 {
                return Err(corrupt(
                    offset,
                    format!("expected commit {}, found {}", seq + 1, record.seq),
                ));
            }
            for change in &record.changes {
                change
                    .apply(root)
                    .map_err(|e| corrupt(offset, e.to_string()))?;
            }
            seq = record.seq;
            applied += 1;
        }
        offset = end;
    }
    if offset < data.len() {
        warn!(offset, file_len = data.len(), "discarding torn commit log tail");
    }

    debug!(applied, seq, "commit log replayed");
    Ok(Replay {
        seq,
        applied,
        valid_len: offset as u64,
    })
}

/// Writer side of the commit log.
pub struct CommitLog {
    path: PathBuf,
    file: File,
    /// Bytes of intact records in the file.
    len: u64,
    /// Sequence number of the last logged commit.
    seq: u64,
    /// Log size at which the next compaction is due.
    compact_at: u64,
    config: WalConfig,
}

impl CommitLog {
    /// Open the log at `path`, replaying it onto `root`, which must be the
    /// snapshot taken at commit `snapshot_seq` and `snapshot_size` bytes
    /// long. A torn tail is cut off so new records follow intact ones.
    pub fn open(
        path: &Path,
        root: &mut Bucket,
        snapshot_seq: u64,
        snapshot_size: u64,
        config: WalConfig,
    ) -> StoreResult<(Self, Replay)> {
        let replay = replay(path, root, snapshot_seq)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;
        let on_disk = file.metadata()?.len();
        if on_disk > replay.valid_len {
            file.set_len(replay.valid_len)?;
            file.sync_all()?;
            warn!(
                path = %path.display(),
                discarded = on_disk - replay.valid_len,
                "truncated torn commit log tail"
            );
        }

        let log = Self {
            path: path.to_path_buf(),
            file,
            len: replay.valid_len,
            seq: replay.seq,
            compact_at: config.min_compact_size.max(snapshot_size),
            config,
        };
        Ok((log, replay))
    }

    /// Append `changes` as the next commit and sync it to disk.
    ///
    /// On failure the file is cut back to its previous length, so a failed
    /// append never leaves a partial frame ahead of later records.
    pub fn append(&mut self, changes: Vec<Change>) -> StoreResult<()> {
        let record = Record {
            seq: self.seq + 1,
            changes,
        };
        let payload =
            bincode::serialize(&record).map_err(|e| StoreError::Serialization(e.to_string()))?;
        let length = u32::try_from(payload.len())
            .map_err(|_| StoreError::Serialization("commit record too large".into()))?;
        let crc = crc32fast::hash(&payload);

        let mut frame = Vec::with_capacity(HEADER_SIZE + payload.len());
        frame.extend_from_slice(&length.to_le_bytes());
        frame.extend_from_slice(&crc.to_le_bytes());
        frame.extend_from_slice(&payload);

        if let Err(e) = self.write_frame(&frame) {
            let _ = self.file.set_len(self.len);
            return Err(e.into());
        }
        self.len += frame.len() as u64;
        self.seq = record.seq;
        debug!(seq = self.seq, bytes = frame.len(), "commit logged");
        Ok(())
    }

    fn write_frame(&mut self, frame: &[u8]) -> io::Result<()> {
        self.file.write_all(frame)?;
        self.file.sync_data()
    }

    /// Whether the log has outgrown the snapshot it extends.
    pub fn should_compact(&self) -> bool {
        self.len >= self.compact_at
    }

    /// Empty the log after its records were folded into a snapshot of
    /// `snapshot_size` bytes.
    pub fn reset(&mut self, snapshot_size: u64) -> StoreResult<()> {
        self.file.set_len(0)?;
        self.file.sync_all()?;
        self.len = 0;
        self.compact_at = self.config.min_compact_size.max(snapshot_size);
        debug!(path = %self.path.display(), "commit log reset");
        Ok(())
    }

    /// Sequence number of the last logged commit.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Bytes of intact records in the log.
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Returns `true` if every commit is already in the snapshot.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl std::fmt::Debug for CommitLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommitLog")
            .field("path", &self.path)
            .field("len", &self.len)
            .field("seq", &self.seq)
            .finish()
    }
}
