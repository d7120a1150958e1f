//! On-disk snapshot format.
//!
//! A database file holds the whole tree as of some commit:
//!
//! ```text
//! [8 bytes: magic "BKTSNAP1"]
//! [4 bytes: CRC32 of payload (little-endian u32)]
//! [N bytes: payload (bincode-serialized commit sequence + root bucket)]
//! ```
//!
//! Commits after the snapshot live in the commit log (see [`crate::wal`]).
//! A snapshot is written to a fresh file next to the target and renamed
//! into place, so readers of the file never observe a half-written tree.

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use crate::bucket::Bucket;
use crate::error::{StoreError, StoreResult};

const MAGIC: &[u8; 8] = b"BKTSNAP1";

/// Header size: magic + CRC.
const HEADER_SIZE: usize = 12;

/// A decoded snapshot file.
#[derive(Debug, PartialEq, Eq)]
pub struct Image {
    /// Sequence number of the last commit folded into `root`.
    pub seq: u64,
    pub root: Bucket,
    /// Size of the file on disk.
    pub size: u64,
}

/// Load the tree stored at `path`. Returns `Ok(None)` if the file does not
/// exist.
pub fn load(path: &Path) -> StoreResult<Option<Image>> {
    let data = match fs::read(path) {
        Ok(data) => data,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let corrupt = |reason: &str| StoreError::Corrupt {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    };

    if data.len() < HEADER_SIZE || &data[..8] != MAGIC {
        return Err(corrupt("bad magic"));
    }
    let expected_crc = u32::from_le_bytes([data[8], data[9], data[10], data[11]]);
    let payload = &data[HEADER_SIZE..];
    let actual_crc = crc32fast::hash(payload);
    if actual_crc != expected_crc {
        return Err(corrupt(&format!(
            "checksum mismatch: expected {expected_crc:08x}, computed {actual_crc:08x}"
        )));
    }

    let (seq, root): (u64, Bucket) =
        bincode::deserialize(payload).map_err(|e| StoreError::Serialization(e.to_string()))?;
    Ok(Some(Image {
        seq,
        root,
        size: data.len() as u64,
    }))
}

/// Atomically replace the file at `path` with `root` as of commit `seq`.
/// Returns the number of bytes written.
pub fn store(path: &Path, seq: u64, root: &Bucket) -> StoreResult<u64> {
    let payload =
        bincode::serialize(&(seq, root)).map_err(|e| StoreError::Serialization(e.to_string()))?;
    let crc = crc32fast::hash(&payload);

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(MAGIC)?;
    tmp.write_all(&crc.to_le_bytes())?;
    tmp.write_all(&payload)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| StoreError::Io(e.error))?;
    Ok((HEADER_SIZE + payload.len()) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn sample() -> Bucket {
        let mut root = Bucket::new();
        let ns = root.create_bucket_if_not_exists(b"/").unwrap();
        ns.put(b"a", Bytes::from_static(b"alpha")).unwrap();
        ns.create_bucket_if_not_exists(b"dir")
            .unwrap()
            .put(b"b", Bytes::from_static(b"beta"))
            .unwrap();
        root
    }

    #[test]
    fn missing_file_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load(&dir.path().join("absent.db")).unwrap().is_none());
    }

    #[test]
    fn store_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snap.db");
        let root = sample();
        let size = store(&path, 7, &root).unwrap();
        let image = load(&path).unwrap().unwrap();
        assert_eq!(image.seq, 7);
        assert_eq!(image.root, root);
        assert_eq!(image.size, size);
        assert_eq!(fs::metadata(&path).unwrap().len(), size);
    }

    #[test]
    fn flipped_byte_is_detected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snap.db");
        store(&path, 1, &sample()).unwrap();

        let mut raw = fs::read(&path).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0xff;
        fs::write(&path, &raw).unwrap();

        assert!(matches!(load(&path), Err(StoreError::Corrupt { .. })));
    }

    #[test]
    fn foreign_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snap.db");
        fs::write(&path, b"not a database").unwrap();
        assert!(matches!(load(&path), Err(StoreError::Corrupt { .. })));
    }
}
