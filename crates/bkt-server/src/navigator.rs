//! Walking request paths through the bucket tree.

use bytes::Bytes;

use bkt_store::{Bucket, Entry, Tx};

use crate::error::{ServerError, ServerResult};
use crate::path::ResourcePath;

/// What the final segment of a path names.
#[derive(Debug)]
pub enum Node<'tx> {
    Container(&'tx Bucket),
    Value(&'tx Bytes),
}

fn missing_root() -> ServerError {
    ServerError::Consistency("root bucket missing".into())
}

fn split_root(segments: &[Vec<u8>]) -> ServerResult<(&[u8], &[Vec<u8>])> {
    segments
        .split_first()
        .map(|(root, rest)| (root.as_slice(), rest))
        .ok_or_else(|| ServerError::Internal("empty segment list".into()))
}

/// Follow `segments` from the root. Returns `None` as soon as a segment is
/// not a bucket.
pub fn resolve_container<'tx>(
    tx: &'tx Tx<'_>,
    segments: &[Vec<u8>],
) -> ServerResult<Option<&'tx Bucket>> {
    let (root, rest) = split_root(segments)?;
    let mut bucket = tx.bucket(root).ok_or_else(missing_root)?;
    for segment in rest {
        match bucket.bucket(segment) {
            Some(child) => bucket = child,
            None => return Ok(None),
        }
    }
    Ok(Some(bucket))
}

/// Mutable counterpart of [`resolve_container`].
pub fn resolve_container_mut<'tx>(
    tx: &'tx mut Tx<'_>,
    segments: &[Vec<u8>],
) -> ServerResult<Option<&'tx mut Bucket>> {
    let (root, rest) = split_root(segments)?;
    let mut bucket = tx.bucket_mut(root)?.ok_or_else(missing_root)?;
    for segment in rest {
        bucket = match bucket.bucket_mut(segment) {
            Some(child) => child,
            None => return Ok(None),
        };
    }
    Ok(Some(bucket))
}

/// Decide whether `last` names a nested bucket or a value in `container`.
pub fn resolve_container_or_value<'tx>(container: &'tx Bucket, last: &[u8]) -> Option<Node<'tx>> {
    match container.entry(last)? {
        Entry::Bucket(child) => Some(Node::Container(child)),
        Entry::Value(value) => Some(Node::Value(value)),
    }
}

/// Walk `segments`, creating every bucket that does not exist yet.
///
/// A segment that already holds a value fails with
/// [`bkt_store::StoreError::IncompatibleValue`].
pub fn get_or_create_container_chain<'tx>(
    tx: &'tx mut Tx<'_>,
    segments: &[Vec<u8>],
) -> ServerResult<&'tx mut Bucket> {
    let (root, rest) = split_root(segments)?;
    let mut bucket = tx.bucket_mut(root)?.ok_or_else(missing_root)?;
    for segment in rest {
        bucket = bucket.create_bucket_if_not_exists(segment)?;
    }
    Ok(bucket)
}

/// Remove the value named by `path`. Returns `false` if there is no value
/// there (missing, or a bucket).
pub fn remove_value(tx: &mut Tx<'_>, path: &ResourcePath) -> ServerResult<bool> {
    let Some(container) = resolve_container_mut(tx, path.parent())? else {
        return Ok(false);
    };
    match container.entry(path.last()) {
        Some(Entry::Value(_)) => Ok(container.delete(path.last())?),
        _ => Ok(false),
    }
}

/// Child names in engine order.
pub fn list_names(container: &Bucket) -> ServerResult<Vec<String>> {
    let mut names = Vec::with_capacity(container.len());
    container.for_each(|key, _| {
        names.push(String::from_utf8_lossy(key).into_owned());
        Ok(())
    })?;
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::bootstrap;
    use crate::path::split_path;
    use bkt_store::Db;

    fn ready_db() -> Db {
        let db = Db::in_memory();
        bootstrap(&db).unwrap();
        db
    }

    #[test]
    fn chain_creation_is_idempotent() {
        let db = ready_db();
        let segments = split_path("/a/b/c");
        for _ in 0..2 {
            db.update(|tx| get_or_create_container_chain(tx, &segments).map(|_| ()))
                .unwrap();
        }
        let tx = db.begin(false);
        assert!(resolve_container(&tx, &segments).unwrap().is_some());
        let a = resolve_container(&tx, &split_path("/a")).unwrap().unwrap();
        assert_eq!(list_names(a).unwrap(), vec!["b".to_string()]);
    }

    #[test]
    fn missing_segment_is_not_found() {
        let db = ready_db();
        let tx = db.begin(false);
        assert!(resolve_container(&tx, &split_path("/nope/deeper")).unwrap().is_none());
        assert!(resolve_container(&tx, &split_path("/")).unwrap().is_some());
    }

    #[test]
    fn missing_root_is_a_consistency_fault() {
        let db = Db::in_memory();
        let tx = db.begin(false);
        assert!(matches!(
            resolve_container(&tx, &split_path("/a")),
            Err(ServerError::Consistency(_))
        ));
    }

    #[test]
    fn distinguishes_container_and_value() {
        let db = ready_db();
        db.update(|tx| -> ServerResult<()> {
            let dir = get_or_create_container_chain(tx, &split_path("/dir"))?;
            dir.create_bucket_if_not_exists(b"sub")?;
            dir.put(b"val", Bytes::from_static(b"data"))?;
            Ok(())
        })
        .unwrap();

        let tx = db.begin(false);
        let dir = resolve_container(&tx, &split_path("/dir")).unwrap().unwrap();
        assert!(matches!(
            resolve_container_or_value(dir, b"sub"),
            Some(Node::Container(_))
        ));
        match resolve_container_or_value(dir, b"val") {
            Some(Node::Value(v)) => assert_eq!(v.as_ref(), b"data"),
            other => panic!("expected value, got {other:?}"),
        }
        assert!(resolve_container_or_value(dir, b"none").is_none());
    }

    #[test]
    fn value_blocks_chain_through_it() {
        let db = ready_db();
        db.update(|tx| -> ServerResult<()> {
            get_or_create_container_chain(tx, &split_path("/a"))?
                .put(b"leaf", Bytes::from_static(b"x"))?;
            Ok(())
        })
        .unwrap();
        let err = db
            .update(|tx| get_or_create_container_chain(tx, &split_path("/a/leaf/deeper")).map(|_| ()))
            .unwrap_err();
        assert!(matches!(
            err,
            ServerError::Store(bkt_store::StoreError::IncompatibleValue(_))
        ));
    }

    #[test]
    fn remove_value_only_removes_values() {
        let db = ready_db();
        db.update(|tx| -> ServerResult<()> {
            let a = get_or_create_container_chain(tx, &split_path("/a"))?;
            a.put(b"v", Bytes::from_static(b"x"))?;
            a.create_bucket_if_not_exists(b"b")?;
            Ok(())
        })
        .unwrap();

        assert!(db.update(|tx| remove_value(tx, &ResourcePath::parse("/a/v"))).unwrap());
        assert!(!db.update(|tx| remove_value(tx, &ResourcePath::parse("/a/v"))).unwrap());
        assert!(!db.update(|tx| remove_value(tx, &ResourcePath::parse("/a/b"))).unwrap());
        assert!(!db.update(|tx| remove_value(tx, &ResourcePath::parse("/zz/v"))).unwrap());
    }
}
