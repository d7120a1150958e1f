//! Offline check of the value/metadata pairing.
//!
//! Every value in the namespace tree must have a metadata record under its
//! canonical path and every record (other than the root's) must describe
//! a value.

use std::collections::BTreeSet;
use std::fmt;

use bkt_store::{Bucket, Db, Entry, Tx};

use crate::metadata::METADATA_BUCKET;
use crate::path::ROOT_SEGMENT;

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Inconsistency {
    MissingRootBucket,
    MissingMetadataBucket,
    MissingRootRecord,
    ValueWithoutMetadata(String),
    MetadataWithoutValue(String),
}

impl fmt::Display for Inconsistency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingRootBucket => write!(f, "root bucket is missing"),
            Self::MissingMetadataBucket => write!(f, "metadata bucket is missing"),
            Self::MissingRootRecord => write!(f, "metadata record for / is missing"),
            Self::ValueWithoutMetadata(p) => write!(f, "value at {p} has no metadata record"),
            Self::MetadataWithoutValue(p) => write!(f, "metadata record for {p} has no value"),
        }
    }
}

fn collect_values(bucket: &Bucket, prefix: &[u8], out: &mut BTreeSet<Vec<u8>>) {
    for (key, entry) in bucket.iter() {
        let mut path = prefix.to_vec();
        path.push(b'/');
        path.extend_from_slice(key);
        match entry {
            Entry::Value(_) => {
                out.insert(path);
            }
            Entry::Bucket(child) => collect_values(child, &path, out),
        }
    }
}

fn lossy(path: &[u8]) -> String {
    String::from_utf8_lossy(path).into_owned()
}

/// Every violation visible in `tx`, in a stable order.
pub fn verify_consistency(tx: &Tx<'_>) -> Vec<Inconsistency> {
    let mut problems = Vec::new();
    let Some(meta) = tx.bucket(METADATA_BUCKET) else {
        problems.push(Inconsistency::MissingMetadataBucket);
        if tx.bucket(ROOT_SEGMENT).is_none() {
            problems.push(Inconsistency::MissingRootBucket);
        }
        return problems;
    };
    if meta.get(ROOT_SEGMENT).is_none() {
        problems.push(Inconsistency::MissingRootRecord);
    }

    let mut values = BTreeSet::new();
    match tx.bucket(ROOT_SEGMENT) {
        Some(root) => collect_values(root, b"", &mut values),
        None => problems.push(Inconsistency::MissingRootBucket),
    }

    let records: BTreeSet<Vec<u8>> = meta
        .keys()
        .filter(|k| *k != ROOT_SEGMENT)
        .map(<[u8]>::to_vec)
        .collect();

    problems.extend(
        values
            .difference(&records)
            .map(|p| Inconsistency::ValueWithoutMetadata(lossy(p))),
    );
    problems.extend(
        records
            .difference(&values)
            .map(|p| Inconsistency::MetadataWithoutValue(lossy(p))),
    );
    problems
}

/// [`verify_consistency`] against the last committed state of `db`.
pub fn verify_db(db: &Db) -> Vec<Inconsistency> {
    verify_consistency(&db.begin(false))
}
