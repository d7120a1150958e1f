use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::{key_name, StoreError, StoreResult};

/// A single slot in a bucket.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Entry {
    /// A nested bucket. Shared with older snapshots until a writer touches it.
    Bucket(Arc<Bucket>),
    /// A flat value.
    Value(Bytes),
}

/// An ordered mapping from byte keys to nested buckets or values.
///
/// Keys iterate in byte order. Mutable access to a nested bucket goes
/// through [`Arc::make_mut`], so a write transaction copies only the
/// buckets on the path it modifies.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bucket {
    entries: BTreeMap<Vec<u8>, Entry>,
}

impl Bucket {
    /// Create an empty bucket.
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw slot lookup.
    pub fn entry(&self, key: &[u8]) -> Option<&Entry> {
        self.entries.get(key)
    }

    /// Nested bucket at `key`, if `key` names a bucket.
    pub fn bucket(&self, key: &[u8]) -> Option<&Bucket> {
        match self.entries.get(key) {
            Some(Entry::Bucket(b)) => Some(b.as_ref()),
            _ => None,
        }
    }

    /// Mutable nested bucket at `key`, if `key` names a bucket.
    pub fn bucket_mut(&mut self, key: &[u8]) -> Option<&mut Bucket> {
        match self.entries.get_mut(key) {
            Some(Entry::Bucket(b)) => Some(Arc::make_mut(b)),
            _ => None,
        }
    }

    /// Return the nested bucket at `key`, creating it if the key is free.
    ///
    /// Fails with [`StoreError::IncompatibleValue`] if `key` holds a value.
    pub fn create_bucket_if_not_exists(&mut self, key: &[u8]) -> StoreResult<&mut Bucket> {
        if key.is_empty() {
            return Err(StoreError::EmptyKey);
        }
        let slot = self
            .entries
            .entry(key.to_vec())
            .or_insert_with(|| Entry::Bucket(Arc::new(Bucket::new())));
        match slot {
            Entry::Bucket(b) => Ok(Arc::make_mut(b)),
            Entry::Value(_) => Err(StoreError::IncompatibleValue(key_name(key))),
        }
    }

    /// Remove the nested bucket at `key` together with its subtree.
    pub fn delete_bucket(&mut self, key: &[u8]) -> StoreResult<()> {
        match self.entries.get(key) {
            None => Err(StoreError::BucketNotFound(key_name(key))),
            Some(Entry::Value(_)) => Err(StoreError::IncompatibleValue(key_name(key))),
            Some(Entry::Bucket(_)) => {
                self.entries.remove(key);
                Ok(())
            }
        }
    }

    /// Value at `key`. Returns `None` for missing keys and for buckets.
    pub fn get(&self, key: &[u8]) -> Option<&Bytes> {
        match self.entries.get(key) {
            Some(Entry::Value(v)) => Some(v),
            _ => None,
        }
    }

    /// Insert or overwrite the value at `key`.
    pub fn put(&mut self, key: &[u8], value: impl Into<Bytes>) -> StoreResult<()> {
        if key.is_empty() {
            return Err(StoreError::EmptyKey);
        }
        if let Some(Entry::Bucket(_)) = self.entries.get(key) {
            return Err(StoreError::IncompatibleValue(key_name(key)));
        }
        self.entries.insert(key.to_vec(), Entry::Value(value.into()));
        Ok(())
    }

    /// Remove the value at `key`. Returns `true` if a value was removed.
    ///
    /// Deleting a missing key is not an error; deleting a bucket through
    /// this call is.
    pub fn delete(&mut self, key: &[u8]) -> StoreResult<bool> {
        match self.entries.get(key) {
            None => Ok(false),
            Some(Entry::Bucket(_)) => Err(StoreError::IncompatibleValue(key_name(key))),
            Some(Entry::Value(_)) => Ok(self.entries.remove(key).is_some()),
        }
    }

    /// Visit every slot in key order, stopping at the first error.
    pub fn for_each<F>(&self, mut f: F) -> StoreResult<()>
    where
        F: FnMut(&[u8], &Entry) -> StoreResult<()>,
    {
        for (k, e) in &self.entries {
            f(k, e)?;
        }
        Ok(())
    }

    /// Keys in byte order.
    pub fn keys(&self) -> impl Iterator<Item = &[u8]> {
        self.entries.keys().map(Vec::as_slice)
    }

    /// Slots in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&[u8], &Entry)> {
        self.entries.iter().map(|(k, e)| (k.as_slice(), e))
    }

    /// Number of slots.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the bucket has no slots.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
