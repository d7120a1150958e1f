//! Per-path header records kept beside the bucket tree.
//!
//! Records live in their own top-level bucket, keyed by the canonical
//! escaped path of the value they describe. The bucket's name starts with
//! a NUL byte, which no request path can produce, so it never shows up in
//! listings and cannot be addressed over HTTP.

use axum::http::header::{CONTENT_LENGTH, CONTENT_TYPE, ETAG, LAST_MODIFIED};
use axum::http::{HeaderMap, HeaderName, HeaderValue};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use bkt_store::{Db, Tx};

use crate::error::{ServerError, ServerResult};
use crate::etag::etag;
use crate::path::ROOT_SEGMENT;

/// Name of the top-level bucket holding metadata records.
pub const METADATA_BUCKET: &[u8] = b"\0headers";

/// `Last-Modified` format: RFC 1123 with a numeric zone.
const HTTP_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S %z";

/// Stored header state for one value.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataRecord {
    #[serde(rename = "Content-Type", default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(rename = "Content-Length", default, skip_serializing_if = "Option::is_none")]
    pub content_length: Option<String>,
    #[serde(rename = "ETag", default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    #[serde(rename = "Last-Modified", default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<String>,
}

impl MetadataRecord {
    /// Build the record for a value about to be written.
    ///
    /// Only `Content-Type` and `Content-Length` are copied from the request;
    /// the tag and timestamp are always computed here.
    pub fn stamp(request: &HeaderMap, body: &[u8], now: DateTime<Utc>) -> Self {
        let copy = |name: HeaderName| {
            request
                .get(&name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned)
        };
        Self {
            content_type: copy(CONTENT_TYPE),
            content_length: copy(CONTENT_LENGTH),
            etag: Some(etag(body)),
            last_modified: Some(format_http_date(now)),
        }
    }

    pub fn etag(&self) -> Option<&str> {
        self.etag.as_deref()
    }

    /// The record as it applies to a partial response: entity tag and
    /// length describe the whole value, so both are dropped.
    pub fn for_partial(&self) -> Self {
        Self {
            etag: None,
            content_length: None,
            ..self.clone()
        }
    }

    /// Copy every present field into `headers`.
    pub fn apply(&self, headers: &mut HeaderMap) {
        let fields = [
            (CONTENT_TYPE, &self.content_type),
            (CONTENT_LENGTH, &self.content_length),
            (ETAG, &self.etag),
            (LAST_MODIFIED, &self.last_modified),
        ];
        for (name, value) in fields {
            let Some(value) = value else { continue };
            match HeaderValue::from_str(value) {
                Ok(v) => {
                    headers.insert(name, v);
                }
                Err(_) => warn!(header = %name, "skipping unrepresentable stored header"),
            }
        }
    }
}

pub fn format_http_date(at: DateTime<Utc>) -> String {
    at.format(HTTP_DATE_FORMAT).to_string()
}

/// Create the namespace root and the metadata bucket if they are missing.
///
/// Also guarantees that the root path has an (empty) record.
pub fn bootstrap(db: &Db) -> ServerResult<()> {
    db.update(|tx| {
        let meta = tx.create_bucket_if_not_exists(METADATA_BUCKET)?;
        if meta.get(ROOT_SEGMENT).is_none() {
            meta.put(ROOT_SEGMENT, serde_json::to_vec(&MetadataRecord::default())?)?;
        }
        tx.create_bucket_if_not_exists(ROOT_SEGMENT)?;
        Ok::<_, ServerError>(())
    })?;
    info!("namespace and metadata buckets ready");
    Ok(())
}

fn missing_bucket() -> ServerError {
    ServerError::Consistency("metadata bucket missing".into())
}

/// Record for `path`, or `None` if nothing was ever stored there.
pub fn get(tx: &Tx<'_>, path: &str) -> ServerResult<Option<MetadataRecord>> {
    let bucket = tx.bucket(METADATA_BUCKET).ok_or_else(missing_bucket)?;
    match bucket.get(path.as_bytes()) {
        Some(raw) => Ok(Some(serde_json::from_slice(raw)?)),
        None => Ok(None),
    }
}

/// Insert or replace the record for `path`.
pub fn put(tx: &mut Tx<'_>, path: &str, record: &MetadataRecord) -> ServerResult<()> {
    let raw = serde_json::to_vec(record)?;
    let bucket = tx.bucket_mut(METADATA_BUCKET)?.ok_or_else(missing_bucket)?;
    bucket.put(path.as_bytes(), raw)?;
    Ok(())
}

/// Remove the record for `path`. Returns `true` if one existed.
pub fn delete(tx: &mut Tx<'_>, path: &str) -> ServerResult<bool> {
    let bucket = tx.bucket_mut(METADATA_BUCKET)?.ok_or_else(missing_bucket)?;
    Ok(bucket.delete(path.as_bytes())?)
}
