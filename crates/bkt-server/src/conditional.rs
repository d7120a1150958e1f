//! `If-Match` / `If-None-Match` evaluation against stored entity tags.
//!
//! Both checks look at the record that is stored right now, inside the
//! caller's transaction. For writes that makes check-then-mutate atomic:
//! no other writer can run between the two.

use axum::http::header::{IF_MATCH, IF_NONE_MATCH};
use axum::http::{HeaderMap, HeaderName};

use crate::metadata::MetadataRecord;

const ANY: &str = "*";

/// Values listed in every occurrence of `name`, split on commas.
/// `None` if the header is absent.
fn listed(headers: &HeaderMap, name: HeaderName) -> Option<Vec<&str>> {
    let mut occurrences = headers.get_all(name).iter().peekable();
    occurrences.peek()?;
    Some(
        occurrences
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(','))
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .collect(),
    )
}

/// `true` if a read should be answered with 304: some `If-None-Match`
/// value is `*` or the stored tag.
pub fn not_modified(stored: &MetadataRecord, headers: &HeaderMap) -> bool {
    listed(headers, IF_NONE_MATCH).is_some_and(|values| {
        values
            .iter()
            .any(|v| *v == ANY || Some(*v) == stored.etag())
    })
}

/// `true` if a write or delete may proceed.
///
/// Without a stored record, `*` cannot match. With one, the header must be
/// absent or list `*` or the stored tag.
pub fn if_match_holds(stored: Option<&MetadataRecord>, headers: &HeaderMap) -> bool {
    let Some(values) = listed(headers, IF_MATCH) else {
        return true;
    };
    match stored {
        None => !values.contains(&ANY),
        Some(record) => values
            .iter()
            .any(|v| *v == ANY || Some(*v) == record.etag()),
    }
}

/// Whether the request carries any `If-None-Match` value. Writes refuse it.
pub fn has_if_none_match(headers: &HeaderMap) -> bool {
    headers
        .get_all(IF_NONE_MATCH)
        .iter()
        .any(|v| !v.as_bytes().is_empty())
}
