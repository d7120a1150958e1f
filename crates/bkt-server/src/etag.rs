/// Domain tag mixed into every entity-tag hash.
const ETAG_DOMAIN: &str = "bkt-etag-v1";

/// Bytes of the BLAKE3 digest kept in the tag.
const ETAG_BYTES: usize = 12;

/// Entity tag for a stored value: a hex fingerprint of exactly `data`.
pub fn etag(data: &[u8]) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(ETAG_DOMAIN.as_bytes());
    hasher.update(b":");
    hasher.update(data);
    hex::encode(&hasher.finalize().as_bytes()[..ETAG_BYTES])
}
