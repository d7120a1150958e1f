//! Mapping from URL paths to bucket segments.
//!
//! Paths are taken in their escaped form: `/foo/bar%2fbaz` has two
//! segments, `foo` and `bar%2fbaz`. Decoding is never performed, so an
//! escaped slash cannot reach into a sibling bucket.

use std::fmt;

/// Key of the root bucket, and the synthetic first segment of every path.
pub const ROOT_SEGMENT: &[u8] = b"/";

/// Split an escaped path into segments.
///
/// The result always starts with [`ROOT_SEGMENT`], followed by one entry
/// per non-empty `/`-delimited component.
pub fn split_path(path: &str) -> Vec<Vec<u8>> {
    let mut segments = vec![ROOT_SEGMENT.to_vec()];
    segments.extend(
        path.as_bytes()
            .split(|b| *b == b'/')
            .filter(|s| !s.is_empty())
            .map(<[u8]>::to_vec),
    );
    segments
}

/// A parsed request path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResourcePath {
    segments: Vec<Vec<u8>>,
    canonical: String,
}

impl ResourcePath {
    pub fn parse(escaped: &str) -> Self {
        let segments = split_path(escaped);
        let mut canonical = String::with_capacity(escaped.len().max(1));
        for segment in &segments[1..] {
            canonical.push('/');
            canonical.push_str(&String::from_utf8_lossy(segment));
        }
        if canonical.is_empty() {
            canonical.push('/');
        }
        Self {
            segments,
            canonical,
        }
    }

    /// All segments, root first.
    pub fn segments(&self) -> &[Vec<u8>] {
        &self.segments
    }

    /// Number of segments including the root; `/` has depth 1.
    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    pub fn is_root(&self) -> bool {
        self.depth() == 1
    }

    /// Segments of the enclosing bucket. For the root this is the root
    /// itself.
    pub fn parent(&self) -> &[Vec<u8>] {
        if self.is_root() {
            &self.segments
        } else {
            &self.segments[..self.segments.len() - 1]
        }
    }

    /// Final segment.
    pub fn last(&self) -> &[u8] {
        self.segments.last().map(Vec::as_slice).unwrap_or(ROOT_SEGMENT)
    }

    /// Escaped path with empty components removed, e.g. `/foo/bar`.
    ///
    /// Metadata records and `Location` headers use this form.
    pub fn canonical(&self) -> &str {
        &self.canonical
    }
}

impl fmt::Display for ResourcePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn root_only() {
        assert_eq!(split_path(""), vec![b"/".to_vec()]);
        assert_eq!(split_path("/"), vec![b"/".to_vec()]);
        assert_eq!(split_path("///"), vec![b"/".to_vec()]);
    }

    #[test]
    fn drops_empty_components() {
        assert_eq!(
            split_path("//foo///bar/"),
            vec![b"/".to_vec(), b"foo".to_vec(), b"bar".to_vec()]
        );
    }

    #[test]
    fn escapes_are_kept_verbatim() {
        assert_eq!(
            split_path("/foo/bar%2fbaz"),
            vec![b"/".to_vec(), b"foo".to_vec(), b"bar%2fbaz".to_vec()]
        );
    }

    #[test]
    fn resource_path_accessors() {
        let p = ResourcePath::parse("/a//b/c/");
        assert_eq!(p.depth(), 4);
        assert!(!p.is_root());
        assert_eq!(p.last(), b"c");
        assert_eq!(p.parent().len(), 3);
        assert_eq!(p.canonical(), "/a/b/c");

        let root = ResourcePath::parse("/");
        assert!(root.is_root());
        assert_eq!(root.parent(), root.segments());
        assert_eq!(root.last(), b"/");
        assert_eq!(root.canonical(), "/");
        assert_eq!(root.to_string(), "/");
    }

    proptest! {
        #[test]
        fn segments_never_empty_or_slashed(path in "[a-z/%0-9]{0,40}") {
            let segments = split_path(&path);
            prop_assert_eq!(segments[0].as_slice(), ROOT_SEGMENT);
            for s in &segments[1..] {
                prop_assert!(!s.is_empty());
                prop_assert!(!s.contains(&b'/'));
            }
        }

        #[test]
        fn canonical_form_is_a_fixed_point(path in "[a-z/]{0,40}") {
            let once = ResourcePath::parse(&path);
            let twice = ResourcePath::parse(once.canonical());
            prop_assert_eq!(once, twice);
        }
    }
}
