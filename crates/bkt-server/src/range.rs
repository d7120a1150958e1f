//! `Range: bytes=...` parsing and slicing.

/// An inclusive byte span inside a value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ByteSpan {
    pub start: usize,
    pub end: usize,
}

impl ByteSpan {
    pub fn len(&self) -> usize {
        self.end - self.start + 1
    }

    pub fn slice<'a>(&self, data: &'a [u8]) -> &'a [u8] {
        &data[self.start..=self.end]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RangeError {
    #[error("unsupported range unit: {0}")]
    UnsupportedUnit(String),

    #[error("malformed range spec: {0}")]
    Malformed(String),

    #[error("range not satisfiable")]
    Unsatisfiable,
}

fn offset(raw: &str) -> Result<usize, RangeError> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(RangeError::Malformed(raw.to_string()));
    }
    // All digits: the only way to fail is overflow, which is past any value.
    raw.parse().map_err(|_| RangeError::Unsatisfiable)
}

fn parse_spec(spec: &str, len: usize) -> Result<ByteSpan, RangeError> {
    let (first, last) = spec
        .split_once('-')
        .ok_or_else(|| RangeError::Malformed(spec.to_string()))?;
    match (first.trim(), last.trim()) {
        ("", "") => Err(RangeError::Malformed(spec.to_string())),
        ("", suffix) => {
            let n = offset(suffix)?;
            if n == 0 || len == 0 {
                return Err(RangeError::Unsatisfiable);
            }
            let n = n.min(len);
            Ok(ByteSpan {
                start: len - n,
                end: len - 1,
            })
        }
        (start, "") => {
            let start = offset(start)?;
            if start >= len {
                return Err(RangeError::Unsatisfiable);
            }
            Ok(ByteSpan { start, end: len - 1 })
        }
        (start, end) => {
            let (start, end) = (offset(start)?, offset(end)?);
            if start > end || end >= len {
                return Err(RangeError::Unsatisfiable);
            }
            Ok(ByteSpan { start, end })
        }
    }
}

/// Parse a `Range` header against a value of `len` bytes.
///
/// Spans are returned in header order; overlapping or repeated spans are
/// kept as written. A span reaching past the value makes the whole header
/// unsatisfiable.
pub fn parse_range(header: &str, len: usize) -> Result<Vec<ByteSpan>, RangeError> {
    let (unit, specs) = header
        .split_once('=')
        .ok_or_else(|| RangeError::Malformed(header.to_string()))?;
    let unit = unit.trim();
    if unit != "bytes" {
        return Err(RangeError::UnsupportedUnit(unit.to_string()));
    }

    let spans = specs
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| parse_spec(s, len))
        .collect::<Result<Vec<_>, _>>()?;
    if spans.is_empty() {
        return Err(RangeError::Unsatisfiable);
    }
    Ok(spans)
}

/// Concatenate the bytes of `spans` in order.
///
/// Repeated and overlapping spans can ask for far more bytes than the value
/// holds. If the result would exceed `limit` bytes the request is
/// unsatisfiable and nothing is copied.
pub fn read_spans(
    data: &[u8],
    spans: &[ByteSpan],
    limit: usize,
) -> Result<Vec<u8>, RangeError> {
    let total = spans
        .iter()
        .try_fold(0usize, |acc, span| acc.checked_add(span.len()))
        .filter(|&total| total <= limit)
        .ok_or(RangeError::Unsatisfiable)?;
    let mut out = Vec::with_capacity(total);
    for span in spans {
        out.extend_from_slice(span.slice(data));
    }
    Ok(out)
}
