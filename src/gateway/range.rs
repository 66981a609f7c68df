//! Byte-range resolution for file responses
//!
//! Only the single-range form `bytes=<start>-<end>` is understood. Anything
//! else, multi-range requests included, is treated as if no header were sent
//! and the whole object is served.

use crate::store::ByteSpan;

/// Parsed `Range` header before it is checked against the object size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeRequest {
    pub start: Option<u64>,
    pub end: Option<u64>,
}

/// Validated byte range within an object of `total` bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
    pub total: u64,
}

/// What to serve for a file request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeResolution {
    /// Whole object, 200
    Full,
    /// One range, 206
    Partial(ByteRange),
    /// Range outside the object, 416
    Unsatisfiable,
}

#[allow(clippy::len_without_is_empty)]
impl ByteRange {
    /// Number of bytes in the range
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// `Content-Range` value for a 206 response
    pub fn content_range(&self) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, self.total)
    }

    pub fn span(&self) -> ByteSpan {
        ByteSpan {
            start: self.start,
            end: self.end,
        }
    }
}

/// `Content-Range` value for a 416 response
pub fn unsatisfied_content_range(total: u64) -> String {
    format!("bytes */{}", total)
}

/// Parse a `Range` header value
///
/// Returns `None` when the header is not a single `bytes=` range.
pub fn parse_range_header(value: &str) -> Option<RangeRequest> {
    let value = value.trim();
    let unit = value.get(..6)?;
    if !unit.eq_ignore_ascii_case("bytes=") {
        return None;
    }

    let spec = &value[6..];
    if spec.contains(',') {
        return None;
    }

    let (start, end) = spec.split_once('-')?;
    Some(RangeRequest {
        start: parse_bound(start)?,
        end: parse_bound(end)?,
    })
}

/// Empty bounds are absent; anything but plain decimal digits is malformed
fn parse_bound(s: &str) -> Option<Option<u64>> {
    let s = s.trim();
    if s.is_empty() {
        return Some(None);
    }
    if !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok().map(Some)
}

impl RangeRequest {
    /// Check the request against an object of `size` bytes
    ///
    /// A missing start with a present end is a suffix request for the last
    /// `end` bytes. Out-of-bounds ranges are rejected, never clamped.
    pub fn resolve(&self, size: u64) -> RangeResolution {
        let Some(last) = size.checked_sub(1) else {
            return RangeResolution::Unsatisfiable;
        };

        let (start, end) = match (self.start, self.end) {
            (Some(start), Some(end)) => (start, end),
            (Some(start), None) => (start, last),
            (None, Some(suffix)) => {
                if suffix == 0 || suffix > size {
                    return RangeResolution::Unsatisfiable;
                }
                (size - suffix, last)
            }
            (None, None) => (0, last),
        };

        if start >= size || end >= size || start > end {
            return RangeResolution::Unsatisfiable;
        }

        RangeResolution::Partial(ByteRange { start, end, total: size })
    }
}

/// Decide between full, partial, and unsatisfiable for a file of `size` bytes
pub fn resolve_range(size: u64, header: Option<&str>) -> RangeResolution {
    match header.and_then(parse_range_header) {
        Some(request) => request.resolve(size),
        None => RangeResolution::Full,
    }
}
