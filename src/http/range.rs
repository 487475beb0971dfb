//! HTTP Range request parsing module
//!
//! Resolves the text of a `Range: bytes=...` header against a known file
//! size. A set is either accepted as a whole or rejected as a whole.

use thiserror::Error;

use super::response::Status;

/// Byte budget of one multipart sub-header.
pub const BR_HEADER: usize = 512;

/// Half-open byte span `[start, end)` of a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    /// Number of bytes in the span.
    #[inline]
    pub const fn len(&self) -> u64 {
        self.end - self.start
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Last byte position as written in `Content-Range`.
    #[inline]
    pub const fn last(&self) -> u64 {
        self.end - 1
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RangeError {
    #[error("malformed byte range `{0}`")]
    Malformed(String),

    #[error("byte range {start}-{end} does not fit a {size} byte resource")]
    OutOfBounds { start: u64, end: u64, size: u64 },

    #[error("cannot reserve space for {0} byte ranges")]
    Allocation(usize),
}

impl RangeError {
    pub const fn status(&self) -> Status {
        match self {
            Self::Malformed(_) | Self::OutOfBounds { .. } => Status::BadRequest,
            Self::Allocation(_) => Status::InternalServerError,
        }
    }
}

/// Validated ranges of one response plus their multipart sub-headers.
///
/// Sub-headers are filled in by the response builder: one per range and a
/// closing boundary in the last slot.
#[derive(Debug, Default)]
pub struct ByteRangeSet {
    ranges: Vec<ByteRange>,
    subheaders: Vec<Vec<u8>>,
}

impl ByteRangeSet {
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<ByteRange> {
        self.ranges.get(index).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = ByteRange> + '_ {
        self.ranges.iter().copied()
    }

    /// Sub-header `index`; `index == len()` is the closing boundary.
    pub fn subheader(&self, index: usize) -> Option<&[u8]> {
        self.subheaders.get(index).map(Vec::as_slice)
    }

    pub fn subheader_lengths(&self) -> impl Iterator<Item = usize> + '_ {
        self.subheaders.iter().map(Vec::len)
    }

    pub(crate) fn push_subheader(&mut self, head: Vec<u8>) {
        self.subheaders.push(head);
    }

    /// Drop every range, e.g. after an `If-Range` mismatch.
    pub fn clear(&mut self) {
        self.ranges.clear();
        self.subheaders.clear();
    }
}

/// Parse the value following `bytes=` against a file of `size` bytes.
///
/// Supported forms, comma separated:
/// - `start-end` - Specific inclusive range
/// - `start-` - From start to end of file
/// - `-suffix` - Last suffix bytes (clamped to the file)
///
/// # Examples
/// ```
/// use gx_httpd::http::range::parse_ranges;
///
/// let set = parse_ranges("0-99,200-", 1000).unwrap();
/// assert_eq!(set.len(), 2);
/// assert_eq!(set.get(1).unwrap().end, 1000);
///
/// assert!(parse_ranges("0-1000", 1000).is_err());
/// ```
pub fn parse_ranges(text: &str, size: u64) -> Result<ByteRangeSet, RangeError> {
    let text = text.trim();
    let count = text.bytes().filter(|&b| b == b',').count() + 1;

    let mut ranges = Vec::new();
    ranges
        .try_reserve_exact(count)
        .map_err(|_| RangeError::Allocation(count))?;
    let mut subheaders = Vec::new();
    subheaders
        .try_reserve_exact(count + 1)
        .map_err(|_| RangeError::Allocation(count))?;

    for part in text.split(',') {
        ranges.push(parse_one(part.trim(), size)?);
    }

    Ok(ByteRangeSet { ranges, subheaders })
}

fn parse_one(part: &str, size: u64) -> Result<ByteRange, RangeError> {
    let malformed = || RangeError::Malformed(part.to_string());
    let (first, last) = part.split_once('-').ok_or_else(malformed)?;

    let range = if first.is_empty() {
        let suffix = parse_offset(last).ok_or_else(malformed)?;
        ByteRange {
            start: size.saturating_sub(suffix),
            end: size,
        }
    } else {
        let start = parse_offset(first).ok_or_else(malformed)?;
        let end = if last.is_empty() {
            size
        } else {
            parse_offset(last)
                .and_then(|e| e.checked_add(1))
                .ok_or_else(malformed)?
        };
        ByteRange { start, end }
    };

    if range.start >= range.end || range.end > size {
        return Err(RangeError::OutOfBounds {
            start: range.start,
            end: range.end,
            size,
        });
    }
    Ok(range)
}

fn parse_offset(digits: &str) -> Option<u64> {
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spans(set: &ByteRangeSet) -> Vec<(u64, u64)> {
        set.iter().map(|r| (r.start, r.end)).collect()
    }

    #[test]
    fn test_standard_range() {
        let set = parse_ranges("0-9", 100).unwrap();
        assert_eq!(spans(&set), vec![(0, 10)]);
        assert_eq!(set.get(0).unwrap().len(), 10);
        assert_eq!(set.get(0).unwrap().last(), 9);
    }

    #[test]
    fn test_open_range() {
        let set = parse_ranges("50-", 100).unwrap();
        assert_eq!(spans(&set), vec![(50, 100)]);
    }

    #[test]
    fn test_suffix_range() {
        assert_eq!(spans(&parse_ranges("-20", 100).unwrap()), vec![(80, 100)]);
        assert_eq!(spans(&parse_ranges("-500", 100).unwrap()), vec![(0, 100)]);
    }

    #[test]
    fn test_multiple_ranges() {
        let set = parse_ranges("0-0, 10-19 ,-5", 100).unwrap();
        assert_eq!(spans(&set), vec![(0, 1), (10, 20), (95, 100)]);
    }

    #[test]
    fn test_last_byte_is_inclusive_bound() {
        assert_eq!(spans(&parse_ranges("99-99", 100).unwrap()), vec![(99, 100)]);
        assert!(matches!(
            parse_ranges("0-100", 100),
            Err(RangeError::OutOfBounds { .. })
        ));
    }

    #[test]
    fn test_empty_or_reversed_range_is_rejected() {
        assert!(parse_ranges("10-5", 100).is_err());
        assert!(parse_ranges("100-", 100).is_err());
        assert!(parse_ranges("-0", 100).is_err());
    }

    #[test]
    fn test_one_bad_range_rejects_all() {
        let err = parse_ranges("0-9,abc,20-29", 100).unwrap_err();
        assert_eq!(err, RangeError::Malformed("abc".to_string()));
        assert_eq!(err.status(), Status::BadRequest);
        assert!(parse_ranges("0-9,200-300", 100).is_err());
    }

    #[test]
    fn test_invalid_format() {
        for bad in ["", "a-b", "5", "1-2-3", "+1-2", "0-9x", "--5"] {
            assert!(parse_ranges(bad, 100).is_err(), "accepted {bad:?}");
        }
    }

    #[test]
    fn test_overflow_is_malformed() {
        assert!(matches!(
            parse_ranges("0-18446744073709551615", 100),
            Err(RangeError::Malformed(_))
        ));
    }

    #[test]
    fn test_allocation_error_maps_to_500() {
        assert_eq!(
            RangeError::Allocation(3).status(),
            Status::InternalServerError
        );
    }

    #[test]
    fn test_clear_drops_ranges() {
        let mut set = parse_ranges("0-1,4-5", 10).unwrap();
        set.clear();
        assert!(set.is_empty());
        assert_eq!(set.subheader(0), None);
    }
}
