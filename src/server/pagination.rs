//! Cursor-based pagination
//!
//! Cursors are opaque to callers: URL-safe base64 of a small JSON object
//! `{"offset":N,"page_size":M}`. Plain JSON cursors are accepted as well so that
//! clients holding cursors from older servers keep working. Every decoded cursor is
//! bounds-checked; out-of-range values are rejected, never clamped.

use crate::error::{HomeyError, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};

/// Default page size when no cursor is supplied
pub const DEFAULT_PAGE_SIZE: usize = 25;

/// Default upper bound for page sizes
pub const MAX_PAGE_SIZE: usize = 100;

/// Decoded pagination position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Cursor {
    pub offset: usize,
    pub page_size: usize,
}

/// One page of an ordered sequence
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total_count: usize,
    pub offset: usize,
    pub page_size: usize,
    pub has_next: bool,
    pub next_cursor: Option<String>,
}

/// Wire form of a cursor. Signed on purpose so negative offsets are reported as
/// such instead of as a type mismatch.
#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct CursorWire {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    offset: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    page_size: Option<i64>,
}

/// Encodes, decodes and applies pagination cursors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageCodec {
    default_page_size: usize,
    max_page_size: usize,
}

impl Default for PageCodec {
    fn default() -> Self {
        Self {
            default_page_size: DEFAULT_PAGE_SIZE,
            max_page_size: MAX_PAGE_SIZE,
        }
    }
}

impl PageCodec {
    /// Create a codec; `default_page_size` must lie within `[1, max_page_size]`
    pub fn new(default_page_size: usize, max_page_size: usize) -> Result<Self> {
        if max_page_size == 0 {
            return Err(HomeyError::config("max page size must be at least 1"));
        }
        if default_page_size == 0 || default_page_size > max_page_size {
            return Err(HomeyError::config(format!(
                "default page size {default_page_size} must be between 1 and {max_page_size}"
            )));
        }

        Ok(Self {
            default_page_size,
            max_page_size,
        })
    }

    pub fn default_page_size(&self) -> usize {
        self.default_page_size
    }

    pub fn max_page_size(&self) -> usize {
        self.max_page_size
    }

    /// Cursor for the first page
    pub fn first_page(&self) -> Cursor {
        Cursor {
            offset: 0,
            page_size: self.default_page_size,
        }
    }

    /// Decode a caller-supplied cursor. `None`, blank and `"null"` mean the first page.
    pub fn decode(&self, cursor: Option<&str>) -> Result<Cursor> {
        let raw = match cursor.map(str::trim) {
            None | Some("") | Some("null") => return Ok(self.first_page()),
            Some(raw) => raw,
        };

        let json = if raw.starts_with('{') {
            raw.as_bytes().to_vec()
        } else {
            URL_SAFE_NO_PAD
                .decode(raw)
                .map_err(|e| HomeyError::invalid_cursor(format!("not a valid cursor token: {e}")))?
        };

        let wire: CursorWire = serde_json::from_slice(&json)
            .map_err(|e| HomeyError::invalid_cursor(format!("malformed cursor: {e}")))?;

        self.validate(wire)
    }

    fn validate(&self, wire: CursorWire) -> Result<Cursor> {
        let offset = wire.offset.unwrap_or(0);
        if offset < 0 {
            return Err(HomeyError::invalid_cursor(
                "offset must be a non-negative integer",
            ));
        }
        let offset = usize::try_from(offset)
            .map_err(|_| HomeyError::invalid_cursor("offset out of range"))?;

        let page_size = match wire.page_size {
            None => self.default_page_size,
            Some(size) if size >= 1 && size as u64 <= self.max_page_size as u64 => size as usize,
            Some(_) => {
                return Err(HomeyError::invalid_cursor(format!(
                    "page size must be between 1 and {}",
                    self.max_page_size
                )))
            }
        };

        Ok(Cursor { offset, page_size })
    }

    /// Encode a cursor. Deterministic: equal cursors give equal strings.
    pub fn encode(&self, cursor: &Cursor) -> String {
        // Offsets beyond i64::MAX cannot be produced by paginate over an in-memory slice.
        let wire = CursorWire {
            offset: Some(i64::try_from(cursor.offset).unwrap_or(i64::MAX)),
            page_size: Some(i64::try_from(cursor.page_size).unwrap_or(i64::MAX)),
        };
        let json = serde_json::to_vec(&wire).unwrap_or_default();
        URL_SAFE_NO_PAD.encode(json)
    }

    /// Slice `items` according to `cursor`
    pub fn paginate<T: Clone>(&self, items: &[T], cursor: &Cursor) -> Page<T> {
        let total_count = items.len();
        let start = cursor.offset.min(total_count);
        let end = cursor.offset.saturating_add(cursor.page_size).min(total_count);
        let has_next = cursor.offset.saturating_add(cursor.page_size) < total_count;

        let next_cursor = has_next.then(|| {
            self.encode(&Cursor {
                offset: cursor.offset + cursor.page_size,
                page_size: cursor.page_size,
            })
        });

        Page {
            items: items[start..end].to_vec(),
            total_count,
            offset: cursor.offset,
            page_size: cursor.page_size,
            has_next,
            next_cursor,
        }
    }
}
