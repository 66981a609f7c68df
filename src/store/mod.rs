//! Object Store Module
//!
//! The flat, prefix-addressable key space the gateway browses. Keys are
//! slash-delimited strings without a leading separator; listing groups keys
//! into common prefixes on a delimiter and pages through results with an
//! opaque cursor.

mod disk;
mod memory;

pub use disk::DiskStore;
pub use memory::MemoryStore;

use std::io;
use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::Stream;

use crate::error::Result;

/// Streamed object body
pub type ByteStream = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send>>;

/// Parameters of one list call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListOptions {
    /// Only keys starting with this prefix are returned
    pub prefix: String,
    /// Keys are grouped into common prefixes up to the first delimiter after `prefix`
    pub delimiter: Option<String>,
    /// Maximum number of objects plus prefixes in one page
    pub limit: usize,
    /// Continuation token from the previous page
    pub cursor: Option<String>,
}

/// Stored blob as reported by a listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectEntry {
    pub key: String,
    pub size: u64,
    pub uploaded: DateTime<Utc>,
}

/// One page of a listing
#[derive(Debug, Clone, Default)]
pub struct ListingPage {
    pub objects: Vec<ObjectEntry>,
    /// Common prefixes, each ending in the delimiter
    pub prefixes: Vec<String>,
    pub truncated: bool,
    /// Present iff `truncated`
    pub cursor: Option<String>,
}

/// Standard HTTP headers stored alongside an object
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpMetadata {
    pub content_type: Option<String>,
    pub content_language: Option<String>,
    pub content_disposition: Option<String>,
    pub content_encoding: Option<String>,
    pub cache_control: Option<String>,
    pub expires: Option<DateTime<Utc>>,
}

/// Object metadata without the body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMeta {
    pub key: String,
    pub size: u64,
    /// Unquoted entity tag
    pub etag: String,
    pub uploaded: DateTime<Utc>,
    pub http_metadata: HttpMetadata,
}

impl ObjectMeta {
    /// Entity tag in its quoted header form
    pub fn http_etag(&self) -> String {
        format!("\"{}\"", self.etag)
    }
}

/// Inclusive byte span of an object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteSpan {
    pub start: u64,
    pub end: u64,
}

#[allow(clippy::len_without_is_empty)]
impl ByteSpan {
    /// Number of bytes covered
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }
}

/// Object returned by a get
pub struct StoredObject {
    pub meta: ObjectMeta,
    /// Span the body covers; `None` for the whole object
    pub span: Option<ByteSpan>,
    pub body: ByteStream,
}

impl std::fmt::Debug for StoredObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoredObject")
            .field("meta", &self.meta)
            .field("span", &self.span)
            .finish_non_exhaustive()
    }
}

/// Object store the gateway reads from
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// List keys under a prefix, one page at a time
    async fn list(&self, options: &ListOptions) -> Result<ListingPage>;

    /// Fetch an object, optionally restricted to a byte span
    ///
    /// The span must lie within the object; callers validate it against
    /// [`ObjectStore::head`] first.
    async fn get(&self, key: &str, span: Option<ByteSpan>) -> Result<Option<StoredObject>>;

    /// Fetch object metadata only
    async fn head(&self, key: &str) -> Result<Option<ObjectMeta>>;
}

/// Build the opaque continuation token that resumes after `key`
pub(crate) fn encode_cursor(key: &str) -> String {
    hex::encode(key.as_bytes())
}

/// Recover the resume key from a continuation token
pub(crate) fn decode_cursor(cursor: &str) -> Result<String> {
    let bytes = hex::decode(cursor)
        .map_err(|e| crate::Error::Upstream(format!("invalid list cursor: {}", e)))?;
    String::from_utf8(bytes)
        .map_err(|e| crate::Error::Upstream(format!("invalid list cursor: {}", e)))
}

/// Entry produced while scanning a key space, before paging
#[derive(Debug, Clone)]
pub(crate) enum ScanEntry {
    Object(ObjectEntry),
    Prefix(String),
}

impl ScanEntry {
    fn key(&self) -> &str {
        match self {
            ScanEntry::Object(o) => &o.key,
            ScanEntry::Prefix(p) => p,
        }
    }
}

/// Cut one page out of key-sorted, deduplicated scan entries
pub(crate) fn paginate(entries: Vec<ScanEntry>, options: &ListOptions) -> Result<ListingPage> {
    let resume_after = match &options.cursor {
        Some(cursor) => Some(decode_cursor(cursor)?),
        None => None,
    };
    let limit = options.limit.max(1);

    let mut remaining = entries
        .into_iter()
        .filter(|e| match &resume_after {
            Some(after) => e.key() > after.as_str(),
            None => true,
        })
        .peekable();

    let mut page = ListingPage::default();
    let mut last_key = None;
    for entry in remaining.by_ref().take(limit) {
        last_key = Some(entry.key().to_string());
        match entry {
            ScanEntry::Object(o) => page.objects.push(o),
            ScanEntry::Prefix(p) => page.prefixes.push(p),
        }
    }

    if remaining.peek().is_some() {
        page.truncated = true;
        page.cursor = last_key.as_deref().map(encode_cursor);
    }

    Ok(page)
}

/// Group a key under `prefix` by the delimiter
///
/// Returns the common prefix the key rolls up into, or `None` when the key
/// is reported as an object.
pub(crate) fn common_prefix(key: &str, prefix: &str, delimiter: Option<&str>) -> Option<String> {
    let delimiter = delimiter.filter(|d| !d.is_empty())?;
    let rest = key.strip_prefix(prefix)?;
    rest.find(delimiter)
        .map(|pos| format!("{}{}", prefix, &rest[..pos + delimiter.len()]))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn object(key: &str) -> ScanEntry {
        ScanEntry::Object(ObjectEntry {
            key: key.to_string(),
            size: 1,
            uploaded: Utc::now(),
        })
    }

    #[test]
    fn test_cursor_is_opaque_hex() {
        let cursor = encode_cursor("photos/2024/");
        assert!(cursor.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(decode_cursor(&cursor).unwrap(), "photos/2024/");
        assert!(decode_cursor("zz").is_err());
    }

    #[test]
    fn test_common_prefix() {
        assert_eq!(common_prefix("a/b/c.txt", "a/", Some("/")), Some("a/b/".to_string()));
        assert_eq!(common_prefix("a/c.txt", "a/", Some("/")), None);
        assert_eq!(common_prefix("a/b/c.txt", "a/", None), None);
        assert_eq!(common_prefix("a/b/c.txt", "", Some("/")), Some("a/".to_string()));
    }

    #[test]
    fn test_paginate_sets_cursor_only_when_truncated() {
        let entries = vec![object("a"), ScanEntry::Prefix("b/".into()), object("c")];
        let options = ListOptions { limit: 2, ..Default::default() };

        let first = paginate(entries.clone(), &options).unwrap();
        assert!(first.truncated);
        assert_eq!(first.objects.len(), 1);
        assert_eq!(first.prefixes, vec!["b/".to_string()]);

        let options = ListOptions { cursor: first.cursor, ..options };
        let second = paginate(entries, &options).unwrap();
        assert!(!second.truncated);
        assert!(second.cursor.is_none());
        assert_eq!(second.objects[0].key, "c");
    }

    #[test]
    fn test_byte_span_len() {
        assert_eq!(ByteSpan { start: 0, end: 49 }.len(), 50);
        assert_eq!(ByteSpan { start: 7, end: 7 }.len(), 1);
    }
}
