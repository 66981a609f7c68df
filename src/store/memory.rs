//! In-memory object store

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::{
    common_prefix, paginate, ByteSpan, HttpMetadata, ListOptions, ListingPage, ObjectEntry,
    ObjectMeta, ObjectStore, ScanEntry, StoredObject,
};
use crate::error::Result;

#[derive(Debug, Clone)]
struct MemoryObject {
    data: Bytes,
    uploaded: DateTime<Utc>,
    http_metadata: HttpMetadata,
}

/// Object store held entirely in memory, keyed in sorted order
#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: RwLock<BTreeMap<String, MemoryObject>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an object with default metadata
    pub async fn put(&self, key: impl Into<String>, data: impl Into<Bytes>) {
        self.put_with_metadata(key, data, HttpMetadata::default()).await;
    }

    /// Store an object with explicit HTTP metadata
    pub async fn put_with_metadata(
        &self,
        key: impl Into<String>,
        data: impl Into<Bytes>,
        http_metadata: HttpMetadata,
    ) {
        let object = MemoryObject {
            data: data.into(),
            uploaded: Utc::now(),
            http_metadata,
        };
        self.objects.write().await.insert(key.into(), object);
    }

    /// Number of stored objects
    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    /// Check whether the store holds no objects
    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }

    fn meta(key: &str, object: &MemoryObject) -> ObjectMeta {
        ObjectMeta {
            key: key.to_string(),
            size: object.data.len() as u64,
            etag: format!("{:x}-{:x}", object.uploaded.timestamp_micros(), object.data.len()),
            uploaded: object.uploaded,
            http_metadata: object.http_metadata.clone(),
        }
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn list(&self, options: &ListOptions) -> Result<ListingPage> {
        let objects = self.objects.read().await;

        let mut prefixes = BTreeSet::new();
        let mut entries = Vec::new();
        for (key, object) in objects.range(options.prefix.clone()..) {
            if !key.starts_with(&options.prefix) {
                break;
            }
            match common_prefix(key, &options.prefix, options.delimiter.as_deref()) {
                Some(prefix) => {
                    prefixes.insert(prefix);
                }
                None => entries.push(ScanEntry::Object(ObjectEntry {
                    key: key.clone(),
                    size: object.data.len() as u64,
                    uploaded: object.uploaded,
                })),
            }
        }

        entries.extend(prefixes.into_iter().map(ScanEntry::Prefix));
        entries.sort_by(|a, b| a.key().cmp(b.key()));

        paginate(entries, options)
    }

    async fn get(&self, key: &str, span: Option<ByteSpan>) -> Result<Option<StoredObject>> {
        let objects = self.objects.read().await;
        let Some(object) = objects.get(key) else {
            return Ok(None);
        };

        let data = match span {
            Some(span) => {
                if span.end >= object.data.len() as u64 || span.start > span.end {
                    return Err(crate::Error::RangeUnsatisfiable { size: object.data.len() as u64 });
                }
                object.data.slice(span.start as usize..=span.end as usize)
            }
            None => object.data.clone(),
        };

        Ok(Some(StoredObject {
            meta: Self::meta(key, object),
            span,
            body: Box::pin(futures::stream::once(async move { Ok(data) })),
        }))
    }

    async fn head(&self, key: &str) -> Result<Option<ObjectMeta>> {
        let objects = self.objects.read().await;
        Ok(objects.get(key).map(|object| Self::meta(key, object)))
    }
}
