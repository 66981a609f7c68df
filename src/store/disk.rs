//! Local directory exposed as an object store
//!
//! Keys map onto paths relative to the store root: `docs/a.md` is
//! `<root>/docs/a.md`. Directories surface as common prefixes when listing
//! with the `/` delimiter.

use std::io::{self, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;
use tracing::debug;

use super::{
    paginate, ByteSpan, ByteStream, HttpMetadata, ListOptions, ListingPage, ObjectEntry, ObjectMeta,
    ObjectStore, ScanEntry, StoredObject,
};
use crate::error::Result;

/// Object store backed by a directory tree
#[derive(Debug, Clone)]
pub struct DiskStore {
    root: PathBuf,
    cache_control: Option<String>,
}

impl DiskStore {
    /// Expose `root` as an object store
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            cache_control: None,
        }
    }

    /// Attach a Cache-Control value to every object's metadata
    pub fn with_cache_control(mut self, cache_control: Option<String>) -> Self {
        self.cache_control = cache_control;
        self
    }

    /// Store root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map key components onto the filesystem, refusing anything that could
    /// escape the root
    fn resolve<'a>(&self, components: impl IntoIterator<Item = &'a str>) -> Option<PathBuf> {
        let mut path = self.root.clone();
        for component in components {
            if component.is_empty()
                || component == "."
                || component == ".."
                || component.contains('\\')
                || component.contains('\0')
            {
                return None;
            }
            path.push(component);
        }
        Some(path)
    }

    fn resolve_key(&self, key: &str) -> Option<PathBuf> {
        if key.is_empty() || key.ends_with('/') {
            return None;
        }
        self.resolve(key.split('/'))
    }

    fn meta(&self, key: &str, path: &Path, metadata: &std::fs::Metadata) -> ObjectMeta {
        let uploaded = to_utc(metadata.modified().ok());
        let content_type = mime_guess::from_path(path)
            .first_or_octet_stream()
            .essence_str()
            .to_string();

        ObjectMeta {
            key: key.to_string(),
            size: metadata.len(),
            etag: format!("{:x}-{:x}", uploaded.timestamp_micros(), metadata.len()),
            uploaded,
            http_metadata: HttpMetadata {
                content_type: Some(content_type),
                cache_control: self.cache_control.clone(),
                ..Default::default()
            },
        }
    }

    /// Scan the directory a delimited prefix points into
    async fn scan_delimited(&self, dir_key: &str, name_prefix: &str) -> Result<Vec<ScanEntry>> {
        let Some(dir) = self.resolve(dir_key.split('/').filter(|c| !c.is_empty())) else {
            return Ok(Vec::new());
        };

        let mut entries = Vec::new();
        let Some(mut read_dir) = open_dir(&dir).await? else {
            return Ok(entries);
        };

        while let Some(entry) = read_dir.next_entry().await? {
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                debug!("Skipping non UTF-8 entry in {:?}", dir);
                continue;
            };
            if !name.starts_with(name_prefix) {
                continue;
            }

            let Some(metadata) = entry_metadata(&entry).await else {
                continue;
            };

            let key = format!("{}{}", dir_key, name);
            if metadata.is_dir() {
                entries.push(ScanEntry::Prefix(format!("{}/", key)));
            } else if metadata.is_file() {
                entries.push(ScanEntry::Object(object_entry(key, &metadata)));
            }
        }

        Ok(entries)
    }

    /// Walk every file below the prefix's directory
    async fn scan_recursive(&self, dir_key: &str, prefix: &str) -> Result<Vec<ScanEntry>> {
        let Some(dir) = self.resolve(dir_key.split('/').filter(|c| !c.is_empty())) else {
            return Ok(Vec::new());
        };

        let mut entries = Vec::new();
        let top_len = dir_key.len();
        let mut pending = vec![(dir, dir_key.to_string())];

        while let Some((dir, dir_key)) = pending.pop() {
            let is_top = dir_key.len() == top_len;
            let mut read_dir = match open_dir(&dir).await {
                Ok(Some(rd)) => rd,
                Ok(None) => continue,
                Err(e) if !is_top => {
                    debug!("Skipping unreadable directory {:?}: {}", dir, e);
                    continue;
                }
                Err(e) => return Err(e),
            };

            while let Some(entry) = read_dir.next_entry().await? {
                let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                    continue;
                };
                let Some(metadata) = entry_metadata(&entry).await else {
                    continue;
                };

                let key = format!("{}{}", dir_key, name);
                if metadata.is_dir() {
                    // Linked directories may point back up the tree
                    let linked = entry.file_type().await.map(|t| t.is_symlink()).unwrap_or(true);
                    if linked {
                        debug!("Not descending into linked directory {:?}", entry.path());
                    } else {
                        pending.push((entry.path(), format!("{}/", key)));
                    }
                } else if metadata.is_file() && key.starts_with(prefix) {
                    entries.push(ScanEntry::Object(object_entry(key, &metadata)));
                }
            }
        }

        Ok(entries)
    }
}

#[async_trait]
impl ObjectStore for DiskStore {
    async fn list(&self, options: &ListOptions) -> Result<ListingPage> {
        // "docs/ma" lists <root>/docs filtered to names starting with "ma"
        let split = options.prefix.rfind('/').map(|i| i + 1).unwrap_or(0);
        let (dir_key, name_prefix) = options.prefix.split_at(split);

        let mut entries = match options.delimiter.as_deref() {
            Some("/") => self.scan_delimited(dir_key, name_prefix).await?,
            Some(other) if !other.is_empty() => {
                return Err(crate::Error::Upstream(format!(
                    "unsupported list delimiter {:?}",
                    other
                )));
            }
            _ => self.scan_recursive(dir_key, &options.prefix).await?,
        };

        entries.sort_by(|a, b| a.key().cmp(b.key()));
        paginate(entries, options)
    }

    async fn get(&self, key: &str, span: Option<ByteSpan>) -> Result<Option<StoredObject>> {
        let Some(path) = self.resolve_key(key) else {
            return Ok(None);
        };

        let metadata = match fs::metadata(&path).await {
            Ok(m) if m.is_file() => m,
            Ok(_) => return Ok(None),
            Err(e) if is_missing(&e) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let meta = self.meta(key, &path, &metadata);

        let mut file = fs::File::open(&path).await?;
        let body: ByteStream = match span {
            Some(span) => {
                if span.start > span.end || span.end >= meta.size {
                    return Err(crate::Error::RangeUnsatisfiable { size: meta.size });
                }
                file.seek(SeekFrom::Start(span.start)).await?;
                Box::pin(ReaderStream::new(file.take(span.len())))
            }
            None => Box::pin(ReaderStream::new(file)),
        };

        Ok(Some(StoredObject { meta, span, body }))
    }

    async fn head(&self, key: &str) -> Result<Option<ObjectMeta>> {
        let Some(path) = self.resolve_key(key) else {
            return Ok(None);
        };

        match fs::metadata(&path).await {
            Ok(m) if m.is_file() => Ok(Some(self.meta(key, &path, &m))),
            Ok(_) => Ok(None),
            Err(e) if is_missing(&e) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

fn object_entry(key: String, metadata: &std::fs::Metadata) -> ObjectEntry {
    ObjectEntry {
        key,
        size: metadata.len(),
        uploaded: to_utc(metadata.modified().ok()),
    }
}

fn to_utc(time: Option<SystemTime>) -> DateTime<Utc> {
    time.map(DateTime::<Utc>::from).unwrap_or_default()
}

/// Open a directory for reading; a missing path or a non-directory yields `None`
async fn open_dir(dir: &Path) -> Result<Option<fs::ReadDir>> {
    match fs::metadata(dir).await {
        Ok(m) if m.is_dir() => {}
        Ok(_) => return Ok(None),
        Err(e) if is_missing(&e) => return Ok(None),
        Err(e) => return Err(e.into()),
    }
    match fs::read_dir(dir).await {
        Ok(rd) => Ok(Some(rd)),
        Err(e) if is_missing(&e) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Stat a directory entry, following symlinks; entries that cannot be read are skipped
async fn entry_metadata(entry: &fs::DirEntry) -> Option<std::fs::Metadata> {
    match fs::metadata(entry.path()).await {
        Ok(m) => Some(m),
        Err(e) if is_missing(&e) => None,
        Err(e) => {
            debug!("Skipping unreadable entry {:?}: {}", entry.path(), e);
            None
        }
    }
}

fn is_missing(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::NotFound
}
