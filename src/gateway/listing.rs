//! Listing Aggregator
//!
//! Pages through the store for one directory prefix and merges every page
//! into a single [`DirectorySnapshot`]. Each page fetch is admitted by the
//! gate on its own, so a denial halfway through fails the whole listing.

use std::collections::{BTreeSet, HashSet};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use super::path::{directory_name, display_path, object_name, parent_of, DenyList, SEPARATOR};
use crate::error::{Error, Result};
use crate::gate::AdmissionGate;
use crate::store::{ListOptions, ListingPage, ObjectEntry, ObjectStore};

/// Common prefix shown as a subdirectory
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryEntry {
    pub key: String,
    pub name: String,
    pub is_directory: bool,
}

/// Stored object shown as a file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    pub key: String,
    pub name: String,
    pub size: u64,
    pub uploaded: DateTime<Utc>,
    pub is_directory: bool,
}

/// One row of a directory listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum DirectoryItem {
    Directory(DirectoryEntry),
    File(FileEntry),
}

impl DirectoryItem {
    pub fn key(&self) -> &str {
        match self {
            DirectoryItem::Directory(d) => &d.key,
            DirectoryItem::File(f) => &f.key,
        }
    }

    pub fn is_directory(&self) -> bool {
        matches!(self, DirectoryItem::Directory(_))
    }
}

/// Merged view of one directory; subdirectories precede files
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirectorySnapshot {
    pub path: String,
    pub items: Vec<DirectoryItem>,
    pub parent: Option<String>,
}

impl From<String> for DirectoryEntry {
    fn from(prefix: String) -> Self {
        Self {
            name: directory_name(&prefix).to_string(),
            key: prefix,
            is_directory: true,
        }
    }
}

impl From<ObjectEntry> for FileEntry {
    fn from(object: ObjectEntry) -> Self {
        Self {
            name: object_name(&object.key).to_string(),
            key: object.key,
            size: object.size,
            uploaded: object.uploaded,
            is_directory: false,
        }
    }
}

/// Objects and prefixes collected across pages
#[derive(Debug, Default)]
struct Accumulator {
    objects: Vec<ObjectEntry>,
    object_keys: HashSet<String>,
    prefixes: BTreeSet<String>,
}

impl Accumulator {
    fn absorb(&mut self, page: ListingPage, deny: &DenyList) {
        for object in page.objects {
            if deny.is_denied(&object.key) {
                continue;
            }
            if self.object_keys.insert(object.key.clone()) {
                self.objects.push(object);
            }
        }
        self.prefixes
            .extend(page.prefixes.into_iter().filter(|p| !deny.is_denied(p)));
    }

    fn is_empty(&self) -> bool {
        self.objects.is_empty() && self.prefixes.is_empty()
    }

    fn into_items(self) -> Vec<DirectoryItem> {
        let Accumulator { objects, prefixes, .. } = self;
        // An object whose key equals a prefix would duplicate the row
        let objects = objects.into_iter().filter(|o| !prefixes.contains(&o.key));

        prefixes
            .iter()
            .cloned()
            .map(|p| DirectoryItem::Directory(p.into()))
            .chain(objects.map(|o| DirectoryItem::File(o.into())))
            .collect()
    }
}

/// Paginating directory lister over a store and gate
pub struct ListingAggregator<'a> {
    store: &'a dyn ObjectStore,
    gate: &'a dyn AdmissionGate,
    deny: &'a DenyList,
    rate_bucket: &'a str,
    max_pages: usize,
}

impl<'a> ListingAggregator<'a> {
    pub fn new(
        store: &'a dyn ObjectStore,
        gate: &'a dyn AdmissionGate,
        deny: &'a DenyList,
        rate_bucket: &'a str,
        max_pages: usize,
    ) -> Self {
        Self {
            store,
            gate,
            deny,
            rate_bucket,
            max_pages: max_pages.max(1),
        }
    }

    /// Fetch one page, asking the gate first
    async fn fetch_page(
        &self,
        prefix: &str,
        page_limit: usize,
        cursor: Option<String>,
    ) -> Result<ListingPage> {
        if !self.gate.check(self.rate_bucket).await {
            warn!("Listing of {:?} denied by admission gate", prefix);
            return Err(Error::RateLimited(self.rate_bucket.to_string()));
        }

        let options = ListOptions {
            prefix: prefix.to_string(),
            delimiter: Some(SEPARATOR.to_string()),
            limit: page_limit,
            cursor,
        };
        self.store.list(&options).await
    }

    /// List a directory prefix across every page the store returns
    ///
    /// Fails with [`Error::NotFound`] when the prefix holds no visible objects
    /// or prefixes.
    pub async fn list_directory(&self, prefix: &str, page_limit: usize) -> Result<DirectorySnapshot> {
        if self.deny.is_denied(prefix) {
            return Err(Error::NotFound(display_path(prefix)));
        }

        let mut acc = Accumulator::default();
        let mut cursor = None;
        let mut pages = 0;

        loop {
            if pages == self.max_pages {
                warn!("Listing of {:?} exceeded {} pages", prefix, self.max_pages);
                return Err(Error::ListingTooLarge { pages });
            }

            let page = self.fetch_page(prefix, page_limit, cursor.take()).await?;
            pages += 1;

            let truncated = page.truncated;
            let next = page.cursor.clone();
            debug!(
                "Listing page {} of {:?}: {} objects, {} prefixes, truncated={}",
                pages,
                prefix,
                page.objects.len(),
                page.prefixes.len(),
                truncated
            );
            acc.absorb(page, self.deny);

            if !truncated {
                break;
            }
            match next {
                Some(next) => cursor = Some(next),
                None => {
                    return Err(Error::Upstream(
                        "store returned a truncated page without a cursor".into(),
                    ));
                }
            }
        }

        if acc.is_empty() {
            return Err(Error::NotFound(display_path(prefix)));
        }

        Ok(DirectorySnapshot {
            path: display_path(prefix),
            items: acc.into_items(),
            parent: parent_of(prefix),
        })
    }

    /// Check that a directory prefix has something to show, using one page
    pub async fn exists(&self, prefix: &str, page_limit: usize) -> Result<bool> {
        if self.deny.is_denied(prefix) {
            return Ok(false);
        }

        let page = self.fetch_page(prefix, page_limit, None).await?;
        let truncated = page.truncated;
        let mut acc = Accumulator::default();
        acc.absorb(page, self.deny);

        Ok(!acc.is_empty() || truncated)
    }
}
