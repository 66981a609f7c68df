//! Static Asset Host
//!
//! Delivers the directory-browser page. The page itself renders listings
//! client-side from the JSON API.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;

/// Page shipped with the binary
const BUILTIN_INDEX: &str = include_str!("../assets/index.html");

/// Static asset body and type
#[derive(Debug, Clone)]
pub struct Asset {
    pub body: Bytes,
    pub content_type: String,
}

/// Source of static assets
#[async_trait]
pub trait AssetHost: Send + Sync {
    /// Fetch an asset by absolute path (`/index.html`)
    async fn fetch(&self, path: &str) -> Result<Option<Asset>>;
}

/// Assets compiled into the binary
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinAssets;

#[async_trait]
impl AssetHost for BuiltinAssets {
    async fn fetch(&self, path: &str) -> Result<Option<Asset>> {
        match path {
            "/" | "/index.html" => Ok(Some(Asset {
                body: Bytes::from_static(BUILTIN_INDEX.as_bytes()),
                content_type: "text/html; charset=utf-8".to_string(),
            })),
            _ => Ok(None),
        }
    }
}

/// Assets served from a directory
#[derive(Debug, Clone)]
pub struct DirAssets {
    root: PathBuf,
}

impl DirAssets {
    /// Serve assets from `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> Option<PathBuf> {
        let relative = Path::new(path.trim_start_matches('/'));
        if !relative.components().all(|c| matches!(c, Component::Normal(_))) {
            return None;
        }
        Some(self.root.join(relative))
    }
}

#[async_trait]
impl AssetHost for DirAssets {
    async fn fetch(&self, path: &str) -> Result<Option<Asset>> {
        let path = if path == "/" { "/index.html" } else { path };
        let Some(file) = self.resolve(path) else {
            return Ok(None);
        };

        match tokio::fs::read(&file).await {
            Ok(data) => Ok(Some(Asset {
                body: Bytes::from(data),
                content_type: mime_guess::from_path(&file)
                    .first_or_octet_stream()
                    .essence_str()
                    .to_string(),
            })),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(crate::Error::Upstream(format!(
                "failed to read asset {:?}: {}",
                file, e
            ))),
        }
    }
}
