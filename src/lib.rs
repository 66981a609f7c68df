//! WolfBrowse - Object Store File Browser Gateway
//!
//! An HTTP gateway that presents a flat, key-addressed object store as a
//! browsable file tree. Directory paths render a browser page or a JSON
//! snapshot, file paths stream object bodies with single-range support.
//!
//! # Architecture
//!
//! Each request is classified on two axes: directory or file, HTML or JSON.
//! Directory requests go through the listing aggregator, which pages through
//! the store under an admission gate and merges the results into one
//! snapshot. File requests go through the range resolver before the object
//! is fetched and streamed.
//!
//! # Features
//!
//! - Paginated prefix listings merged into a single directory snapshot
//! - Fixed-window rate limiting per listing page and per file read
//! - Single byte-range requests with suffix ranges
//! - Local directory and in-memory object stores
//! - Built-in or on-disk directory browser page
//! - Deny list of hidden key prefixes

pub mod config;
pub mod error;
pub mod store;
pub mod gate;
pub mod assets;
pub mod gateway;

pub use config::WolfBrowseConfig;
pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::WolfBrowseConfig;
    pub use crate::error::{Error, Result};
    pub use crate::store::{ObjectStore, DiskStore, MemoryStore, ListOptions, ListingPage};
    pub use crate::gate::{AdmissionGate, AllowAll, FixedWindowLimiter};
    pub use crate::assets::{AssetHost, BuiltinAssets, DirAssets};
    pub use crate::gateway::{GatewayServer, DirectorySnapshot, RangeResolution};
}
