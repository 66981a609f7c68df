//! HTTP gateway: path classification, listing aggregation, range
//! resolution, response building and the axum server that ties them together

mod server;

pub mod listing;
pub mod path;
pub mod range;
pub mod response;

pub use listing::{DirectoryEntry, DirectoryItem, DirectorySnapshot, FileEntry, ListingAggregator};
pub use path::{classify, DenyList, Route, Target, View};
pub use range::{parse_range_header, resolve_range, ByteRange, RangeRequest, RangeResolution};
pub use response::{Outcome, ResponseOptions};
pub use server::{AppState, GatewayServer};
