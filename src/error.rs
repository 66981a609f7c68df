//! WolfBrowse Error Types

use axum::http::StatusCode;
use thiserror::Error;

/// Result type alias for WolfBrowse operations
pub type Result<T> = std::result::Result<T, Error>;

/// WolfBrowse error types
#[derive(Error, Debug)]
pub enum Error {
    // Request errors
    #[error("Too Many Requests: bucket {0} is rate limited")]
    RateLimited(String),

    #[error("Not Found: {0}")]
    NotFound(String),

    #[error("Range Not Satisfiable for object of {size} bytes")]
    RangeUnsatisfiable { size: u64 },

    #[error("Method Not Allowed: {0}")]
    MethodNotAllowed(String),

    // Upstream errors
    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Listing exceeded {pages} pages")]
    ListingTooLarge { pages: usize },

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// HTTP status a request failing with this error is answered with
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::RangeUnsatisfiable { .. } => StatusCode::RANGE_NOT_SATISFIABLE,
            Error::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            Error::Upstream(_) | Error::Io(_) => StatusCode::BAD_GATEWAY,
            Error::ListingTooLarge { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Error::Config(_) | Error::ConfigParse(_) | Error::TomlSer(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Check if this error comes from the store or asset host rather than the request
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            Error::Upstream(_) | Error::Io(_) | Error::ListingTooLarge { .. }
        )
    }
}
