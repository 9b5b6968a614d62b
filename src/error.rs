use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScrapeError {
    /// Transport failure, timeout or a non-success status.
    #[error("network error: {0}")]
    Network(String),

    /// Malformed structured data or missing expected markup.
    #[error("parse error: {0}")]
    Parse(String),

    /// Filesystem read/write or serialization failure.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// Bad operator input, rejected before any network activity.
    #[error("invalid input: {0}")]
    Validation(String),
}

pub type Result<T> = std::result::Result<T, ScrapeError>;

impl From<reqwest::Error> for ScrapeError {
    fn from(e: reqwest::Error) -> Self {
        ScrapeError::Network(e.to_string())
    }
}

impl From<std::io::Error> for ScrapeError {
    fn from(e: std::io::Error) -> Self {
        ScrapeError::Persistence(e.to_string())
    }
}

impl From<csv::Error> for ScrapeError {
    fn from(e: csv::Error) -> Self {
        ScrapeError::Persistence(e.to_string())
    }
}

impl From<serde_json::Error> for ScrapeError {
    fn from(e: serde_json::Error) -> Self {
        ScrapeError::Persistence(e.to_string())
    }
}
