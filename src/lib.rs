pub mod config;
pub mod crawler;
pub mod error;
pub mod storage;

pub use config::Config;
pub use crawler::fetcher::{Fetcher, HttpFetcher};
pub use crawler::progress::{CancelToken, NullProgress, Progress};
pub use crawler::service::{RunReport, RunStatus, ScrapingService};
pub use error::{Result, ScrapeError};
