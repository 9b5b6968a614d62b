pub mod dataset;
pub mod history;

pub use dataset::DatasetStore;
pub use history::CrawlHistory;
