use reqwest::header::HeaderMap;
use tokio::time::sleep;
use tracing::{error, info, warn};
use url::Url;

use crate::config::Config;
use crate::crawler::fetcher::{Fetcher, ImageHarvester};
use crate::crawler::models::ListingReference;
use crate::crawler::progress::{CancelToken, Progress};
use crate::crawler::{crawl_catalog, crawl_listing, ListingOutcome};
use crate::error::{Result, ScrapeError};
use crate::storage::{CrawlHistory, DatasetStore};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    Completed,
    /// Stopped early on request. Work done so far was still saved.
    Cancelled,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub status: RunStatus,
    /// Listings found on the catalog page.
    pub discovered: usize,
    /// Extracted records that carried a page id.
    pub new: usize,
    pub skipped: usize,
    pub failed: usize,
    /// All rows handed to the dataset, with or without id.
    pub extracted: usize,
    /// Dataset size after the merge; `None` when the dataset wasn't written.
    pub total_rows: Option<usize>,
    pub history_size: usize,
}

impl RunReport {
    fn new(status: RunStatus, history_size: usize) -> Self {
        Self {
            status,
            discovered: 0,
            new: 0,
            skipped: 0,
            failed: 0,
            extracted: 0,
            total_rows: None,
            history_size,
        }
    }

    pub fn is_success(&self) -> bool {
        !matches!(self.status, RunStatus::Failed(_))
    }
}

pub struct ScrapingService<F> {
    cfg: Config,
    fetcher: F,
    headers: HeaderMap,
    harvester: ImageHarvester,
    history: CrawlHistory,
    store: DatasetStore,
    cancel: CancelToken,
}

impl<F: Fetcher> ScrapingService<F> {
    /// Loads history and validates the configuration. No network access.
    pub fn new(cfg: Config, fetcher: F) -> Result<Self> {
        let headers = cfg.request_headers()?;
        let base = Url::parse(&cfg.base_url)
            .map_err(|e| ScrapeError::Validation(format!("bad base URL {}: {e}", cfg.base_url)))?;

        let harvester = ImageHarvester::new(
            base,
            cfg.image_path(),
            cfg.image_timeout(),
            cfg.image_delay(),
        );
        let history = CrawlHistory::load(cfg.history_path());
        let store = DatasetStore::new(cfg.csv_path(), cfg.json_path());

        Ok(Self {
            cfg,
            fetcher,
            headers,
            harvester,
            history,
            store,
            cancel: CancelToken::new(),
        })
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    pub fn history(&self) -> &CrawlHistory {
        &self.history
    }

    pub fn store(&self) -> &DatasetStore {
        &self.store
    }

    /// Operator action: forget every processed id, on disk too.
    pub fn reset_history(&mut self) {
        self.history.reset();
    }

    /// One full pass over the catalog. Never fails; problems end up in the report.
    pub async fn run(&mut self, progress: &mut dyn Progress) -> RunReport {
        info!(
            skip_processed = self.cfg.skip_processed,
            known = self.history.len(),
            max_items = self.cfg.max_items.get(),
            "Starting run"
        );

        let links = match crawl_catalog(&self.fetcher, &self.cfg, &self.headers).await {
            Ok(links) => links,
            Err(e) => {
                error!(error = %e, "Catalog unavailable, aborting run");
                let report = RunReport::new(RunStatus::Failed(e.to_string()), self.history.len());
                progress.finish(&report);
                return report;
            }
        };

        let total = links.len();
        progress.begin(total);

        let mut report = RunReport::new(RunStatus::Completed, 0);
        report.discovered = total;
        let mut rows = Vec::new();

        for (idx, reference) in links.iter().enumerate() {
            if self.cancel.is_cancelled() {
                warn!(done = idx, total, "Run cancelled");
                report.status = RunStatus::Cancelled;
                break;
            }

            let outcome = self.process(reference).await;

            match &outcome {
                ListingOutcome::Skipped => report.skipped += 1,
                ListingOutcome::Extracted(record) => {
                    if !record.id.is_empty() {
                        self.history.mark_processed(&record.id);
                        report.new += 1;
                    }
                    rows.push(record.clone());
                }
                ListingOutcome::Failed(e) => {
                    warn!(url = %reference.url, error = %e, "Listing failed");
                    report.failed += 1;
                }
            }

            progress.listing(idx + 1, total, reference, &outcome);

            let fetched = !matches!(outcome, ListingOutcome::Skipped);
            if fetched && idx + 1 < total {
                sleep(self.cfg.page_delay()).await;
            }
        }

        self.history.persist();
        report.history_size = self.history.len();
        report.extracted = rows.len();

        if rows.is_empty() {
            info!(skipped = report.skipped, "No new rows, dataset untouched");
        } else {
            match self.store.merge_and_persist(&rows) {
                Ok(total_rows) => report.total_rows = Some(total_rows),
                Err(e) => {
                    error!(error = %e, "Failed to write dataset");
                    report.status = RunStatus::Failed(e.to_string());
                }
            }
        }

        info!(
            new = report.new,
            skipped = report.skipped,
            failed = report.failed,
            total_rows = ?report.total_rows,
            "Run finished"
        );
        progress.finish(&report);
        report
    }

    async fn process(&self, reference: &ListingReference) -> ListingOutcome {
        let url_id = reference.id();

        if self.cfg.skip_processed && self.history.contains(url_id) {
            info!(id = %url_id, "Already processed, skipping");
            return ListingOutcome::Skipped;
        }

        info!(url = %reference.url, "Processing listing");

        match crawl_listing(&self.fetcher, &self.harvester, &self.headers, reference).await {
            Ok(record) => {
                if !record.id.is_empty() && record.id != url_id {
                    // Skip checks use the URL id, history stores the page id.
                    warn!(url_id = %url_id, page_id = %record.id, "Listing ids disagree");
                }
                info!(id = %record.id, images = record.image_count, "Listing extracted");
                ListingOutcome::Extracted(record)
            }
            Err(e) => ListingOutcome::Failed(e),
        }
    }
}
