use reqwest::header::HeaderMap;
use tracing::{debug, info};

use crate::config::Config;
use crate::crawler::fetcher::{Fetcher, ImageHarvester};
use crate::crawler::models::{ListingRecord, ListingReference};
use crate::error::{Result, ScrapeError};

pub mod fetcher;
pub mod models;
pub mod parser;
pub mod progress;
pub mod service;

/// What happened to one listing. Every variant is terminal.
#[derive(Debug)]
pub enum ListingOutcome {
    Skipped,
    Extracted(ListingRecord),
    Failed(ScrapeError),
}

/// Detail-page references from the catalog. An empty result is an error:
/// the run cannot continue without at least one listing.
pub async fn crawl_catalog<F: Fetcher + ?Sized>(
    fetcher: &F,
    cfg: &Config,
    headers: &HeaderMap,
) -> Result<Vec<ListingReference>> {
    debug!(url = %cfg.list_url, "Fetching catalog page");

    let html = fetcher.fetch_document(&cfg.list_url, headers).await?;
    let links = parser::extract_item_links(&html, cfg.max_items.get());

    if links.is_empty() {
        return Err(ScrapeError::Parse(format!(
            "no listing URLs found on {}",
            cfg.list_url
        )));
    }

    info!(count = links.len(), "Found listing links");
    Ok(links)
}

/// Fetch one detail page, build its record and pull its images.
///
/// A record without a page id keeps its row but gets no images.
pub async fn crawl_listing<F: Fetcher + ?Sized>(
    fetcher: &F,
    harvester: &ImageHarvester,
    headers: &HeaderMap,
    reference: &ListingReference,
) -> Result<ListingRecord> {
    let html = fetcher.fetch_document(&reference.url, headers).await?;
    let page = parser::parse_detail_page(&html, &reference.url);

    let mut record = page.record;
    if record.id.is_empty() {
        record.clear_images();
    } else {
        let urls = harvester
            .harvest(fetcher, headers, &record.id, &page.image_candidates)
            .await;
        record.set_images(urls);
    }

    Ok(record)
}
