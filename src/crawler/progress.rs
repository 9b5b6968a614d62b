use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::crawler::models::ListingReference;
use crate::crawler::service::RunReport;
use crate::crawler::ListingOutcome;

/// Progress sink for whatever drives the run (terminal, GUI, tests).
pub trait Progress {
    /// Number of listings found on the catalog page.
    fn begin(&mut self, _total: usize) {}

    /// Called once per listing, after it reached a terminal state. `index` is 1-based.
    fn listing(
        &mut self,
        _index: usize,
        _total: usize,
        _reference: &ListingReference,
        _outcome: &ListingOutcome,
    ) {
    }

    fn finish(&mut self, _report: &RunReport) {}
}

pub struct NullProgress;
impl Progress for NullProgress {}

/// Stop request, checked between listings only.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if a stop had already been requested.
    pub fn cancel(&self) -> bool {
        self.0.swap(true, Ordering::SeqCst)
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
