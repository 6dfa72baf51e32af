//! Output errors and report data types
//!
//! This module defines the error type for report writing and the data
//! structures that make up a run summary.

use crate::pipeline::{Phase, PhaseResult};
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors that can occur during output operations
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Failed to format output: {0}")]
    Format(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// Phase results for one vendor, keyed by phase
pub type VendorResults = BTreeMap<Phase, PhaseResult>;

/// Estimated spend for a set of phase results (USD)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CostEstimate {
    pub scraping: f64,
    pub classification: f64,
    pub total: f64,
}

/// Aggregated counts across phases
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunTotals {
    pub urls_discovered: usize,
    pub urls_scraped: usize,
    pub references_loaded: usize,
    pub references_classified: usize,
    pub failures: usize,
}

impl RunTotals {
    /// Sums the counts of one vendor's phase results
    pub fn from_results(results: &VendorResults) -> Self {
        let mut totals = Self::default();
        totals.add(results);
        totals
    }

    pub fn add(&mut self, results: &VendorResults) {
        for result in results.values() {
            match result.phase {
                Phase::Discovery => self.urls_discovered += result.new,
                Phase::Scraping => self.urls_scraped += result.scraped,
                Phase::Loading => self.references_loaded += result.loaded,
                Phase::Classification => self.references_classified += result.classified,
            }
            self.failures += result.failed;
        }
    }
}

/// Summary of one pipeline invocation
///
/// Written once to `<logs>/pipeline_report_<ts>.json` and never updated.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub start_time: String,
    pub end_time: String,
    pub elapsed_seconds: f64,
    pub dry_run: bool,
    pub interrupted: bool,
    pub config_hash: String,
    pub vendors_processed: usize,
    pub totals: RunTotals,
    pub costs: CostEstimate,
    pub vendor_costs: BTreeMap<String, CostEstimate>,
    /// How many times each phase ran to a result, across vendors
    pub phases_completed: BTreeMap<Phase, u32>,
    pub errors: usize,
    pub results: BTreeMap<String, VendorResults>,
}
