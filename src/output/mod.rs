//! Output module for run reports and statistics
//!
//! This module handles:
//! - Collecting log lines, errors and phase results for a run
//! - Estimating run costs
//! - Writing the JSON report, the markdown summary and the error log
//! - Printing graph statistics

mod markdown;
mod report;
pub mod stats;
mod traits;

pub use markdown::format_markdown_summary;
pub use report::{print_summary_table, CostModel, RunReporter};
pub use stats::{load_statistics, print_statistics, GraphStatistics, VendorStatistics};
pub use traits::{
    CostEstimate, OutputError, OutputResult, RunSummary, RunTotals, VendorResults,
};
