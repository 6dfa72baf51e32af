//! Run reporter
//!
//! Collects log lines, errors and phase results for one invocation, then
//! persists the run summary, the markdown summary and the error log.

use crate::config::CostConfig;
use crate::output::markdown::format_markdown_summary;
use crate::output::traits::{
    CostEstimate, OutputResult, RunSummary, RunTotals, VendorResults,
};
use crate::pipeline::{Phase, PhaseResult};
use chrono::{DateTime, Local};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

/// Unit prices for the cost estimate
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostModel {
    pub per_scrape: f64,
    pub per_classification: f64,
}

impl CostModel {
    pub fn new(config: &CostConfig) -> Self {
        Self {
            per_scrape: config.per_scrape,
            per_classification: config.per_classification,
        }
    }

    pub fn estimate(&self, urls_scraped: usize, references_classified: usize) -> CostEstimate {
        let scraping = urls_scraped as f64 * self.per_scrape;
        let classification = references_classified as f64 * self.per_classification;
        CostEstimate {
            scraping,
            classification,
            total: scraping + classification,
        }
    }

    pub fn estimate_totals(&self, totals: &RunTotals) -> CostEstimate {
        self.estimate(totals.urls_scraped, totals.references_classified)
    }
}

/// Collects everything one invocation reports
pub struct RunReporter {
    logs_dir: PathBuf,
    started: DateTime<Local>,
    logs: Vec<String>,
    errors: Vec<String>,
    phases_completed: BTreeMap<Phase, u32>,
}

impl RunReporter {
    pub fn new(logs_dir: impl Into<PathBuf>) -> Self {
        Self {
            logs_dir: logs_dir.into(),
            started: Local::now(),
            logs: Vec::new(),
            errors: Vec::new(),
            phases_completed: BTreeMap::new(),
        }
    }

    fn timestamp() -> String {
        Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
    }

    pub fn log(&mut self, message: impl AsRef<str>) {
        let message = message.as_ref();
        tracing::info!("{}", message);
        self.logs.push(format!("[{}] {}", Self::timestamp(), message));
    }

    /// Logs a warning; warnings do not count as run errors
    pub fn warn(&mut self, message: impl AsRef<str>) {
        let message = message.as_ref();
        tracing::warn!("{}", message);
        self.logs
            .push(format!("[{}] WARNING: {}", Self::timestamp(), message));
    }

    pub fn log_error(&mut self, message: impl AsRef<str>) {
        let message = message.as_ref();
        tracing::error!("{}", message);
        let entry = format!("[{}] ERROR: {}", Self::timestamp(), message);
        self.logs.push(entry.clone());
        self.errors.push(entry);
    }

    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    pub fn logs(&self) -> &[String] {
        &self.logs
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    /// Records a finished phase and logs its counts
    pub fn record_phase(&mut self, vendor_key: &str, result: &PhaseResult) {
        *self.phases_completed.entry(result.phase).or_insert(0) += 1;
        self.log(format!("{} {}: {}", vendor_key, result.phase, result.describe()));
    }

    /// Builds the summary for all vendor results of this invocation
    ///
    /// # Arguments
    ///
    /// * `results` - Phase results keyed by vendor key
    /// * `costs` - Unit prices for the estimate
    /// * `config_hash` - Hash of the configuration file used for the run
    /// * `dry_run` - Whether the run was a dry run
    /// * `interrupted` - Whether the run was cut short
    pub fn generate_summary(
        &self,
        results: &BTreeMap<String, VendorResults>,
        costs: &CostModel,
        config_hash: &str,
        dry_run: bool,
        interrupted: bool,
    ) -> RunSummary {
        let ended = Local::now();
        let elapsed = (ended - self.started).num_milliseconds().max(0) as f64 / 1000.0;

        let mut totals = RunTotals::default();
        let mut vendor_costs = BTreeMap::new();
        for (vendor_key, vendor_results) in results {
            totals.add(vendor_results);
            let vendor_totals = RunTotals::from_results(vendor_results);
            vendor_costs.insert(vendor_key.clone(), costs.estimate_totals(&vendor_totals));
        }

        RunSummary {
            start_time: self.started.to_rfc3339(),
            end_time: ended.to_rfc3339(),
            elapsed_seconds: elapsed,
            dry_run,
            interrupted,
            config_hash: config_hash.to_string(),
            vendors_processed: results.len(),
            totals,
            costs: costs.estimate_totals(&totals),
            vendor_costs,
            phases_completed: self.phases_completed.clone(),
            errors: self.errors.len(),
            results: results.clone(),
        }
    }

    fn file_timestamp() -> String {
        Local::now().format("%Y%m%d-%H%M%S").to_string()
    }

    /// Writes the JSON report and its markdown companion
    ///
    /// # Returns
    ///
    /// * `Ok(PathBuf)` - Path of the JSON report
    /// * `Err(OutputError)` - Failed to write either file
    pub fn save_report(&mut self, summary: &RunSummary) -> OutputResult<PathBuf> {
        fs::create_dir_all(&self.logs_dir)?;
        let stem = format!("pipeline_report_{}", Self::file_timestamp());

        let json_path = self.logs_dir.join(format!("{}.json", stem));
        fs::write(&json_path, serde_json::to_string_pretty(summary)?)?;

        let md_path = self.logs_dir.join(format!("{}.md", stem));
        fs::write(&md_path, format_markdown_summary(summary))?;

        self.log(format!("Report saved to: {}", json_path.display()));
        Ok(json_path)
    }

    /// Writes the error log, if there were any errors
    pub fn save_error_log(&mut self) -> OutputResult<Option<PathBuf>> {
        if self.errors.is_empty() {
            return Ok(None);
        }

        fs::create_dir_all(&self.logs_dir)?;
        let path = self
            .logs_dir
            .join(format!("pipeline_errors_{}.log", Self::file_timestamp()));
        fs::write(&path, self.errors.join("\n"))?;

        self.log(format!("Error log saved to: {}", path.display()));
        Ok(Some(path))
    }
}

/// Prints the end-of-run table to stdout
pub fn print_summary_table(summary: &RunSummary) {
    let rule = "=".repeat(70);
    println!("\n{}", rule);
    if summary.dry_run {
        println!("PIPELINE SUMMARY (DRY RUN)");
    } else {
        println!("PIPELINE SUMMARY");
    }
    println!("{}", rule);

    println!("\nVendors Processed: {}", summary.vendors_processed);
    println!(
        "Elapsed Time: {:.1} seconds ({:.1} minutes)",
        summary.elapsed_seconds,
        summary.elapsed_seconds / 60.0
    );

    for (vendor_key, results) in &summary.results {
        println!("\n{}:", vendor_key);
        for result in results.values() {
            println!("  {}: {}", result.phase, result.describe());
        }
    }

    println!("\nTotals:");
    println!("  URLs Discovered: {}", summary.totals.urls_discovered);
    println!("  URLs Scraped: {}", summary.totals.urls_scraped);
    println!("  References Loaded: {}", summary.totals.references_loaded);
    println!(
        "  References Classified: {}",
        summary.totals.references_classified
    );

    println!("\nEstimated Costs:");
    println!("  Scraping: ${:.2}", summary.costs.scraping);
    println!("  Classification: ${:.2}", summary.costs.classification);
    println!("  Total: ${:.2}", summary.costs.total);

    if summary.errors > 0 {
        println!("\nErrors: {} (check error log)", summary.errors);
    }
    if summary.interrupted {
        println!("\nRun was interrupted; completed work is kept.");
    }

    println!("{}\n", rule);
}
