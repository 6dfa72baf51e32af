//! Markdown summary generation
//!
//! This module renders a run summary as a human-readable markdown report,
//! written next to the JSON report.

use crate::output::traits::RunSummary;
use crate::pipeline::{Phase, PhaseResult};

/// Formats a run summary as markdown
///
/// # Arguments
///
/// * `summary` - The run summary data
///
/// # Returns
///
/// A formatted markdown string
pub fn format_markdown_summary(summary: &RunSummary) -> String {
    let mut md = String::new();

    md.push_str("# Story-Harvest Pipeline Report\n\n");

    // Run metadata
    md.push_str("## Run Information\n\n");
    md.push_str(&format!("- **Started**: {}\n", summary.start_time));
    md.push_str(&format!("- **Finished**: {}\n", summary.end_time));
    md.push_str(&format!(
        "- **Duration**: {:.1} seconds ({:.2} minutes)\n",
        summary.elapsed_seconds,
        summary.elapsed_seconds / 60.0
    ));
    if summary.dry_run {
        md.push_str("- **Mode**: dry run\n");
    }
    if summary.interrupted {
        md.push_str("- **Status**: interrupted\n");
    }
    md.push_str(&format!("- **Config Hash**: {}\n", summary.config_hash));
    md.push_str(&format!("- **Errors**: {}\n\n", summary.errors));

    // Totals
    md.push_str("## Totals\n\n");
    md.push_str(&format!(
        "- **URLs Discovered**: {}\n",
        summary.totals.urls_discovered
    ));
    md.push_str(&format!("- **URLs Scraped**: {}\n", summary.totals.urls_scraped));
    md.push_str(&format!(
        "- **References Loaded**: {}\n",
        summary.totals.references_loaded
    ));
    md.push_str(&format!(
        "- **References Classified**: {}\n",
        summary.totals.references_classified
    ));
    md.push_str(&format!("- **Failures**: {}\n\n", summary.totals.failures));

    // Per-vendor phase table
    if !summary.results.is_empty() {
        md.push_str("## Vendors\n\n");
        md.push_str("| Vendor | Discovered (new) | Scraped | Loaded | Classified | Failed | Est. Cost |\n");
        md.push_str("|--------|------------------|---------|--------|------------|--------|-----------|\n");

        for (vendor_key, results) in &summary.results {
            let count = |phase: Phase, pick: fn(&PhaseResult) -> usize| {
                results.get(&phase).map(pick).unwrap_or(0)
            };
            let failed: usize = results.values().map(|r| r.failed).sum();
            let cost = summary
                .vendor_costs
                .get(vendor_key)
                .map(|c| c.total)
                .unwrap_or(0.0);

            md.push_str(&format!(
                "| {} | {} | {} | {} | {} | {} | ${:.2} |\n",
                vendor_key,
                count(Phase::Discovery, |r| r.new),
                count(Phase::Scraping, |r| r.scraped),
                count(Phase::Loading, |r| r.loaded),
                count(Phase::Classification, |r| r.classified),
                failed,
                cost
            ));
        }
        md.push('\n');

        let phase_errors: Vec<(String, Phase, String)> = summary
            .results
            .iter()
            .flat_map(|(vendor_key, results)| {
                results.values().filter_map(move |r| {
                    r.error
                        .as_ref()
                        .map(|e| (vendor_key.clone(), r.phase, e.clone()))
                })
            })
            .collect();

        if !phase_errors.is_empty() {
            md.push_str("## Phase Errors\n\n");
            for (vendor_key, phase, error) in phase_errors {
                md.push_str(&format!("- **{}** {}: {}\n", vendor_key, phase, error));
            }
            md.push('\n');
        }
    }

    if !summary.phases_completed.is_empty() {
        md.push_str("## Phases Completed\n\n");
        for (phase, count) in &summary.phases_completed {
            md.push_str(&format!("- {}: {}\n", phase, count));
        }
        md.push('\n');
    }

    // Costs
    md.push_str("## Estimated Costs\n\n");
    md.push_str(&format!("- **Scraping**: ${:.2}\n", summary.costs.scraping));
    md.push_str(&format!(
        "- **Classification**: ${:.2}\n",
        summary.costs.classification
    ));
    md.push_str(&format!("- **Total**: ${:.2}\n", summary.costs.total));

    md
}
