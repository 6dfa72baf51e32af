//! Pipeline module for the four-phase run
//!
//! This module handles:
//! - Phase selection and per-phase results
//! - Done-state checks against the graph store and the file store
//! - Sequencing phases per vendor and vendors per run
//! - Maintenance operations (reclassification, duplicate cleanup, statistics)

mod idempotency;
mod maintenance;
mod phase;
mod runner;

pub use idempotency::{
    difference, existing_discovered_urls, existing_scraped_urls, filter_new, filter_unscraped,
    unclassified_references,
};
pub use maintenance::DedupeReport;
pub use phase::{select_phases, Phase, PhaseResult};
pub use runner::{Collaborators, PipelineRunner};
