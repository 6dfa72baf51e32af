//! Listing-page pagination
//!
//! This module turns a sequence of listing-page fetches into a finite,
//! deduplicated set of detail-page URLs:
//! - URL strategies for building successive listing-page URLs
//! - Stop policy (page caps, looped-back pages, consecutive empty pages)
//! - The pagination loop itself, generic over the page fetcher

mod engine;
mod strategy;

pub use engine::{paginate, PageFetcher, PaginationConfig, PaginationOutcome, StopReason};
pub use strategy::UrlStrategy;
