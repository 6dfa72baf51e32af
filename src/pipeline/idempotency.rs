//! Done-state checks
//!
//! Every check is a fresh read of the graph store or the file store. Nothing
//! here caches between phases.

use crate::storage::{FileStore, GraphStore, PendingReference, StorageResult};
use std::collections::HashSet;

/// URLs already present in the graph under `vendor_name`
pub fn existing_discovered_urls(
    graph: &dyn GraphStore,
    vendor_name: &str,
) -> StorageResult<HashSet<String>> {
    graph.existing_urls(vendor_name)
}

/// Candidates not yet in the graph, in their original order
pub fn filter_new(
    graph: &dyn GraphStore,
    vendor_name: &str,
    candidates: &[String],
) -> StorageResult<Vec<String>> {
    let existing = existing_discovered_urls(graph, vendor_name)?;
    Ok(difference(candidates, &existing))
}

/// URLs with a record file under `vendor_key`
pub fn existing_scraped_urls(
    files: &FileStore,
    vendor_key: &str,
) -> StorageResult<HashSet<String>> {
    files.scraped_urls(vendor_key)
}

/// URLs without a record file, in their original order
pub fn filter_unscraped(
    files: &FileStore,
    vendor_key: &str,
    urls: &[String],
) -> StorageResult<Vec<String>> {
    let scraped = existing_scraped_urls(files, vendor_key)?;
    Ok(difference(urls, &scraped))
}

/// References of `vendor_name` still waiting for classification
pub fn unclassified_references(
    graph: &dyn GraphStore,
    vendor_name: &str,
    limit: usize,
) -> StorageResult<Vec<PendingReference>> {
    graph.unclassified_references(vendor_name, limit)
}

/// Order-preserving `urls \ done`; repeated URLs keep their first position
pub fn difference(urls: &[String], done: &HashSet<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    urls.iter()
        .filter(|url| !done.contains(url.as_str()))
        .filter(|url| seen.insert(url.as_str()))
        .cloned()
        .collect()
}
