//! Statistics from the graph store
//!
//! This module provides functionality for extracting and displaying
//! graph-wide and per-vendor statistics.

use crate::storage::{GraphStats, GraphStore, StorageResult};

/// Reference counts for one vendor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VendorStatistics {
    pub vendor_key: String,
    pub references: u64,
    pub classified: u64,
}

/// Graph statistics summary
#[derive(Debug, Clone, PartialEq)]
pub struct GraphStatistics {
    pub graph: GraphStats,
    pub vendors: Vec<VendorStatistics>,
}

/// Loads statistics from the graph store
///
/// # Arguments
///
/// * `store` - The graph store to query
/// * `vendors` - `(vendor key, vendor name)` pairs to break down
///
/// # Returns
///
/// * `Ok(GraphStatistics)` - Successfully loaded statistics
/// * `Err(StorageError)` - Failed to query statistics
pub fn load_statistics(
    store: &dyn GraphStore,
    vendors: &[(String, String)],
) -> StorageResult<GraphStatistics> {
    let graph = store.get_stats()?;

    let vendors = vendors
        .iter()
        .map(|(key, name)| {
            Ok(VendorStatistics {
                vendor_key: key.clone(),
                references: store.count_references(Some(name))?,
                classified: store.count_classified(Some(name))?,
            })
        })
        .collect::<StorageResult<Vec<_>>>()?;

    Ok(GraphStatistics { graph, vendors })
}

fn percentage(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        (part as f64 / whole as f64) * 100.0
    }
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &GraphStatistics) {
    println!("=== Graph Statistics ===\n");

    println!("Overview:");
    println!("  Vendors: {}", stats.graph.total_vendors);
    println!("  Customers: {}", stats.graph.total_customers);
    println!("  References: {}", stats.graph.total_references);
    println!(
        "  Classified: {} ({:.1}%)",
        stats.graph.classified_references,
        percentage(
            stats.graph.classified_references,
            stats.graph.total_references
        )
    );
    println!();

    if !stats.vendors.is_empty() {
        println!("By Vendor:");
        let mut vendors: Vec<_> = stats.vendors.iter().collect();
        vendors.sort_by(|a, b| b.references.cmp(&a.references));

        for vendor in vendors {
            println!(
                "  {}: {} references, {} classified ({:.1}%)",
                vendor.vendor_key,
                vendor.references,
                vendor.classified,
                percentage(vendor.classified, vendor.references)
            );
        }
        println!();
    }
}
