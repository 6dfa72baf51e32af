//! Storage module for persisting pipeline state
//!
//! This module owns both places the pipeline derives its done-state from:
//! - The graph store (vendors, references, customers and classification edges)
//! - The file store (discovery artifacts and one JSON record per scraped page)

mod files;
mod schema;
mod sqlite;
mod traits;

pub use files::{DiscoveryArtifact, FileStore};
pub use sqlite::SqliteGraphStore;
pub use traits::{GraphStore, StorageError, StorageResult};

use serde::{Deserialize, Serialize};

/// One scraped customer story, as persisted in the file store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapeRecord {
    pub url: String,
    pub customer_name: String,
    pub raw_text: String,
    /// RFC 3339 timestamp of the scrape
    pub scraped_date: String,
    pub word_count: usize,
    /// Which fetch strategy produced the content
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vendor_website: Option<String>,
}

/// A reference node waiting for classification
#[derive(Debug, Clone, PartialEq)]
pub struct PendingReference {
    pub id: String,
    pub url: String,
    pub text: String,
}

/// Graph-wide counts
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GraphStats {
    pub total_references: u64,
    pub classified_references: u64,
    pub total_vendors: u64,
    pub total_customers: u64,
}

/// A reference node that shares its URL with other nodes
#[derive(Debug, Clone, PartialEq)]
pub struct DuplicateNode {
    pub id: String,
    pub classified: bool,
}

/// All reference nodes for one URL, in creation order
#[derive(Debug, Clone, PartialEq)]
pub struct DuplicateGroup {
    pub url: String,
    pub nodes: Vec<DuplicateNode>,
}

impl DuplicateGroup {
    /// The node to keep: the first classified node, else the first created
    pub fn keeper(&self) -> Option<&DuplicateNode> {
        self.nodes
            .iter()
            .find(|node| node.classified)
            .or_else(|| self.nodes.first())
    }

    /// Every node except the keeper
    pub fn redundant(&self) -> Vec<&DuplicateNode> {
        let keeper = self.keeper().map(|node| node.id.as_str());
        self.nodes
            .iter()
            .filter(|node| Some(node.id.as_str()) != keeper)
            .collect()
    }
}
