//! Storage traits and error types
//!
//! This module defines the trait interface for graph store backends and
//! associated error types.

use crate::classify::Classification;
use crate::storage::{DuplicateGroup, GraphStats, PendingReference, ScrapeRecord};
use std::collections::HashSet;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Reference not found: {0}")]
    ReferenceNotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for graph store backends
///
/// Reference nodes are keyed by URL. Vendors are addressed by their display
/// name, which is the vendor's namespace in the graph.
pub trait GraphStore: Send {
    /// Returns true when the backend answers a trivial query
    fn verify_connection(&self) -> bool;

    /// Creates indexes used by the pipeline's lookups
    fn ensure_indexes(&mut self) -> StorageResult<()>;

    // ===== Idempotency lookups =====

    /// All reference URLs published by `vendor`
    fn existing_urls(&self, vendor: &str) -> StorageResult<HashSet<String>>;

    /// Unclassified references of `vendor`, oldest first
    fn unclassified_references(
        &self,
        vendor: &str,
        limit: usize,
    ) -> StorageResult<Vec<PendingReference>>;

    // ===== Writes =====

    /// Merges a scraped record into the graph
    ///
    /// # Returns
    ///
    /// * `Ok(Some(id))` - A new reference node was created
    /// * `Ok(None)` - A reference with the same URL already exists
    fn load_raw_reference(
        &mut self,
        vendor: &str,
        record: &ScrapeRecord,
    ) -> StorageResult<Option<String>>;

    /// Applies a classification to a reference and marks it classified
    ///
    /// Any edges from an earlier classification of the same reference are
    /// replaced.
    fn update_classification(
        &mut self,
        reference_id: &str,
        classification: &Classification,
    ) -> StorageResult<()>;

    /// Clears the classified flag of matching references
    ///
    /// # Arguments
    ///
    /// * `vendor` - Restrict to one vendor's references
    /// * `url_pattern` - Restrict to URLs containing this substring
    ///
    /// # Returns
    ///
    /// IDs of the references that were reset
    fn mark_unclassified(
        &mut self,
        vendor: Option<&str>,
        url_pattern: Option<&str>,
    ) -> StorageResult<Vec<String>>;

    /// Removes the classification edges of a reference and any customer
    /// left without references
    fn clear_classification(&mut self, reference_id: &str) -> StorageResult<()>;

    /// Deletes a reference node together with its edges
    fn delete_reference(&mut self, reference_id: &str) -> StorageResult<()>;

    // ===== Statistics =====

    fn count_references(&self, vendor: Option<&str>) -> StorageResult<u64>;

    fn count_classified(&self, vendor: Option<&str>) -> StorageResult<u64>;

    fn get_stats(&self) -> StorageResult<GraphStats>;

    /// URLs held by more than one reference node
    fn duplicate_groups(&self) -> StorageResult<Vec<DuplicateGroup>>;

    /// Releases the backend's connection
    fn close(self: Box<Self>) -> StorageResult<()>;
}
