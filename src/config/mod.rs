//! Configuration module for Story-Harvest
//!
//! This module handles loading, parsing, and validating the TOML
//! configuration file, including the vendor registry.
//!
//! # Example
//!
//! ```no_run
//! use story_harvest::config::{load_config, VendorRegistry};
//! use std::path::Path;
//!
//! let config = load_config(Path::new("harvest.toml")).unwrap();
//! println!("Enabled vendors: {:?}", config.enabled_keys());
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    ClassifierConfig, Config, CostConfig, DiscoveryMethod, ErrorHandling, GraphConfig,
    LinkPatterns, PaginationSettings, PipelineConfig, ScraperConfig, SitemapConfig, VendorConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};

use crate::HarvestError;

/// Lookup of vendor configurations by key
pub trait VendorRegistry {
    /// Returns the configuration for `key`, or `UnknownVendor`
    fn get(&self, key: &str) -> Result<&VendorConfig, HarvestError>;

    /// Keys of all enabled vendors, in key order
    fn enabled_keys(&self) -> Vec<String>;
}

impl VendorRegistry for Config {
    fn get(&self, key: &str) -> Result<&VendorConfig, HarvestError> {
        self.vendors
            .get(key)
            .ok_or_else(|| HarvestError::UnknownVendor(key.to_string()))
    }

    fn enabled_keys(&self) -> Vec<String> {
        self.vendors
            .iter()
            .filter(|(_, vendor)| vendor.enabled)
            .map(|(key, _)| key.clone())
            .collect()
    }
}
