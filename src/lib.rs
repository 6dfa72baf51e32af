//! Story-Harvest: a resumable ingestion pipeline for vendor customer stories
//!
//! This crate discovers customer-story pages on vendor websites, scrapes them
//! into JSON records, loads them into a graph store and classifies them with
//! an LLM. Every phase re-derives its done-state from the file store and the
//! graph store, so a run can be interrupted and repeated safely.

pub mod classify;
pub mod config;
pub mod crawler;
pub mod output;
pub mod pagination;
pub mod pipeline;
pub mod storage;

use thiserror::Error;

/// Main error type for Story-Harvest operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Unknown vendor: {0}")]
    UnknownVendor(String),

    #[error("Discovery failed for {vendor}: {message}")]
    Discovery { vendor: String, message: String },

    #[error("HTTP error for {url}: {source}")]
    Http { url: String, source: reqwest::Error },

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Classification error: {0}")]
    Classify(#[from] classify::ClassifyError),

    #[error("Output error: {0}")]
    Output(#[from] output::OutputError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid pattern: {0}")]
    InvalidPattern(String),

    #[error("Missing credential: environment variable {0} is not set")]
    MissingCredential(String),
}

/// Result type alias for Story-Harvest operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::{Config, VendorConfig, VendorRegistry};
pub use pipeline::{Phase, PhaseResult, PipelineRunner};
