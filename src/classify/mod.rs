//! Reference classification
//!
//! This module turns the raw text of a customer story into structured facts:
//! - The `Classifier` trait the pipeline calls per reference
//! - The `Classification` fact set and a lenient parser for LLM output
//! - A Gemini REST client
//! - A reusable retry-with-backoff combinator

mod gemini;
mod retry;
mod types;

pub use gemini::GeminiClassifier;
pub use retry::RetryPolicy;
pub use types::{parse_classification, Classification, Outcome, Persona};

use async_trait::async_trait;
use thiserror::Error;

/// Errors that can occur while classifying a reference
#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error("Rate limited or out of quota: {0}")]
    RateLimited(String),

    #[error("Could not parse classifier output: {0}")]
    Parse(String),

    #[error("Classifier API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
}

impl ClassifyError {
    /// Whether the error counts as a quota/rate-limit signal
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, ClassifyError::RateLimited(_))
    }
}

/// Extracts structured facts from a reference's text
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Classifies one reference
    ///
    /// # Returns
    ///
    /// * `Ok(Some(_))` - Classification succeeded
    /// * `Ok(None)` - The classifier gave up without a usable answer
    /// * `Err(_)` - Rate limits persisted through every retry
    async fn classify(
        &self,
        text: &str,
        url: &str,
    ) -> Result<Option<Classification>, ClassifyError>;
}
