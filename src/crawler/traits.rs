//! Collaborator traits for discovery and scraping

use crate::config::VendorConfig;
use crate::storage::ScrapeRecord;
use crate::HarvestError;
use async_trait::async_trait;
use std::time::Duration;

/// Discovers candidate reference URLs without pagination (e.g. sitemaps)
#[async_trait]
pub trait UrlDiscoverer: Send + Sync {
    async fn discover(&self, vendor: &VendorConfig) -> Result<Vec<String>, HarvestError>;
}

/// Scrapes one vendor's customer stories
#[async_trait]
pub trait ReferenceScraper: Send + Sync {
    /// Pause the pipeline keeps between successive scrape calls
    fn delay(&self) -> Duration;

    /// Enumerates reference URLs from the vendor's listing pages
    async fn get_customer_reference_urls(&self) -> Result<Vec<String>, HarvestError>;

    /// Scrapes one reference page
    ///
    /// `Ok(None)` means no fetch strategy produced usable content.
    async fn scrape_reference(&self, url: &str) -> Result<Option<ScrapeRecord>, HarvestError>;

    /// Releases render-service sessions left over from an earlier run
    async fn release_sessions(&self) -> Result<(), HarvestError> {
        Ok(())
    }
}

/// Builds the scraper for a vendor
pub trait ScraperFactory: Send + Sync {
    fn scraper_for(
        &self,
        vendor_key: &str,
        vendor: &VendorConfig,
    ) -> Result<Box<dyn ReferenceScraper>, HarvestError>;
}
