//! Web scraper built on the fetch chain

use crate::config::{PaginationSettings, ScraperConfig, VendorConfig};
use crate::crawler::fetcher::{FetchChain, FetchedPage};
use crate::crawler::parser::{
    extract_customer_name, extract_reference_links, extract_text, word_count, LinkFilter,
};
use crate::crawler::{ReferenceScraper, ScraperFactory};
use crate::pagination::paginate;
use crate::storage::ScrapeRecord;
use crate::HarvestError;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

/// Scraper for one vendor
///
/// Keeps the default no-op `release_sessions`: each render-service call is
/// a stateless `POST /content`, so no session outlives a fetch.
pub struct WebScraper {
    vendor_name: String,
    website: String,
    filter: LinkFilter,
    pagination: Option<PaginationSettings>,
    chain: Arc<FetchChain>,
    delay: Duration,
}

impl WebScraper {
    pub fn new(vendor: &VendorConfig, chain: Arc<FetchChain>, delay: Duration) -> Self {
        Self {
            vendor_name: vendor.name.clone(),
            website: vendor.website.clone(),
            filter: LinkFilter::new(&vendor.links),
            pagination: vendor.pagination.clone(),
            chain,
            delay,
        }
    }

    fn build_record(&self, url: &str, page: FetchedPage) -> ScrapeRecord {
        let text = extract_text(&page.body);
        ScrapeRecord {
            url: url.to_string(),
            customer_name: extract_customer_name(&text, url),
            word_count: word_count(&text),
            raw_text: text,
            scraped_date: Utc::now().to_rfc3339(),
            method: page.method.to_string(),
            vendor_website: Some(self.website.clone()),
        }
    }
}

#[async_trait]
impl ReferenceScraper for WebScraper {
    fn delay(&self) -> Duration {
        self.delay
    }

    async fn get_customer_reference_urls(&self) -> Result<Vec<String>, HarvestError> {
        let settings = self.pagination.as_ref().ok_or_else(|| HarvestError::Discovery {
            vendor: self.vendor_name.clone(),
            message: "no pagination section configured".to_string(),
        })?;

        let filter = &self.filter;
        let outcome = paginate(
            &settings.url,
            self.chain.as_ref(),
            |html, base| extract_reference_links(html, base, filter),
            &self.website,
            &settings.limits,
        )
        .await;

        tracing::info!(
            vendor = %self.vendor_name,
            pages = outcome.pages_visited,
            urls = outcome.urls.len(),
            "Pagination finished: {}",
            outcome.stop_reason
        );

        Ok(outcome.urls)
    }

    async fn scrape_reference(&self, url: &str) -> Result<Option<ScrapeRecord>, HarvestError> {
        match self.chain.fetch(url).await {
            Some(page) => Ok(Some(self.build_record(url, page))),
            None => Ok(None),
        }
    }
}

/// Builds [`WebScraper`]s that share one fetch chain
pub struct WebScraperFactory {
    chain: Arc<FetchChain>,
    delay: Duration,
}

impl WebScraperFactory {
    /// Creates the factory from scraper settings
    ///
    /// The render-service token, when configured, is read from the
    /// environment variable named by `render-token-env`.
    pub fn new(config: &ScraperConfig) -> Result<Self, HarvestError> {
        let token = config
            .render_token_env
            .as_ref()
            .and_then(|var| std::env::var(var).ok())
            .filter(|token| !token.trim().is_empty());

        let chain = FetchChain::from_config(config, token)?;
        tracing::debug!("Fetch chain: {:?}", chain.strategy_names());

        Ok(Self {
            chain: Arc::new(chain),
            delay: Duration::from_millis(config.delay_ms),
        })
    }
}

impl ScraperFactory for WebScraperFactory {
    fn scraper_for(
        &self,
        _vendor_key: &str,
        vendor: &VendorConfig,
    ) -> Result<Box<dyn ReferenceScraper>, HarvestError> {
        Ok(Box::new(WebScraper::new(
            vendor,
            Arc::clone(&self.chain),
            self.delay,
        )))
    }
}
