//! Crawler module for discovering and scraping customer stories
//!
//! This module contains the web-facing collaborators of the pipeline:
//! - HTTP fetching through an ordered chain of fetch strategies
//! - HTML parsing for reference links, story text and customer names
//! - Sitemap discovery
//! - The per-vendor scraper and its factory

mod fetcher;
mod parser;
mod scraper;
mod sitemap;
mod traits;

pub use fetcher::{
    build_http_client, looks_blocked, FetchChain, FetchError, FetchStrategy, FetchedPage,
    HttpFetcher, RenderServiceFetcher, BLOCK_INDICATORS,
};
pub use parser::{
    extract_customer_name, extract_reference_links, extract_text, word_count, LinkFilter,
};
pub use scraper::{WebScraper, WebScraperFactory};
pub use sitemap::{parse_sitemap, SitemapDiscoverer, SitemapDocument, SitemapFilter};
pub use traits::{ReferenceScraper, ScraperFactory, UrlDiscoverer};
