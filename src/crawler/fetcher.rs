//! HTTP fetching
//!
//! This module handles all page fetches for discovery and scraping:
//! - Building the HTTP client from scraper settings
//! - A direct HTTP strategy and a headless-render service strategy
//! - A fetch chain that tries strategies in order and stops at the first
//!   response that is long enough and not an anti-bot page

use crate::config::ScraperConfig;
use crate::pagination::PageFetcher;
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Lowercase markers of challenge or block pages
pub const BLOCK_INDICATORS: &[&str] = &[
    "cloudflare",
    "checking your browser",
    "please wait",
    "access denied",
    "blocked",
    "captcha",
    "challenge",
    "ddos protection",
];

/// Errors from a single fetch strategy
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP error for {url}: {source}")]
    Http { url: String, source: reqwest::Error },

    #[error("HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("Render service error (status {status}): {message}")]
    Render { status: u16, message: String },

    #[error("Invalid render endpoint: {0}")]
    Endpoint(#[from] url::ParseError),
}

/// Content returned by the fetch chain
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub body: String,
    /// Name of the strategy that produced the body
    pub method: &'static str,
}

/// One way of fetching a page
#[async_trait]
pub trait FetchStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    async fn fetch(&self, url: &str) -> Result<String, FetchError>;
}

/// Builds an HTTP client with browser-like headers
///
/// # Arguments
///
/// * `config` - The scraper configuration
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
pub fn build_http_client(config: &ScraperConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.user_agent.clone())
        .timeout(Duration::from_secs(config.timeout_secs))
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Returns true if the body looks like a challenge or block page
pub fn looks_blocked(body: &str) -> bool {
    let lowered = body.to_lowercase();
    BLOCK_INDICATORS.iter().any(|marker| lowered.contains(marker))
}

/// Plain GET
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl FetchStrategy for HttpFetcher {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let response = self
            .client
            .get(url)
            .header("Accept", "text/html,application/xhtml+xml")
            .header("Accept-Language", "en-US,en;q=0.9")
            .send()
            .await
            .map_err(|source| FetchError::Http {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        response.text().await.map_err(|source| FetchError::Http {
            url: url.to_string(),
            source,
        })
    }
}

/// Headless-render service (`POST {base}/content` with `{"url": ...}`)
pub struct RenderServiceFetcher {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl RenderServiceFetcher {
    pub fn new(client: Client, base_url: &str, token: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        }
    }
}

#[async_trait]
impl FetchStrategy for RenderServiceFetcher {
    fn name(&self) -> &'static str {
        "render"
    }

    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let mut endpoint = Url::parse(&format!("{}/content", self.base_url))?;
        if let Some(token) = &self.token {
            endpoint.query_pairs_mut().append_pair("token", token);
        }

        let response = self
            .client
            .post(endpoint)
            .json(&serde_json::json!({ "url": url }))
            .send()
            .await
            .map_err(|source| FetchError::Http {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(FetchError::Render {
                status: status.as_u16(),
                message,
            });
        }

        response.text().await.map_err(|source| FetchError::Http {
            url: url.to_string(),
            source,
        })
    }
}

/// Ordered list of fetch strategies with early exit
///
/// Every strategy but the last must return at least `min_content_length`
/// characters with no block indicator to be accepted. The last strategy is
/// the fallback of record: any non-empty body it returns is accepted.
pub struct FetchChain {
    strategies: Vec<Box<dyn FetchStrategy>>,
    min_content_length: usize,
}

impl FetchChain {
    pub fn new(strategies: Vec<Box<dyn FetchStrategy>>, min_content_length: usize) -> Self {
        Self {
            strategies,
            min_content_length,
        }
    }

    /// Builds the chain described by the scraper settings
    ///
    /// # Arguments
    ///
    /// * `config` - Scraper settings
    /// * `render_token` - Token for the render service, if one is configured
    pub fn from_config(
        config: &ScraperConfig,
        render_token: Option<String>,
    ) -> Result<Self, reqwest::Error> {
        let mut strategies: Vec<Box<dyn FetchStrategy>> = Vec::new();

        if config.direct_http {
            strategies.push(Box::new(HttpFetcher::new(build_http_client(config)?)));
        }

        if let Some(endpoint) = &config.render_endpoint {
            let client = Client::builder()
                .timeout(Duration::from_secs(config.render_timeout_secs))
                .build()?;
            strategies.push(Box::new(RenderServiceFetcher::new(
                client,
                endpoint,
                render_token,
            )));
        }

        Ok(Self::new(strategies, config.min_content_length))
    }

    /// Names of the configured strategies, in order
    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    fn qualifies(&self, body: &str) -> bool {
        body.len() >= self.min_content_length && !looks_blocked(body)
    }

    /// Fetches `url` through the chain
    ///
    /// Returns `None` when no strategy produced acceptable content.
    pub async fn fetch(&self, url: &str) -> Option<FetchedPage> {
        let last = self.strategies.len().saturating_sub(1);

        for (index, strategy) in self.strategies.iter().enumerate() {
            match strategy.fetch(url).await {
                Ok(body) => {
                    let accepted = if index == last {
                        !body.trim().is_empty()
                    } else {
                        self.qualifies(&body)
                    };
                    if accepted {
                        tracing::debug!("Fetched {} via {}", url, strategy.name());
                        return Some(FetchedPage {
                            body,
                            method: strategy.name(),
                        });
                    }
                    tracing::debug!(
                        "Rejected {} response for {} ({} chars)",
                        strategy.name(),
                        url,
                        body.len()
                    );
                }
                Err(e) => {
                    tracing::debug!("{} fetch failed: {}", strategy.name(), e);
                }
            }
        }

        None
    }
}

#[async_trait]
impl PageFetcher for FetchChain {
    async fn fetch_page(&self, url: &str) -> Option<String> {
        self.fetch(url).await.map(|page| page.body)
    }
}
