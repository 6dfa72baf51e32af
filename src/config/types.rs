use crate::pagination::{PaginationConfig, UrlStrategy};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Main configuration structure for Story-Harvest
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub scraper: ScraperConfig,
    #[serde(default)]
    pub graph: GraphConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub costs: CostConfig,

    /// Vendor registry, keyed by lowercase vendor key
    #[serde(default)]
    pub vendors: BTreeMap<String, VendorConfig>,
}

/// Locations and thresholds shared by every phase
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Root of the file store (`<data-dir>/scraped/<vendor>/...`)
    #[serde(rename = "data-dir", default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Directory for run reports and error logs
    #[serde(rename = "logs-dir", default = "default_logs_dir")]
    pub logs_dir: PathBuf,

    /// Scrape results with fewer words are failures
    #[serde(rename = "min-word-count", default = "default_min_word_count")]
    pub min_word_count: usize,

    /// Maximum references classified per vendor per run
    #[serde(rename = "classification-limit", default = "default_classification_limit")]
    pub classification_limit: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            logs_dir: default_logs_dir(),
            min_word_count: default_min_word_count(),
            classification_limit: default_classification_limit(),
        }
    }
}

/// Fetching behaviour for listing and detail pages
#[derive(Debug, Clone, Deserialize)]
pub struct ScraperConfig {
    /// Pause between successive detail-page scrapes (milliseconds)
    #[serde(rename = "delay-ms", default = "default_delay_ms")]
    pub delay_ms: u64,

    #[serde(rename = "timeout-secs", default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(rename = "user-agent", default = "default_user_agent")]
    pub user_agent: String,

    /// Responses shorter than this are treated as blocked or broken
    #[serde(rename = "min-content-length", default = "default_min_content_length")]
    pub min_content_length: usize,

    /// Try a plain HTTP GET before the render service
    #[serde(rename = "direct-http", default = "default_true")]
    pub direct_http: bool,

    /// Headless-render service base URL (`POST {endpoint}/content`)
    #[serde(rename = "render-endpoint", default)]
    pub render_endpoint: Option<String>,

    /// Environment variable holding the render service token
    #[serde(rename = "render-token-env", default)]
    pub render_token_env: Option<String>,

    #[serde(rename = "render-timeout-secs", default = "default_render_timeout_secs")]
    pub render_timeout_secs: u64,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            delay_ms: default_delay_ms(),
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
            min_content_length: default_min_content_length(),
            direct_http: true,
            render_endpoint: None,
            render_token_env: None,
            render_timeout_secs: default_render_timeout_secs(),
        }
    }
}

/// Graph store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct GraphConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path", default = "default_database_path")]
    pub database_path: PathBuf,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

/// LLM classifier configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ClassifierConfig {
    #[serde(default = "default_model")]
    pub model: String,

    /// Environment variable holding the API key
    #[serde(rename = "api-key-env", default = "default_api_key_env")]
    pub api_key_env: String,

    #[serde(rename = "base-url", default = "default_classifier_base_url")]
    pub base_url: String,

    #[serde(rename = "max-attempts", default = "default_max_attempts")]
    pub max_attempts: u32,

    /// First backoff delay; doubles on every retry
    #[serde(rename = "base-delay-ms", default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(rename = "timeout-secs", default = "default_classifier_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default)]
    pub industries: Vec<String>,

    #[serde(rename = "company-sizes", default = "default_company_sizes")]
    pub company_sizes: Vec<String>,

    #[serde(rename = "use-cases", default)]
    pub use_cases: Vec<String>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            api_key_env: default_api_key_env(),
            base_url: default_classifier_base_url(),
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            timeout_secs: default_classifier_timeout_secs(),
            industries: Vec::new(),
            company_sizes: default_company_sizes(),
            use_cases: Vec::new(),
        }
    }
}

/// Unit costs used for the run estimate (USD)
#[derive(Debug, Clone, Deserialize)]
pub struct CostConfig {
    #[serde(rename = "per-scrape", default = "default_per_scrape")]
    pub per_scrape: f64,

    #[serde(rename = "per-classification", default = "default_per_classification")]
    pub per_classification: f64,
}

impl Default for CostConfig {
    fn default() -> Self {
        Self {
            per_scrape: default_per_scrape(),
            per_classification: default_per_classification(),
        }
    }
}

/// How a vendor's candidate URLs are discovered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DiscoveryMethod {
    Sitemap,
    Pagination,
}

impl DiscoveryMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscoveryMethod::Sitemap => "sitemap",
            DiscoveryMethod::Pagination => "pagination",
        }
    }
}

/// One vendor entry
#[derive(Debug, Clone, Deserialize)]
pub struct VendorConfig {
    /// Display name; also the vendor's namespace in the graph store
    pub name: String,

    /// Vendor website, used as the pagination base URL
    pub website: String,

    #[serde(rename = "discovery-method")]
    pub discovery_method: DiscoveryMethod,

    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(rename = "error-handling", default)]
    pub error_handling: ErrorHandling,

    #[serde(default)]
    pub links: LinkPatterns,

    #[serde(default)]
    pub sitemap: Option<SitemapConfig>,

    #[serde(default)]
    pub pagination: Option<PaginationSettings>,
}

/// Per-vendor error policy
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorHandling {
    /// Abandon the vendor's remaining phases after a phase error
    #[serde(rename = "skip-on-error", default)]
    pub skip_on_error: bool,
}

/// Substring filters applied to links found on listing pages
#[derive(Debug, Clone, Deserialize)]
pub struct LinkPatterns {
    #[serde(default = "default_include_links")]
    pub include: Vec<String>,

    #[serde(default)]
    pub exclude: Vec<String>,
}

impl Default for LinkPatterns {
    fn default() -> Self {
        Self {
            include: default_include_links(),
            exclude: Vec::new(),
        }
    }
}

/// Sitemap discovery settings
#[derive(Debug, Clone, Deserialize)]
pub struct SitemapConfig {
    /// Sitemap or sitemap index URL
    pub url: String,

    /// Regex patterns; a URL must match at least one (all URLs when empty)
    #[serde(default)]
    pub include: Vec<String>,

    /// Regex patterns; a URL matching any is dropped
    #[serde(default = "default_sitemap_exclude")]
    pub exclude: Vec<String>,

    /// Maximum child sitemaps followed from an index
    #[serde(rename = "max-sitemaps", default = "default_max_sitemaps")]
    pub max_sitemaps: usize,
}

/// Pagination discovery settings
#[derive(Debug, Clone, Deserialize)]
pub struct PaginationSettings {
    pub url: UrlStrategy,

    #[serde(default)]
    pub limits: PaginationConfig,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_logs_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_min_word_count() -> usize {
    100
}

fn default_classification_limit() -> usize {
    1000
}

fn default_delay_ms() -> u64 {
    2000
}

fn default_timeout_secs() -> u64 {
    20
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string()
}

fn default_min_content_length() -> usize {
    500
}

fn default_render_timeout_secs() -> u64 {
    60
}

fn default_true() -> bool {
    true
}

fn default_database_path() -> PathBuf {
    PathBuf::from("data/graph.db")
}

fn default_model() -> String {
    "gemini-2.5-flash".to_string()
}

fn default_api_key_env() -> String {
    "GOOGLE_API_KEY".to_string()
}

fn default_classifier_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_classifier_timeout_secs() -> u64 {
    120
}

fn default_company_sizes() -> Vec<String> {
    ["Enterprise", "Mid-Market", "SMB", "Startup", "Unknown"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_per_scrape() -> f64 {
    0.03
}

fn default_per_classification() -> f64 {
    0.005
}

fn default_include_links() -> Vec<String> {
    ["/customers/", "/case-study/", "/customer-story/"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_sitemap_exclude() -> Vec<String> {
    [r"/customers/?$", r"\?", "#", "/tag/", "/category/"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_max_sitemaps() -> usize {
    10
}
