use crate::config::types::{
    ClassifierConfig, Config, CostConfig, DiscoveryMethod, PipelineConfig, ScraperConfig,
    VendorConfig,
};
use crate::ConfigError;
use regex::Regex;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_pipeline_config(&config.pipeline)?;
    validate_scraper_config(&config.scraper)?;
    validate_classifier_config(&config.classifier)?;
    validate_cost_config(&config.costs)?;
    for (key, vendor) in &config.vendors {
        validate_vendor(key, vendor)?;
    }
    Ok(())
}

fn validate_pipeline_config(config: &PipelineConfig) -> Result<(), ConfigError> {
    if config.data_dir.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "data-dir cannot be empty".to_string(),
        ));
    }

    if config.logs_dir.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "logs-dir cannot be empty".to_string(),
        ));
    }

    if config.classification_limit < 1 {
        return Err(ConfigError::Validation(format!(
            "classification-limit must be >= 1, got {}",
            config.classification_limit
        )));
    }

    Ok(())
}

fn validate_scraper_config(config: &ScraperConfig) -> Result<(), ConfigError> {
    if config.timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "scraper timeout-secs must be >= 1".to_string(),
        ));
    }

    if let Some(endpoint) = &config.render_endpoint {
        validate_http_url(endpoint, "render-endpoint")?;
    }

    if !config.direct_http && config.render_endpoint.is_none() {
        return Err(ConfigError::Validation(
            "direct-http is disabled and no render-endpoint is configured".to_string(),
        ));
    }

    Ok(())
}

fn validate_classifier_config(config: &ClassifierConfig) -> Result<(), ConfigError> {
    if config.model.is_empty() {
        return Err(ConfigError::Validation(
            "classifier model cannot be empty".to_string(),
        ));
    }

    if config.max_attempts < 1 || config.max_attempts > 10 {
        return Err(ConfigError::Validation(format!(
            "classifier max-attempts must be between 1 and 10, got {}",
            config.max_attempts
        )));
    }

    validate_http_url(&config.base_url, "classifier base-url")?;

    Ok(())
}

fn validate_cost_config(config: &CostConfig) -> Result<(), ConfigError> {
    if config.per_scrape < 0.0 || config.per_classification < 0.0 {
        return Err(ConfigError::Validation(
            "unit costs cannot be negative".to_string(),
        ));
    }
    Ok(())
}

/// Validates a single vendor entry
fn validate_vendor(key: &str, vendor: &VendorConfig) -> Result<(), ConfigError> {
    validate_vendor_key(key)?;

    if vendor.name.trim().is_empty() {
        return Err(ConfigError::Validation(format!(
            "vendor '{}' must have a name",
            key
        )));
    }

    validate_http_url(&vendor.website, &format!("website of vendor '{}'", key))?;

    if vendor.links.include.iter().any(|p| p.is_empty()) {
        return Err(ConfigError::InvalidPattern(format!(
            "vendor '{}' has an empty link include pattern",
            key
        )));
    }

    match vendor.discovery_method {
        DiscoveryMethod::Sitemap => {
            let sitemap = vendor.sitemap.as_ref().ok_or_else(|| {
                ConfigError::Validation(format!(
                    "vendor '{}' uses sitemap discovery but has no [sitemap] section",
                    key
                ))
            })?;
            validate_http_url(&sitemap.url, &format!("sitemap of vendor '{}'", key))?;
            for pattern in sitemap.include.iter().chain(sitemap.exclude.iter()) {
                validate_regex(pattern)?;
            }
            if sitemap.max_sitemaps < 1 {
                return Err(ConfigError::Validation(format!(
                    "vendor '{}': max-sitemaps must be >= 1",
                    key
                )));
            }
        }
        DiscoveryMethod::Pagination => {
            let pagination = vendor.pagination.as_ref().ok_or_else(|| {
                ConfigError::Validation(format!(
                    "vendor '{}' uses pagination discovery but has no [pagination] section",
                    key
                ))
            })?;
            let limits = &pagination.limits;
            if limits.page_size < 1 {
                return Err(ConfigError::Validation(format!(
                    "vendor '{}': page-size must be >= 1",
                    key
                )));
            }
            if limits.max_consecutive_empty < 1 {
                return Err(ConfigError::Validation(format!(
                    "vendor '{}': max-consecutive-empty must be >= 1",
                    key
                )));
            }
            if limits.safety_limit < 1 {
                return Err(ConfigError::Validation(format!(
                    "vendor '{}': safety-limit must be >= 1",
                    key
                )));
            }
        }
    }

    Ok(())
}

/// Vendor keys name directories, so they are kept to lowercase slugs
fn validate_vendor_key(key: &str) -> Result<(), ConfigError> {
    if key.is_empty()
        || !key
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
    {
        return Err(ConfigError::Validation(format!(
            "vendor key '{}' must be lowercase letters, digits, '-' or '_'",
            key
        )));
    }
    Ok(())
}

fn validate_http_url(value: &str, what: &str) -> Result<(), ConfigError> {
    let url = Url::parse(value)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid {} '{}': {}", what, value, e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "{} '{}' must use http or https",
            what, value
        )));
    }

    Ok(())
}

fn validate_regex(pattern: &str) -> Result<(), ConfigError> {
    Regex::new(pattern)
        .map(|_| ())
        .map_err(|e| ConfigError::InvalidPattern(format!("'{}': {}", pattern, e)))
}
