//! URL strategies for listing pages

use serde::Deserialize;

/// How successive listing-page URLs are built from a vendor's base URL
///
/// Page indices passed to [`UrlStrategy::build_url`] are zero-based; the
/// page-number and path-segment strategies shift them by `start-at`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "strategy", rename_all = "kebab-case")]
pub enum UrlStrategy {
    /// `?page=N&pageSize=S&offset=N*S`
    Offset {
        path: String,
        #[serde(rename = "page-param", default = "default_page_param")]
        page_param: String,
        #[serde(rename = "page-size-param", default = "default_page_size_param")]
        page_size_param: String,
        #[serde(rename = "offset-param", default = "default_offset_param")]
        offset_param: String,
    },

    /// `?page=N`
    PageNumber {
        path: String,
        #[serde(rename = "page-param", default = "default_page_param")]
        page_param: String,
        #[serde(rename = "start-at", default = "default_start_at")]
        start_at: u32,
    },

    /// A path template such as `/customers/page/{page}`
    PathSegment {
        template: String,
        #[serde(rename = "start-at", default = "default_start_at")]
        start_at: u32,
    },
}

fn default_page_param() -> String {
    "page".to_string()
}

fn default_page_size_param() -> String {
    "pageSize".to_string()
}

fn default_offset_param() -> String {
    "offset".to_string()
}

fn default_start_at() -> u32 {
    1
}

impl UrlStrategy {
    /// Creates an offset strategy with the default parameter names
    pub fn offset(path: impl Into<String>) -> Self {
        UrlStrategy::Offset {
            path: path.into(),
            page_param: default_page_param(),
            page_size_param: default_page_size_param(),
            offset_param: default_offset_param(),
        }
    }

    /// Creates a page-number strategy starting at page 1
    pub fn page_number(path: impl Into<String>) -> Self {
        UrlStrategy::PageNumber {
            path: path.into(),
            page_param: default_page_param(),
            start_at: default_start_at(),
        }
    }

    /// Creates a path-segment strategy starting at page 1
    pub fn path_segment(template: impl Into<String>) -> Self {
        UrlStrategy::PathSegment {
            template: template.into(),
            start_at: default_start_at(),
        }
    }

    /// Builds the URL of the listing page at `page_index`
    ///
    /// # Arguments
    ///
    /// * `base_url` - The vendor website; a trailing slash is ignored
    /// * `page_index` - Zero-based page index
    /// * `page_size` - Items per page, used only by the offset strategy
    pub fn build_url(&self, base_url: &str, page_index: u32, page_size: u32) -> String {
        let base = base_url.trim_end_matches('/');
        match self {
            UrlStrategy::Offset {
                path,
                page_param,
                page_size_param,
                offset_param,
            } => {
                let offset = u64::from(page_index) * u64::from(page_size);
                format!(
                    "{}{}?{}={}&{}={}&{}={}",
                    base, path, page_param, page_index, page_size_param, page_size, offset_param,
                    offset
                )
            }
            UrlStrategy::PageNumber {
                path,
                page_param,
                start_at,
            } => format!("{}{}?{}={}", base, path, page_param, page_index + start_at),
            UrlStrategy::PathSegment { template, start_at } => {
                let path = template.replace("{page}", &(page_index + start_at).to_string());
                format!("{}{}", base, path)
            }
        }
    }

    /// Short name used in logs and discovery artifacts
    pub fn name(&self) -> &'static str {
        match self {
            UrlStrategy::Offset { .. } => "offset",
            UrlStrategy::PageNumber { .. } => "page-number",
            UrlStrategy::PathSegment { .. } => "path-segment",
        }
    }
}
