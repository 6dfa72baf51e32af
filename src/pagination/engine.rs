//! The pagination loop and its stop policy

use crate::pagination::UrlStrategy;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::fmt;

/// Fetches the raw content of one listing page
///
/// `None` signals a failed fetch; the engine counts it toward the
/// consecutive-empty limit and moves on to the next page.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch_page(&self, url: &str) -> Option<String>;
}

/// Limits and stop checks for a pagination run
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PaginationConfig {
    /// Items per page; only used to build URLs
    #[serde(rename = "page-size", default = "default_page_size")]
    pub page_size: u32,

    /// Consecutive empty (or failed) pages before stopping
    #[serde(rename = "max-consecutive-empty", default = "default_max_consecutive_empty")]
    pub max_consecutive_empty: u32,

    /// Hard page cap, disabled when unset
    #[serde(rename = "max-pages", default)]
    pub max_pages: Option<u32>,

    /// Absolute page cap, always enforced
    #[serde(rename = "safety-limit", default = "default_safety_limit")]
    pub safety_limit: u32,

    /// Stop once a non-empty page yields no unseen links
    #[serde(rename = "check-duplicates", default = "default_true")]
    pub check_duplicates: bool,

    /// Stop after `max_consecutive_empty` pages without links
    #[serde(rename = "check-empty-pages", default = "default_true")]
    pub check_empty_pages: bool,
}

fn default_page_size() -> u32 {
    12
}

fn default_max_consecutive_empty() -> u32 {
    2
}

fn default_safety_limit() -> u32 {
    100
}

fn default_true() -> bool {
    true
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            max_consecutive_empty: default_max_consecutive_empty(),
            max_pages: None,
            safety_limit: default_safety_limit(),
            check_duplicates: true,
            check_empty_pages: true,
        }
    }
}

/// Why a pagination run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    MaxPages(u32),
    SafetyLimit(u32),
    /// A non-empty page contained only links that were already seen
    LoopedBack,
    ConsecutiveEmpty(u32),
    ConsecutiveFailures(u32),
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::MaxPages(n) => write!(f, "reached max-pages limit ({})", n),
            StopReason::SafetyLimit(n) => write!(f, "reached safety limit ({} pages)", n),
            StopReason::LoopedBack => write!(f, "all links on the page were already seen"),
            StopReason::ConsecutiveEmpty(n) => write!(f, "{} consecutive empty pages", n),
            StopReason::ConsecutiveFailures(n) => write!(f, "{} consecutive failed pages", n),
        }
    }
}

/// Result of a pagination run
#[derive(Debug, Clone)]
pub struct PaginationOutcome {
    /// Distinct detail URLs, sorted
    pub urls: Vec<String>,

    /// Number of listing pages fetched (including failed fetches)
    pub pages_visited: u32,

    pub stop_reason: StopReason,
}

/// Walks listing pages until the stop policy fires
///
/// Stop checks for a page run against the link set as it was *before* the
/// page is merged. A page whose links are all known ends the run; a page
/// with no links only counts toward the consecutive-empty limit. Failed
/// fetches share that counter but never touch the link set.
///
/// # Arguments
///
/// * `strategy` - Builds the URL for each page index
/// * `fetcher` - Fetches listing page content
/// * `extract_links` - Maps `(content, base_url)` to absolute detail URLs
/// * `base_url` - The vendor website
/// * `config` - Limits and stop checks
pub async fn paginate<F>(
    strategy: &UrlStrategy,
    fetcher: &dyn PageFetcher,
    extract_links: F,
    base_url: &str,
    config: &PaginationConfig,
) -> PaginationOutcome
where
    F: Fn(&str, &str) -> BTreeSet<String> + Send + Sync,
{
    let mut seen: BTreeSet<String> = BTreeSet::new();
    let mut page_index: u32 = 0;
    let mut consecutive_empty: u32 = 0;
    let mut pages_visited: u32 = 0;

    tracing::info!("Paginating {} with {} strategy", base_url, strategy.name());

    let stop_reason = loop {
        if let Some(max_pages) = config.max_pages {
            if page_index >= max_pages {
                break StopReason::MaxPages(max_pages);
            }
        }
        if page_index >= config.safety_limit {
            break StopReason::SafetyLimit(config.safety_limit);
        }

        let page_url = strategy.build_url(base_url, page_index, config.page_size);
        tracing::debug!("Fetching listing page {} ({})", page_index + 1, page_url);

        let content = fetcher.fetch_page(&page_url).await;
        pages_visited += 1;

        let Some(content) = content else {
            consecutive_empty += 1;
            tracing::warn!(
                "Could not fetch listing page {} ({}/{} consecutive)",
                page_url,
                consecutive_empty,
                config.max_consecutive_empty
            );
            if consecutive_empty >= config.max_consecutive_empty {
                break StopReason::ConsecutiveFailures(consecutive_empty);
            }
            page_index += 1;
            continue;
        };

        let page_links = extract_links(&content, base_url);
        let new_links = page_links.difference(&seen).count();
        tracing::debug!(
            "Page {}: {} links ({} new), {} unique so far",
            page_index + 1,
            page_links.len(),
            new_links,
            seen.len()
        );

        if config.check_duplicates && !page_links.is_empty() && new_links == 0 {
            break StopReason::LoopedBack;
        }

        if page_links.is_empty() {
            consecutive_empty += 1;
            if config.check_empty_pages && consecutive_empty >= config.max_consecutive_empty {
                break StopReason::ConsecutiveEmpty(consecutive_empty);
            }
        } else {
            seen.extend(page_links);
            consecutive_empty = 0;
        }

        page_index += 1;
    };

    tracing::info!(
        "Pagination stopped after {} pages: {} ({} unique URLs)",
        pages_visited,
        stop_reason,
        seen.len()
    );

    PaginationOutcome {
        urls: seen.into_iter().collect(),
        pages_visited,
        stop_reason,
    }
}
