//! HTML parsing for listing pages and customer stories
//!
//! This module handles:
//! - Extracting customer reference links from listing pages
//! - Reducing a story page to readable text
//! - Guessing the customer's name from the text or the URL

use crate::config::LinkPatterns;
use regex::Regex;
use scraper::node::Node;
use scraper::{ElementRef, Html, Selector};
use std::collections::BTreeSet;
use std::sync::LazyLock;
use url::Url;

/// Path segments that name a listing page rather than a story
const LISTING_SEGMENTS: &[&str] = &[
    "customers",
    "customer-case-studies",
    "case-study",
    "case-studies",
];

/// URL segments never taken as a customer name
const GENERIC_SEGMENTS: &[&str] = &[
    "customers",
    "customer-case-studies",
    "case-study",
    "case-studies",
    "all-customers",
    "video",
    "en",
    "www",
    "gen-ai",
    "your-ai",
    "champions-program",
];

const LANGUAGE_SEGMENTS: &[&str] = &["de", "fr", "it", "jp", "kr", "br"];

const SKIPPED_TAGS: &[&str] = &[
    "head", "script", "style", "nav", "footer", "header", "noscript", "svg", "template",
];

const BLOCK_TAGS: &[&str] = &[
    "p", "div", "section", "article", "main", "aside", "li", "ul", "ol", "h1", "h2", "h3", "h4",
    "h5", "h6", "br", "tr", "table", "blockquote", "figure", "figcaption",
];

/// Client-side router payloads carry links as escaped JSON (`\"pathname\":\"/x\"`)
static PATHNAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\\?"pathname\\?"\s*:\s*\\?"(/[^\\"\s]+)"#).expect("valid regex")
});

static TITLE_SPLIT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\s+(?:uses|with|customer|case study|success|story)").expect("valid regex")
});

const TITLE_KEYWORDS: &[&str] = &["uses", "with", "customer", "case study", "success", "story"];

/// Case-insensitive substring filter for reference links
#[derive(Debug, Clone)]
pub struct LinkFilter {
    include: Vec<String>,
    exclude: Vec<String>,
}

impl LinkFilter {
    pub fn new(patterns: &LinkPatterns) -> Self {
        Self {
            include: patterns.include.iter().map(|p| p.to_lowercase()).collect(),
            exclude: patterns.exclude.iter().map(|p| p.to_lowercase()).collect(),
        }
    }

    /// Returns true if `href` points at an individual story
    pub fn accepts(&self, href: &str) -> bool {
        let lowered = href.to_lowercase();

        if !self.include.iter().any(|p| lowered.contains(p.as_str())) {
            return false;
        }
        if self.exclude.iter().any(|p| lowered.contains(p.as_str())) {
            return false;
        }

        let path = lowered.split(['?', '#']).next().unwrap_or_default();
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        // An absolute href also carries the scheme and host as segments
        let segments = if path.contains("://") {
            &segments[2.min(segments.len())..]
        } else {
            &segments[..]
        };

        match segments.last() {
            Some(last) if segments.len() > 1 => !LISTING_SEGMENTS.contains(last),
            _ => false,
        }
    }
}

/// Extracts customer reference links from a listing page
///
/// Anchors are read with an HTML selector; router payloads embedded in
/// scripts are scanned for `pathname` entries as well.
///
/// # Arguments
///
/// * `html` - The listing page body
/// * `base_url` - The URL the page was fetched from
/// * `filter` - The vendor's link filter
///
/// # Returns
///
/// The matching absolute URLs, deduplicated and sorted
pub fn extract_reference_links(html: &str, base_url: &str, filter: &LinkFilter) -> BTreeSet<String> {
    let mut links = BTreeSet::new();
    let base = match Url::parse(base_url) {
        Ok(base) => base,
        Err(e) => {
            tracing::warn!("Invalid listing URL {}: {}", base_url, e);
            return links;
        }
    };

    let document = Html::parse_document(html);
    if let Ok(selector) = Selector::parse("a[href]") {
        for element in document.select(&selector) {
            if let Some(href) = element.value().attr("href") {
                if filter.accepts(href) {
                    if let Some(url) = resolve_link(href, &base) {
                        links.insert(url);
                    }
                }
            }
        }
    }

    for captures in PATHNAME_RE.captures_iter(html) {
        let path = &captures[1];
        if filter.accepts(path) {
            if let Some(url) = resolve_link(path, &base) {
                links.insert(url);
            }
        }
    }

    links
}

/// Resolves a link href to an absolute URL and validates it
///
/// Returns None if the link should be excluded:
/// - javascript:, mailto:, tel: schemes
/// - data: URIs
/// - Fragment-only anchors
/// - Non-HTTP(S) URLs after resolution
fn resolve_link(href: &str, base_url: &Url) -> Option<String> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    if href.starts_with("javascript:")
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
        || href.starts_with("data:")
    {
        return None;
    }

    match base_url.join(href) {
        Ok(mut absolute_url) => {
            if absolute_url.scheme() != "http" && absolute_url.scheme() != "https" {
                return None;
            }
            absolute_url.set_fragment(None);
            Some(absolute_url.to_string())
        }
        Err(_) => None,
    }
}

/// Reduces a story page to readable text, one block per line
///
/// Page chrome (head, scripts, navigation, header and footer) is dropped.
/// The first-level heading is kept as a `# ` line.
pub fn extract_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut buffer = String::new();
    render_element(document.root_element(), &mut buffer);

    buffer
        .lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty() && line != "#")
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_element(element: ElementRef, out: &mut String) {
    let name = element.value().name();
    if SKIPPED_TAGS.contains(&name) {
        return;
    }

    let block = BLOCK_TAGS.contains(&name);
    if block {
        out.push('\n');
    }
    if name == "h1" {
        out.push_str("# ");
    }

    for child in element.children() {
        if let Some(child_element) = ElementRef::wrap(child) {
            render_element(child_element, out);
        } else if let Node::Text(text) = child.value() {
            out.push_str(&text.text);
        }
    }

    if block {
        out.push('\n');
    }
}

/// Whitespace-separated word count
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Guesses the customer's name from the page text, falling back to the URL
///
/// Returns "Unknown" when neither yields a plausible name.
pub fn extract_customer_name(text: &str, url: &str) -> String {
    for line in text.lines().take(15) {
        let line = line.trim();

        if let Some(heading) = line.strip_prefix("# ") {
            let heading = heading.trim();
            if !heading.is_empty() {
                return heading.to_string();
            }
            continue;
        }

        let length = line.chars().count();
        if length > 5 && length < 100 {
            let lowered = line.to_lowercase();
            if TITLE_KEYWORDS.iter().any(|k| lowered.contains(k)) {
                if let Some(first) = TITLE_SPLIT_RE.split(line).next() {
                    let candidate = first.trim();
                    let candidate_len = candidate.chars().count();
                    if candidate_len > 3 && candidate_len < 50 {
                        return candidate.to_string();
                    }
                }
            }
        }
    }

    name_from_url(url).unwrap_or_else(|| "Unknown".to_string())
}

fn name_from_url(url: &str) -> Option<String> {
    let path = Url::parse(url)
        .map(|parsed| parsed.path().to_string())
        .unwrap_or_else(|_| url.to_string());

    path.split('/')
        .rev()
        .filter(|segment| !segment.is_empty())
        .filter(|segment| !GENERIC_SEGMENTS.contains(segment))
        .filter(|segment| !LANGUAGE_SEGMENTS.contains(segment))
        .map(title_case_slug)
        .find(|name| name.chars().count() > 2)
}

fn title_case_slug(slug: &str) -> String {
    slug.split('-')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => {
                    first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter() -> LinkFilter {
        LinkFilter::new(&LinkPatterns::default())
    }

    const BASE: &str = "https://vendor.example/customers?page=1";

    #[test]
    fn test_accepts_story_links() {
        let f = filter();
        assert!(f.accepts("/customers/acme"));
        assert!(f.accepts("/en/case-study/globex-migration"));
        assert!(f.accepts("https://vendor.example/customers/acme"));
    }

    #[test]
    fn test_rejects_listing_and_unrelated_links() {
        let f = filter();
        assert!(!f.accepts("/customers/"));
        assert!(!f.accepts("/customers"));
        assert!(!f.accepts("https://vendor.example/customers/"));
        assert!(!f.accepts("/en/customers/case-studies"));
        assert!(!f.accepts("/pricing"));
    }

    #[test]
    fn test_exclude_patterns() {
        let f = LinkFilter::new(&LinkPatterns {
            include: vec!["/customers/".to_string()],
            exclude: vec!["/customers/industry/".to_string()],
        });
        assert!(f.accepts("/customers/acme"));
        assert!(!f.accepts("/customers/industry/retail"));
    }

    #[test]
    fn test_include_is_case_insensitive() {
        assert!(filter().accepts("/Customers/Acme"));
    }

    #[test]
    fn test_extract_anchor_links() {
        let html = r#"
            <html><body>
                <a href="/customers/acme">Acme</a>
                <a href="/customers/acme#quote">Acme again</a>
                <a href="/customers/">All</a>
                <a href="mailto:sales@vendor.example">Mail</a>
                <a href="https://vendor.example/customer-story/globex">Globex</a>
            </body></html>
        "#;
        let links = extract_reference_links(html, BASE, &filter());
        let links: Vec<_> = links.into_iter().collect();
        assert_eq!(
            links,
            vec![
                "https://vendor.example/customer-story/globex".to_string(),
                "https://vendor.example/customers/acme".to_string(),
            ]
        );
    }

    #[test]
    fn test_extract_router_payload_links() {
        let html = r#"<script>self.__next_f.push([1,"{\"pathname\":\"/customers/initech\",\"x\":1}"])</script>"#;
        let links = extract_reference_links(html, BASE, &filter());
        assert!(links.contains("https://vendor.example/customers/initech"));
    }

    #[test]
    fn test_extract_text_drops_chrome() {
        let html = r#"
            <html><head><title>Acme</title><style>p { color: red }</style></head>
            <body>
                <header>Vendor</header>
                <nav><a href="/">Home</a></nav>
                <h1>Acme  Corp</h1>
                <p>Acme reduced   costs.</p>
                <script>var x = 1;</script>
                <footer>Copyright</footer>
            </body></html>
        "#;
        assert_eq!(extract_text(html), "# Acme Corp\nAcme reduced costs.");
    }

    #[test]
    fn test_customer_name_from_heading() {
        let text = "Intro\n# Acme Corp\nMore";
        assert_eq!(extract_customer_name(text, "https://v.example/x"), "Acme Corp");
    }

    #[test]
    fn test_customer_name_from_title_line() {
        let text = "Globex uses Vendor to scale analytics";
        assert_eq!(extract_customer_name(text, "https://v.example/x"), "Globex");
    }

    #[test]
    fn test_customer_name_from_url() {
        assert_eq!(
            extract_customer_name("", "https://v.example/de/customers/initech-labs/"),
            "Initech Labs"
        );
        assert_eq!(
            extract_customer_name("", "https://v.example/customers/video/en"),
            "Unknown"
        );
    }

    #[test]
    fn test_word_count() {
        assert_eq!(word_count("one two\nthree  four"), 4);
        assert_eq!(word_count(""), 0);
    }
}
