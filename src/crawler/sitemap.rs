//! Sitemap-based URL discovery

use crate::config::{ScraperConfig, SitemapConfig, VendorConfig};
use crate::crawler::fetcher::build_http_client;
use crate::crawler::UrlDiscoverer;
use crate::{ConfigError, HarvestError};
use async_trait::async_trait;
use quick_xml::events::Event;
use quick_xml::reader::Reader;
use regex::Regex;
use reqwest::Client;
use std::collections::{BTreeSet, VecDeque};

/// Parsed body of one sitemap document
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SitemapDocument {
    /// `<sitemapindex>`: locations of child sitemaps
    Index(Vec<String>),
    /// `<urlset>`: page locations
    UrlSet(Vec<String>),
}

/// Parses the `<loc>` entries of a sitemap or sitemap index
///
/// The root element decides the variant. Malformed XML ends parsing early
/// and keeps the locations read up to that point.
pub fn parse_sitemap(xml: &str) -> SitemapDocument {
    let mut reader = Reader::from_str(xml);
    let mut is_index = false;
    let mut seen_root = false;
    let mut in_loc = false;
    let mut text = String::new();
    let mut locations = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                let name = e.local_name();
                if !seen_root {
                    seen_root = true;
                    is_index = name.as_ref().eq_ignore_ascii_case(b"sitemapindex");
                }
                if name.as_ref() == b"loc" {
                    in_loc = true;
                    text.clear();
                }
            }
            Ok(Event::Text(ref e)) if in_loc => match e.unescape() {
                Ok(chunk) => text.push_str(&chunk),
                Err(err) => tracing::debug!("Bad entity in sitemap <loc>: {}", err),
            },
            Ok(Event::CData(ref e)) if in_loc => {
                text.push_str(&String::from_utf8_lossy(e));
            }
            Ok(Event::End(ref e)) if e.local_name().as_ref() == b"loc" => {
                in_loc = false;
                let loc = text.trim();
                if !loc.is_empty() {
                    locations.push(loc.to_string());
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                tracing::warn!(
                    "Malformed sitemap at byte {}: {}",
                    reader.buffer_position(),
                    e
                );
                break;
            }
            _ => {}
        }
    }

    if is_index {
        SitemapDocument::Index(locations)
    } else {
        SitemapDocument::UrlSet(locations)
    }
}

/// Compiled include/exclude regexes, matched against the lowercased URL
#[derive(Debug)]
pub struct SitemapFilter {
    include: Vec<Regex>,
    exclude: Vec<Regex>,
}

impl SitemapFilter {
    pub fn new(config: &SitemapConfig) -> Result<Self, ConfigError> {
        let compile = |patterns: &[String]| {
            patterns
                .iter()
                .map(|p| {
                    Regex::new(p)
                        .map_err(|e| ConfigError::InvalidPattern(format!("'{}': {}", p, e)))
                })
                .collect::<Result<Vec<_>, _>>()
        };

        Ok(Self {
            include: compile(&config.include)?,
            exclude: compile(&config.exclude)?,
        })
    }

    pub fn accepts(&self, url: &str) -> bool {
        let lowered = url.to_lowercase();
        let included =
            self.include.is_empty() || self.include.iter().any(|re| re.is_match(&lowered));
        included && !self.exclude.iter().any(|re| re.is_match(&lowered))
    }
}

/// Discovers reference URLs from a vendor's sitemap
pub struct SitemapDiscoverer {
    client: Client,
}

impl SitemapDiscoverer {
    pub fn new(config: &ScraperConfig) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: build_http_client(config)?,
        })
    }

    async fn fetch_sitemap(&self, url: &str) -> Result<String, HarvestError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| HarvestError::Http {
                url: url.to_string(),
                source,
            })?;

        let response = response
            .error_for_status()
            .map_err(|source| HarvestError::Http {
                url: url.to_string(),
                source,
            })?;

        response.text().await.map_err(|source| HarvestError::Http {
            url: url.to_string(),
            source,
        })
    }

    /// Collects page locations from `sitemap.url`, following index files
    ///
    /// At most `sitemap.max_sitemaps` child sitemaps are fetched. A failing
    /// root sitemap is an error; failing children are skipped.
    async fn collect_locations(&self, sitemap: &SitemapConfig) -> Result<Vec<String>, HarvestError> {
        let root = self.fetch_sitemap(&sitemap.url).await?;
        let mut pages = Vec::new();
        let mut pending = VecDeque::new();

        match parse_sitemap(&root) {
            SitemapDocument::UrlSet(locations) => return Ok(locations),
            SitemapDocument::Index(children) => pending.extend(children),
        }

        let mut fetched = 0;
        while let Some(child) = pending.pop_front() {
            if fetched >= sitemap.max_sitemaps {
                tracing::info!(
                    "Sitemap limit reached ({}), {} child sitemaps not fetched",
                    sitemap.max_sitemaps,
                    pending.len() + 1
                );
                break;
            }
            fetched += 1;

            match self.fetch_sitemap(&child).await {
                Ok(xml) => match parse_sitemap(&xml) {
                    SitemapDocument::UrlSet(locations) => {
                        tracing::debug!("{}: {} URLs", child, locations.len());
                        pages.extend(locations);
                    }
                    SitemapDocument::Index(nested) => pending.extend(nested),
                },
                Err(e) => tracing::warn!("Skipping child sitemap: {}", e),
            }
        }

        Ok(pages)
    }
}

#[async_trait]
impl UrlDiscoverer for SitemapDiscoverer {
    async fn discover(&self, vendor: &VendorConfig) -> Result<Vec<String>, HarvestError> {
        let sitemap = vendor.sitemap.as_ref().ok_or_else(|| HarvestError::Discovery {
            vendor: vendor.name.clone(),
            message: "no sitemap section configured".to_string(),
        })?;
        let filter = SitemapFilter::new(sitemap)?;

        let locations = self.collect_locations(sitemap).await?;
        let total = locations.len();
        let urls: BTreeSet<String> = locations
            .into_iter()
            .filter(|url| filter.accepts(url))
            .collect();

        tracing::info!(
            "Sitemap for {}: {} URLs, {} customer references",
            vendor.name,
            total,
            urls.len()
        );

        Ok(urls.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DiscoveryMethod, ErrorHandling, LinkPatterns};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sitemap_config(url: String, max_sitemaps: usize) -> SitemapConfig {
        SitemapConfig {
            url,
            include: vec![r"/customers/".to_string()],
            exclude: vec![r"/customers/?$".to_string(), r"\?".to_string(), "#".to_string()],
            max_sitemaps,
        }
    }

    fn vendor(sitemap: SitemapConfig) -> VendorConfig {
        VendorConfig {
            name: "Globex".to_string(),
            website: "https://globex.example".to_string(),
            discovery_method: DiscoveryMethod::Sitemap,
            enabled: true,
            error_handling: ErrorHandling::default(),
            links: LinkPatterns::default(),
            sitemap: Some(sitemap),
            pagination: None,
        }
    }

    fn urlset(locs: &[&str]) -> String {
        let entries: String = locs
            .iter()
            .map(|loc| format!("<url><loc>{}</loc></url>", loc))
            .collect();
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?><urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">{}</urlset>"#,
            entries
        )
    }

    #[test]
    fn test_parse_urlset_with_cdata_and_entities() {
        let xml = r#"<urlset>
            <url><loc>https://v.example/customers/acme</loc></url>
            <url><loc><![CDATA[https://v.example/customers/globex]]></loc></url>
            <url><loc>https://v.example/a?x=1&amp;y=2</loc></url>
        </urlset>"#;
        assert_eq!(
            parse_sitemap(xml),
            SitemapDocument::UrlSet(vec![
                "https://v.example/customers/acme".to_string(),
                "https://v.example/customers/globex".to_string(),
                "https://v.example/a?x=1&y=2".to_string(),
            ])
        );
    }

    #[test]
    fn test_parse_skips_comments_and_decodes_char_refs() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
        <urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
            <!-- <url><loc>https://v.example/customers/retired</loc></url> -->
            <url><loc>https://v.example/customers/a?x=1&#38;y=2</loc></url>
        </urlset>"#;
        assert_eq!(
            parse_sitemap(xml),
            SitemapDocument::UrlSet(vec!["https://v.example/customers/a?x=1&y=2".to_string()])
        );
    }

    #[test]
    fn test_parse_malformed_keeps_prefix() {
        let xml = "<urlset><url><loc>https://v.example/customers/a</loc></url><url></loc></urlset>";
        assert_eq!(
            parse_sitemap(xml),
            SitemapDocument::UrlSet(vec!["https://v.example/customers/a".to_string()])
        );
    }

    #[test]
    fn test_parse_index() {
        let xml = "<sitemapindex><sitemap><loc>https://v.example/s1.xml</loc></sitemap></sitemapindex>";
        assert_eq!(
            parse_sitemap(xml),
            SitemapDocument::Index(vec!["https://v.example/s1.xml".to_string()])
        );
    }

    #[test]
    fn test_filter() {
        let filter =
            SitemapFilter::new(&sitemap_config("https://v.example/sitemap.xml".to_string(), 10))
                .unwrap();
        assert!(filter.accepts("https://v.example/Customers/Acme"));
        assert!(!filter.accepts("https://v.example/customers/"));
        assert!(!filter.accepts("https://v.example/customers/acme?lang=de"));
        assert!(!filter.accepts("https://v.example/blog/post"));
    }

    #[tokio::test]
    async fn test_discover_follows_index_up_to_limit() {
        let server = MockServer::start().await;
        let base = server.uri();

        let index = format!(
            "<sitemapindex><sitemap><loc>{base}/s1.xml</loc></sitemap><sitemap><loc>{base}/s2.xml</loc></sitemap></sitemapindex>"
        );
        Mock::given(method("GET"))
            .and(path("/sitemap.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(index))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/s1.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(urlset(&[
                "https://globex.example/customers/zeta",
                "https://globex.example/customers/acme",
                "https://globex.example/customers/acme",
                "https://globex.example/customers/",
                "https://globex.example/pricing",
            ])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/s2.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(urlset(&[
                "https://globex.example/customers/other",
            ])))
            .expect(0)
            .mount(&server)
            .await;

        let discoverer = SitemapDiscoverer::new(&ScraperConfig::default()).unwrap();
        let urls = discoverer
            .discover(&vendor(sitemap_config(format!("{base}/sitemap.xml"), 1)))
            .await
            .unwrap();

        assert_eq!(
            urls,
            vec![
                "https://globex.example/customers/acme".to_string(),
                "https://globex.example/customers/zeta".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_root_sitemap_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let discoverer = SitemapDiscoverer::new(&ScraperConfig::default()).unwrap();
        let result = discoverer
            .discover(&vendor(sitemap_config(
                format!("{}/sitemap.xml", server.uri()),
                10,
            )))
            .await;

        assert!(matches!(result, Err(HarvestError::Http { .. })));
    }
}
