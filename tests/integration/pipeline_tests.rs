//! Integration tests for the pipeline runner
//!
//! The runner is driven through the public API with in-process fakes for
//! discovery, scraping and classification, and a file-backed SQLite graph.
//! The last tests wire the production collaborators against a wiremock
//! server.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use story_harvest::classify::{Classification, ClassifyError, Classifier};
use story_harvest::config::{parse_config, Config};
use story_harvest::crawler::{ReferenceScraper, ScraperFactory, UrlDiscoverer};
use story_harvest::pipeline::{Collaborators, Phase, PipelineRunner};
use story_harvest::storage::{FileStore, GraphStore, ScrapeRecord, SqliteGraphStore};
use story_harvest::{HarvestError, VendorConfig};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CONFIG: &str = r#"
[vendors.acme]
name = "Acme Cloud"
website = "https://acme.example"
discovery-method = "sitemap"

[vendors.acme.sitemap]
url = "https://acme.example/sitemap.xml"

[vendors.globex]
name = "Globex"
website = "https://globex.example"
discovery-method = "sitemap"

[vendors.globex.error-handling]
skip-on-error = true

[vendors.globex.sitemap]
url = "https://globex.example/sitemap.xml"

[vendors.initech]
name = "Initech"
website = "https://initech.example"
discovery-method = "sitemap"
enabled = false

[vendors.initech.sitemap]
url = "https://initech.example/sitemap.xml"

# Disabled so whole-run tests leave it out; driven phase by phase
[vendors.umbrella]
name = "Umbrella"
website = "https://umbrella.example"
discovery-method = "pagination"
enabled = false

[vendors.umbrella.error-handling]
skip-on-error = true

[vendors.umbrella.pagination.url]
strategy = "page-number"
path = "/customers"
"#;

// ===== Fakes =====

/// Discovery results keyed by vendor name
struct FakeDiscoverer {
    urls: HashMap<String, Vec<String>>,
}

#[async_trait]
impl UrlDiscoverer for FakeDiscoverer {
    async fn discover(&self, vendor: &VendorConfig) -> Result<Vec<String>, HarvestError> {
        self.urls
            .get(&vendor.name)
            .cloned()
            .ok_or_else(|| HarvestError::Discovery {
                vendor: vendor.name.clone(),
                message: "sitemap unreachable".to_string(),
            })
    }
}

/// Serves pages whose word count is looked up by URL
struct FakeScraper {
    words: Arc<HashMap<String, usize>>,
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl ReferenceScraper for FakeScraper {
    fn delay(&self) -> Duration {
        Duration::ZERO
    }

    /// Every URL the scraper knows, as if found on listing pages
    async fn get_customer_reference_urls(&self) -> Result<Vec<String>, HarvestError> {
        let mut urls: Vec<String> = self.words.keys().cloned().collect();
        urls.sort();
        Ok(urls)
    }

    async fn scrape_reference(&self, url: &str) -> Result<Option<ScrapeRecord>, HarvestError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let Some(&words) = self.words.get(url) else {
            return Ok(None);
        };
        Ok(Some(ScrapeRecord {
            url: url.to_string(),
            customer_name: "Customer".to_string(),
            raw_text: vec!["word"; words].join(" "),
            scraped_date: "2026-01-01T00:00:00Z".to_string(),
            word_count: words,
            method: "http".to_string(),
            vendor_website: None,
        }))
    }
}

struct FakeScraperFactory {
    words: Arc<HashMap<String, usize>>,
    calls: Arc<AtomicUsize>,
    /// Vendor keys whose scraper cannot be built
    broken: Vec<String>,
}

impl ScraperFactory for FakeScraperFactory {
    fn scraper_for(
        &self,
        vendor_key: &str,
        _vendor: &VendorConfig,
    ) -> Result<Box<dyn ReferenceScraper>, HarvestError> {
        if self.broken.iter().any(|key| key == vendor_key) {
            return Err(HarvestError::Discovery {
                vendor: vendor_key.to_string(),
                message: "render service unavailable".to_string(),
            });
        }
        Ok(Box::new(FakeScraper {
            words: Arc::clone(&self.words),
            calls: Arc::clone(&self.calls),
        }))
    }
}

struct FakeClassifier {
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl Classifier for FakeClassifier {
    async fn classify(
        &self,
        _text: &str,
        url: &str,
    ) -> Result<Option<Classification>, ClassifyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Some(Classification {
            customer_name: Some(url.rsplit('/').next().unwrap_or("customer").to_string()),
            industry: Some("Retail".to_string()),
            ..Default::default()
        }))
    }
}

// ===== Harness =====

struct Harness {
    temp_dir: TempDir,
    runner: PipelineRunner,
    scrapes: Arc<AtomicUsize>,
    classifications: Arc<AtomicUsize>,
}

fn acme_urls() -> Vec<String> {
    ["one", "two", "three"]
        .iter()
        .map(|slug| format!("https://acme.example/customers/{}", slug))
        .collect()
}

fn globex_urls() -> Vec<String> {
    vec!["https://globex.example/customers/alpha".to_string()]
}

fn test_config(temp_dir: &TempDir) -> Config {
    let mut config = parse_config(CONFIG).unwrap();
    config.pipeline.data_dir = temp_dir.path().join("data");
    config.pipeline.logs_dir = temp_dir.path().join("logs");
    config.graph.database_path = temp_dir.path().join("graph.db");
    config
}

fn harness_with(words: HashMap<String, usize>, broken: &[&str]) -> Harness {
    let temp_dir = TempDir::new().unwrap();
    let config = test_config(&temp_dir);

    let mut discovered = HashMap::new();
    discovered.insert("Acme Cloud".to_string(), acme_urls());
    discovered.insert("Globex".to_string(), globex_urls());

    let scrapes = Arc::new(AtomicUsize::new(0));
    let classifications = Arc::new(AtomicUsize::new(0));

    let collaborators = Collaborators {
        graph: Box::new(SqliteGraphStore::open(&config.graph.database_path).unwrap()),
        files: FileStore::new(&config.pipeline.data_dir),
        scrapers: Box::new(FakeScraperFactory {
            words: Arc::new(words),
            calls: Arc::clone(&scrapes),
            broken: broken.iter().map(|key| key.to_string()).collect(),
        }),
        discoverer: Box::new(FakeDiscoverer { urls: discovered }),
        classifier: Some(Box::new(FakeClassifier {
            calls: Arc::clone(&classifications),
        })),
    };

    Harness {
        runner: PipelineRunner::new(config, collaborators),
        temp_dir,
        scrapes,
        classifications,
    }
}

/// Every known URL has 150 words
fn harness() -> Harness {
    let words = acme_urls()
        .into_iter()
        .chain(globex_urls())
        .map(|url| (url, 150))
        .collect();
    harness_with(words, &[])
}

impl Harness {
    fn record_count(&self, vendor_key: &str) -> usize {
        self.runner.files().record_files(vendor_key).unwrap().len()
    }

    fn reference_count(&self, vendor_name: &str) -> u64 {
        self.runner
            .graph()
            .count_references(Some(vendor_name))
            .unwrap()
    }

    async fn run(&mut self, vendor_key: &str, phases: &[Phase], force: bool, dry_run: bool) {
        self.runner
            .run_all_phases(vendor_key, Some(phases), None, force, dry_run)
            .await
            .unwrap();
    }
}

// ===== Idempotency =====

#[tokio::test]
async fn test_discovery_is_idempotent_until_loaded() {
    let mut h = harness();

    let first = h.runner.run_phase1("acme", false, false).await.unwrap();
    let second = h.runner.run_phase1("acme", false, false).await.unwrap();
    assert_eq!(first.discovered, 3);
    assert_eq!(first.new, 3);
    assert_eq!(second.new, first.new);

    h.run("acme", &[Phase::Scraping, Phase::Loading], false, false)
        .await;

    let third = h.runner.run_phase1("acme", false, false).await.unwrap();
    assert_eq!(third.discovered, 3);
    assert_eq!(third.new, 0);
    assert_eq!(third.skipped, 3);
}

#[tokio::test]
async fn test_scraping_skips_existing_records() {
    let mut h = harness();
    h.run("acme", &[Phase::Discovery, Phase::Scraping], false, false)
        .await;
    assert_eq!(h.scrapes.load(Ordering::SeqCst), 3);

    let again = h.runner.run_phase2("acme", false, false).await.unwrap();
    assert_eq!(again.scraped, 0);
    assert_eq!(again.skipped, 3);
    assert_eq!(h.scrapes.load(Ordering::SeqCst), 3);

    let forced = h.runner.run_phase2("acme", true, false).await.unwrap();
    assert_eq!(forced.scraped, 3);
    assert_eq!(h.scrapes.load(Ordering::SeqCst), 6);
}

#[tokio::test]
async fn test_loading_twice_adds_no_duplicates() {
    let mut h = harness();
    h.run(
        "acme",
        &[Phase::Discovery, Phase::Scraping, Phase::Loading],
        false,
        false,
    )
    .await;
    assert_eq!(h.reference_count("Acme Cloud"), 3);

    let again = h.runner.run_phase3("acme", false, false).await.unwrap();
    assert_eq!(again.loaded, 0);
    assert_eq!(again.skipped, 3);
    assert_eq!(h.reference_count("Acme Cloud"), 3);

    // A forced re-scrape writes second files for the same URLs
    h.runner.run_phase2("acme", true, false).await.unwrap();
    assert_eq!(h.record_count("acme"), 6);
    let reloaded = h.runner.run_phase3("acme", false, false).await.unwrap();
    assert_eq!(reloaded.loaded, 0);
    assert_eq!(reloaded.skipped, 6);
    assert_eq!(h.reference_count("Acme Cloud"), 3);
}

#[tokio::test]
async fn test_phase2_without_artifact() {
    let mut h = harness();

    let result = h.runner.run_phase2("acme", false, false).await.unwrap();

    assert!(result.is_error());
    assert_eq!(h.scrapes.load(Ordering::SeqCst), 0);
    assert_eq!(h.runner.reporter().error_count(), 0);
}

// ===== Quality floor =====

#[tokio::test]
async fn test_quality_floor() {
    let urls = acme_urls();
    let mut words = HashMap::new();
    words.insert(urls[0].clone(), 99);
    words.insert(urls[1].clone(), 100);
    let mut h = harness_with(words, &[]);

    h.runner.run_phase1("acme", false, false).await.unwrap();
    let result = h.runner.run_phase2("acme", false, false).await.unwrap();

    // 99 words and no content at all both fail
    assert_eq!(result.scraped, 1);
    assert_eq!(result.failed, 2);
    assert_eq!(h.record_count("acme"), 1);

    let scraped = h.runner.files().scraped_urls("acme").unwrap();
    assert!(scraped.contains(&urls[1]));
    assert!(!scraped.contains(&urls[0]));
}

// ===== Dry run =====

#[tokio::test]
async fn test_dry_run_leaves_stores_untouched() {
    let mut h = harness();

    let results = h
        .runner
        .run_all_phases("acme", None, None, false, true)
        .await
        .unwrap();

    assert_eq!(results[&Phase::Discovery].new, 3);
    assert!(results.values().all(|result| result.dry_run));
    assert!(h
        .runner
        .files()
        .list_discovery_artifacts("acme")
        .unwrap()
        .is_empty());
    assert_eq!(h.record_count("acme"), 0);
    assert_eq!(h.reference_count("Acme Cloud"), 0);
    assert_eq!(h.scrapes.load(Ordering::SeqCst), 0);
    assert_eq!(h.classifications.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_dry_run_counts_pending_work() {
    let mut h = harness();
    h.run("acme", &[Phase::Discovery, Phase::Scraping], false, false)
        .await;

    let loading = h.runner.run_phase3("acme", false, true).await.unwrap();
    assert_eq!(loading.new, 3);
    assert_eq!(h.reference_count("Acme Cloud"), 0);

    h.runner.run_phase3("acme", false, false).await.unwrap();
    let classifying = h.runner.run_phase4("acme", false, true).await.unwrap();
    assert_eq!(classifying.new, 3);
    assert_eq!(
        h.runner.graph().count_classified(Some("Acme Cloud")).unwrap(),
        0
    );
}

// ===== Classification =====

#[tokio::test]
async fn test_force_reclassifies_every_reference_once() {
    let mut h = harness();
    h.run("acme", &Phase::ALL, false, false).await;
    assert_eq!(h.classifications.load(Ordering::SeqCst), 3);
    assert_eq!(
        h.runner.graph().count_classified(Some("Acme Cloud")).unwrap(),
        3
    );

    let idle = h.runner.run_phase4("acme", false, false).await.unwrap();
    assert_eq!(idle.classified, 0);
    assert_eq!(h.classifications.load(Ordering::SeqCst), 3);

    let forced = h.runner.run_phase4("acme", true, false).await.unwrap();
    assert_eq!(forced.classified, 3);
    assert_eq!(h.classifications.load(Ordering::SeqCst), 6);
    assert_eq!(
        h.runner.graph().count_classified(Some("Acme Cloud")).unwrap(),
        3
    );
}

#[tokio::test]
async fn test_reset_then_classify() {
    let mut h = harness();
    h.run("acme", &Phase::ALL, false, false).await;

    let reset = h.runner.reset_classification(Some("acme"), None).unwrap();
    assert_eq!(reset, 3);
    assert_eq!(
        h.runner.graph().count_classified(Some("Acme Cloud")).unwrap(),
        0
    );

    let result = h.runner.run_phase4("acme", false, false).await.unwrap();
    assert_eq!(result.classified, 3);
}

// ===== Orchestration =====

#[tokio::test]
async fn test_report_conservation() {
    let mut h = harness();
    let all = h
        .runner
        .run_all_vendors(None, None, None, false, false)
        .await;

    // initech is disabled
    assert_eq!(all.keys().collect::<Vec<_>>(), vec!["acme", "globex"]);

    let summary = h.runner.finish("abc123", false, false).unwrap();
    assert_eq!(summary.vendors_processed, 2);
    assert_eq!(summary.errors, 0);
    assert_eq!(summary.totals.urls_discovered, 4);
    assert_eq!(
        summary.totals.urls_scraped,
        h.record_count("acme") + h.record_count("globex")
    );
    assert_eq!(
        summary.totals.references_loaded as u64,
        h.runner.graph().count_references(None).unwrap()
    );
    assert_eq!(
        summary.totals.references_classified as u64,
        h.runner.graph().count_classified(None).unwrap()
    );

    let logs: Vec<_> = std::fs::read_dir(h.temp_dir.path().join("logs"))
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert!(logs.iter().any(|name| name.starts_with("pipeline_report_") && name.ends_with(".json")));
    assert!(logs.iter().any(|name| name.starts_with("pipeline_report_") && name.ends_with(".md")));
    assert!(!logs.iter().any(|name| name.starts_with("pipeline_errors_")));
}

#[tokio::test]
async fn test_skip_on_error_abandons_vendor() {
    let mut h = harness_with(
        acme_urls()
            .into_iter()
            .chain(globex_urls())
            .map(|url| (url, 150))
            .collect(),
        &["acme", "globex"],
    );

    let globex = h
        .runner
        .run_all_phases("globex", None, None, false, false)
        .await
        .unwrap();
    assert_eq!(
        globex.keys().copied().collect::<Vec<_>>(),
        vec![Phase::Discovery, Phase::Scraping]
    );
    assert!(globex[&Phase::Scraping].is_error());

    // Without skip-on-error the remaining phases still run
    let acme = h
        .runner
        .run_all_phases("acme", None, None, false, false)
        .await
        .unwrap();
    assert_eq!(acme.len(), 4);
    assert!(acme[&Phase::Scraping].is_error());
    assert!(!acme[&Phase::Loading].is_error());

    assert_eq!(h.runner.reporter().error_count(), 2);
    let summary = h.runner.finish("abc123", false, false).unwrap();
    assert_eq!(summary.errors, 2);
    assert!(std::fs::read_dir(h.temp_dir.path().join("logs"))
        .unwrap()
        .any(|entry| entry
            .unwrap()
            .file_name()
            .to_string_lossy()
            .starts_with("pipeline_errors_")));
}

#[tokio::test]
async fn test_unknown_and_disabled_vendors_are_skipped() {
    let mut h = harness();
    let keys = vec![
        "nope".to_string(),
        "initech".to_string(),
        "acme".to_string(),
    ];

    let all = h
        .runner
        .run_all_vendors(
            Some(keys.as_slice()),
            Some(&[Phase::Discovery][..]),
            None,
            false,
            false,
        )
        .await;

    assert_eq!(all.keys().collect::<Vec<_>>(), vec!["acme"]);
    assert_eq!(h.runner.reporter().error_count(), 1);
    assert!(h.runner.reporter().errors()[0].contains("nope"));
}

#[tokio::test]
async fn test_discovery_failure_is_a_phase_result() {
    let temp_dir = TempDir::new().unwrap();
    let config = test_config(&temp_dir);
    let collaborators = Collaborators {
        graph: Box::new(SqliteGraphStore::open(&config.graph.database_path).unwrap()),
        files: FileStore::new(&config.pipeline.data_dir),
        scrapers: Box::new(FakeScraperFactory {
            words: Arc::new(HashMap::new()),
            calls: Arc::new(AtomicUsize::new(0)),
            broken: Vec::new(),
        }),
        discoverer: Box::new(FakeDiscoverer {
            urls: HashMap::new(),
        }),
        classifier: None,
    };
    let mut runner = PipelineRunner::new(config, collaborators);

    let result = runner.run_phase1("acme", false, false).await.unwrap();

    assert!(result.is_error());
    assert_eq!(runner.reporter().error_count(), 1);
}

#[tokio::test]
async fn test_pagination_discovery_through_scraper() {
    let mut h = harness();

    let result = h.runner.run_phase1("umbrella", false, false).await.unwrap();

    // The fake scraper lists every URL it can serve
    assert!(!result.is_error());
    assert_eq!(result.discovered, 4);
    assert_eq!(result.new, 4);
    assert_eq!(
        h.runner
            .files()
            .list_discovery_artifacts("umbrella")
            .unwrap()
            .len(),
        1
    );
}

#[tokio::test]
async fn test_scraper_setup_failure_is_a_discovery_result() {
    let mut h = harness_with(HashMap::new(), &["umbrella"]);

    let result = h.runner.run_phase1("umbrella", false, false).await.unwrap();
    assert!(result.is_error());
    assert_eq!(h.runner.reporter().error_count(), 1);

    // skip-on-error does not fire, so loading still runs
    let results = h
        .runner
        .run_all_phases(
            "umbrella",
            Some(&[Phase::Discovery, Phase::Loading][..]),
            None,
            false,
            false,
        )
        .await
        .unwrap();
    assert_eq!(
        results.keys().copied().collect::<Vec<_>>(),
        vec![Phase::Discovery, Phase::Loading]
    );
    assert!(results[&Phase::Discovery].is_error());
    assert!(!results[&Phase::Loading].is_error());
}

#[tokio::test]
async fn test_classification_requires_classifier() {
    let temp_dir = TempDir::new().unwrap();
    let config = test_config(&temp_dir);
    let collaborators = Collaborators {
        graph: Box::new(SqliteGraphStore::open(&config.graph.database_path).unwrap()),
        files: FileStore::new(&config.pipeline.data_dir),
        scrapers: Box::new(FakeScraperFactory {
            words: Arc::new(HashMap::new()),
            calls: Arc::new(AtomicUsize::new(0)),
            broken: Vec::new(),
        }),
        discoverer: Box::new(FakeDiscoverer {
            urls: HashMap::new(),
        }),
        classifier: None,
    };
    let mut runner = PipelineRunner::new(config, collaborators);

    assert!(matches!(
        runner.run_phase4("acme", false, false).await,
        Err(HarvestError::Config(_))
    ));
    // A dry run never needs the classifier
    assert!(runner.run_phase4("acme", false, true).await.is_ok());
}

// ===== Production collaborators =====

fn story_page(customer: &str) -> String {
    let paragraph = vec!["The team moved every workload to the platform"; 20].join(". ");
    format!(
        "<html><head><title>{customer}</title></head><body>\
         <nav>Home Pricing Docs</nav>\
         <h1>{customer} scales with Acme</h1><p>{paragraph}</p>\
         <footer>Copyright</footer></body></html>"
    )
}

#[tokio::test]
async fn test_end_to_end_with_sitemap_and_http() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    let sitemap = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
  <url><loc>{base}/customers/</loc></url>
  <url><loc>{base}/customers/initech</loc></url>
  <url><loc>{base}/customers/tiny</loc></url>
  <url><loc>{base}/pricing</loc></url>
</urlset>"#,
        base = base_url
    );

    Mock::given(method("GET"))
        .and(path("/sitemap.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_string(sitemap))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/customers/initech"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(story_page("Initech"))
                .insert_header("content-type", "text/html"),
        )
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/customers/tiny"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<p>short</p>"))
        .mount(&mock_server)
        .await;

    let temp_dir = TempDir::new().unwrap();
    let toml = format!(
        r#"
[scraper]
delay-ms = 0

[vendors.acme]
name = "Acme Cloud"
website = "{base}"
discovery-method = "sitemap"

[vendors.acme.sitemap]
url = "{base}/sitemap.xml"
include = ["/customers/"]
"#,
        base = base_url
    );
    let mut config = parse_config(&toml).unwrap();
    config.pipeline.data_dir = temp_dir.path().join("data");
    config.pipeline.logs_dir = temp_dir.path().join("logs");
    config.graph.database_path = temp_dir.path().join("graph.db");

    let collaborators = Collaborators::from_config(&config, None).unwrap();
    let mut runner = PipelineRunner::new(config, collaborators);

    let results = runner
        .run_all_phases(
            "acme",
            None,
            Some(&[Phase::Classification][..]),
            false,
            false,
        )
        .await
        .unwrap();

    let discovery = &results[&Phase::Discovery];
    assert_eq!(discovery.discovered, 2);

    let scraping = &results[&Phase::Scraping];
    assert_eq!(scraping.scraped, 1);
    assert_eq!(scraping.failed, 1);

    assert_eq!(results[&Phase::Loading].loaded, 1);

    let record_paths = runner.files().record_files("acme").unwrap();
    assert_eq!(record_paths.len(), 1);
    let record = runner.files().read_record(&record_paths[0]).unwrap();
    assert_eq!(record.url, format!("{}/customers/initech", base_url));
    assert_eq!(record.method, "http");
    assert!(record.word_count >= 100);
    assert!(!record.raw_text.contains("Pricing"));

    let stats = runner.stats().unwrap();
    assert_eq!(stats.vendors[0].references, 1);
    assert_eq!(stats.vendors[0].classified, 0);

    runner.close().unwrap();
}
