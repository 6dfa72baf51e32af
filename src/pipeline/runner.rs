//! Phase orchestrator
//!
//! Runs the four phases for each vendor in order. Every phase re-derives
//! its done-state from the graph store and the file store, so any phase can
//! be interrupted and re-run.

use crate::classify::Classifier;
use crate::config::{Config, DiscoveryMethod, VendorConfig, VendorRegistry};
use crate::crawler::{ScraperFactory, SitemapDiscoverer, UrlDiscoverer, WebScraperFactory};
use crate::output::{CostModel, RunReporter, RunSummary, VendorResults};
use crate::pipeline::idempotency::{
    difference, filter_new, filter_unscraped, unclassified_references,
};
use crate::pipeline::phase::{select_phases, Phase, PhaseResult};
use crate::storage::{
    DiscoveryArtifact, FileStore, GraphStore, SqliteGraphStore, StorageError,
};
use crate::{ConfigError, HarvestError};
use std::collections::BTreeMap;

/// Longest URL prefix quoted in error log lines
const URL_LOG_CHARS: usize = 60;

pub(crate) fn truncate_url(url: &str) -> String {
    if url.chars().count() > URL_LOG_CHARS {
        format!("{}...", url.chars().take(URL_LOG_CHARS).collect::<String>())
    } else {
        url.to_string()
    }
}

/// The pipeline's external collaborators
pub struct Collaborators {
    pub graph: Box<dyn GraphStore>,
    pub files: FileStore,
    pub scrapers: Box<dyn ScraperFactory>,
    pub discoverer: Box<dyn UrlDiscoverer>,
    /// `None` when the run never classifies (dry run, maintenance modes)
    pub classifier: Option<Box<dyn Classifier>>,
}

impl Collaborators {
    /// Builds the production collaborators described by `config`
    ///
    /// # Arguments
    ///
    /// * `config` - The loaded configuration
    /// * `classifier` - The classifier, if this run may classify
    pub fn from_config(
        config: &Config,
        classifier: Option<Box<dyn Classifier>>,
    ) -> Result<Self, HarvestError> {
        let mut graph = SqliteGraphStore::open(&config.graph.database_path)?;
        if !graph.verify_connection() {
            return Err(StorageError::Database(format!(
                "graph store at {} is not answering",
                config.graph.database_path.display()
            ))
            .into());
        }
        graph.ensure_indexes()?;

        Ok(Self {
            graph: Box::new(graph),
            files: FileStore::new(&config.pipeline.data_dir),
            scrapers: Box::new(WebScraperFactory::new(&config.scraper)?),
            discoverer: Box::new(SitemapDiscoverer::new(&config.scraper)?),
            classifier,
        })
    }
}

/// Sequences the phases for each vendor and keeps the run's results
pub struct PipelineRunner {
    pub(super) config: Config,
    pub(super) graph: Box<dyn GraphStore>,
    pub(super) files: FileStore,
    scrapers: Box<dyn ScraperFactory>,
    discoverer: Box<dyn UrlDiscoverer>,
    classifier: Option<Box<dyn Classifier>>,
    reporter: RunReporter,
    results: BTreeMap<String, VendorResults>,
}

impl PipelineRunner {
    pub fn new(config: Config, collaborators: Collaborators) -> Self {
        let reporter = RunReporter::new(&config.pipeline.logs_dir);
        Self {
            config,
            graph: collaborators.graph,
            files: collaborators.files,
            scrapers: collaborators.scrapers,
            discoverer: collaborators.discoverer,
            classifier: collaborators.classifier,
            reporter,
            results: BTreeMap::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn reporter(&self) -> &RunReporter {
        &self.reporter
    }

    pub fn reporter_mut(&mut self) -> &mut RunReporter {
        &mut self.reporter
    }

    pub fn graph(&self) -> &dyn GraphStore {
        self.graph.as_ref()
    }

    pub fn files(&self) -> &FileStore {
        &self.files
    }

    /// Phase results recorded so far, keyed by vendor
    pub fn results(&self) -> &BTreeMap<String, VendorResults> {
        &self.results
    }

    fn vendor(&self, vendor_key: &str) -> Result<VendorConfig, HarvestError> {
        self.config.get(vendor_key).cloned()
    }

    fn record(&mut self, vendor_key: &str, result: &PhaseResult) {
        self.reporter.record_phase(vendor_key, result);
        self.results
            .entry(vendor_key.to_string())
            .or_default()
            .insert(result.phase, result.clone());
    }

    // ===== Phase 1 =====

    /// Discovers candidate URLs and writes an artifact with the new ones
    ///
    /// A discovery failure is returned as a result carrying the error.
    pub async fn run_phase1(
        &mut self,
        vendor_key: &str,
        force: bool,
        dry_run: bool,
    ) -> Result<PhaseResult, HarvestError> {
        let vendor = self.vendor(vendor_key)?;
        let mut result = PhaseResult::new(Phase::Discovery, dry_run);
        self.reporter
            .log(format!("Phase 1: URL discovery for {}", vendor.name));

        let discovered = match vendor.discovery_method {
            DiscoveryMethod::Sitemap => self.discoverer.discover(&vendor).await,
            DiscoveryMethod::Pagination => match self.scrapers.scraper_for(vendor_key, &vendor) {
                Ok(scraper) => {
                    if !dry_run {
                        if let Err(e) = scraper.release_sessions().await {
                            tracing::warn!("Could not release render sessions: {}", e);
                        }
                    }
                    scraper.get_customer_reference_urls().await
                }
                Err(e) => Err(e),
            },
        };

        let candidates = match discovered {
            Ok(urls) => difference(&urls, &Default::default()),
            Err(e) => {
                self.reporter.log_error(format!(
                    "Failed to discover URLs via {} for {}: {}",
                    vendor.discovery_method.as_str(),
                    vendor_key,
                    e
                ));
                return Ok(PhaseResult::failed_with(Phase::Discovery, dry_run, e.to_string()));
            }
        };

        let new_urls = if force {
            candidates.clone()
        } else {
            filter_new(self.graph.as_ref(), &vendor.name, &candidates)?
        };

        result.discovered = candidates.len();
        result.new = new_urls.len();
        result.skipped = candidates.len() - new_urls.len();

        if dry_run {
            self.reporter.log(format!(
                "  [DRY RUN] Would record {} of {} discovered URLs",
                result.new, result.discovered
            ));
            return Ok(result);
        }

        if !new_urls.is_empty() {
            let artifact = DiscoveryArtifact::new(
                vendor_key,
                vendor.discovery_method.as_str(),
                new_urls,
            );
            let path = self.files.write_discovery_artifact(vendor_key, &artifact)?;
            self.reporter.log(format!(
                "  Saved {} URLs to {}",
                artifact.total_urls,
                path.display()
            ));
        }

        Ok(result)
    }

    // ===== Phase 2 =====

    /// Scrapes the unscraped URLs of the authoritative artifact
    pub async fn run_phase2(
        &mut self,
        vendor_key: &str,
        force: bool,
        dry_run: bool,
    ) -> Result<PhaseResult, HarvestError> {
        let vendor = self.vendor(vendor_key)?;
        let mut result = PhaseResult::new(Phase::Scraping, dry_run);
        self.reporter
            .log(format!("Phase 2: Content scraping for {}", vendor.name));

        let Some((path, artifact)) = self.files.select_authoritative_artifact(vendor_key)? else {
            self.reporter.warn(format!(
                "No discovery artifact for {}; run Phase 1 first",
                vendor_key
            ));
            return Ok(PhaseResult::failed_with(
                Phase::Scraping,
                dry_run,
                "no discovery artifact",
            ));
        };
        tracing::debug!("Scraping from artifact {}", path.display());

        let urls = if force {
            difference(&artifact.urls, &Default::default())
        } else {
            filter_unscraped(&self.files, vendor_key, &artifact.urls)?
        };
        result.skipped = artifact.urls.len().saturating_sub(urls.len());

        if urls.is_empty() {
            self.reporter.log(format!(
                "  All URLs already scraped (skipped {})",
                result.skipped
            ));
            return Ok(result);
        }

        if dry_run {
            result.new = urls.len();
            self.reporter
                .log(format!("  [DRY RUN] Would scrape {} URLs", result.new));
            return Ok(result);
        }

        let scraper = self.scrapers.scraper_for(vendor_key, &vendor)?;
        if let Err(e) = scraper.release_sessions().await {
            tracing::warn!("Could not release render sessions: {}", e);
        }
        let delay = scraper.delay();
        let min_words = self.config.pipeline.min_word_count;

        for (index, url) in urls.iter().enumerate() {
            if index > 0 && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            match scraper.scrape_reference(url).await {
                Ok(Some(mut record)) if record.word_count >= min_words => {
                    record.vendor_website = Some(vendor.website.clone());
                    match self.files.save_reference_file(vendor_key, &record) {
                        Ok(_) => result.scraped += 1,
                        Err(e) => {
                            self.reporter.log_error(format!(
                                "Failed to save {}: {}",
                                truncate_url(url),
                                e
                            ));
                            result.failed += 1;
                        }
                    }
                }
                Ok(Some(record)) => {
                    tracing::info!(
                        words = record.word_count,
                        min_words,
                        "Too little content at {}",
                        truncate_url(url)
                    );
                    result.failed += 1;
                }
                Ok(None) => {
                    tracing::info!("No usable content at {}", truncate_url(url));
                    result.failed += 1;
                }
                Err(e) => {
                    self.reporter.log_error(format!(
                        "Failed to scrape {}: {}",
                        truncate_url(url),
                        e
                    ));
                    result.failed += 1;
                }
            }
        }

        self.reporter.log(format!(
            "  Scraped {} references, failed {}",
            result.scraped, result.failed
        ));
        Ok(result)
    }

    // ===== Phase 3 =====

    /// Loads every record file into the graph; existing URLs are skipped
    pub async fn run_phase3(
        &mut self,
        vendor_key: &str,
        _force: bool,
        dry_run: bool,
    ) -> Result<PhaseResult, HarvestError> {
        let vendor = self.vendor(vendor_key)?;
        let mut result = PhaseResult::new(Phase::Loading, dry_run);
        self.reporter
            .log(format!("Phase 3: Graph loading for {}", vendor.name));

        let paths = self.files.record_files(vendor_key)?;
        if paths.is_empty() {
            self.reporter.log("  No record files found");
            return Ok(result);
        }

        if dry_run {
            let loaded = self.graph.existing_urls(&vendor.name)?;
            for path in &paths {
                match self.files.read_record(path) {
                    Ok(record) if loaded.contains(&record.url) => result.skipped += 1,
                    Ok(_) => result.new += 1,
                    Err(_) => result.failed += 1,
                }
            }
            self.reporter.log(format!(
                "  [DRY RUN] Would load {} of {} record files",
                result.new,
                paths.len()
            ));
            return Ok(result);
        }

        for path in &paths {
            let file_name = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();

            let mut record = match self.files.read_record(path) {
                Ok(record) => record,
                Err(e) => {
                    self.reporter
                        .log_error(format!("Failed to load {}: {}", file_name, e));
                    result.failed += 1;
                    continue;
                }
            };
            record.vendor_website = Some(vendor.website.clone());

            match self.graph.load_raw_reference(&vendor.name, &record) {
                Ok(Some(_)) => result.loaded += 1,
                Ok(None) => result.skipped += 1,
                Err(e) => {
                    self.reporter
                        .log_error(format!("Failed to load {}: {}", file_name, e));
                    result.failed += 1;
                }
            }
        }

        self.reporter.log(format!(
            "  Loaded {} references, skipped {} already in the graph",
            result.loaded, result.skipped
        ));
        Ok(result)
    }

    // ===== Phase 4 =====

    /// Classifies the vendor's unclassified references
    ///
    /// With `force`, the vendor's classified flags are reset first.
    pub async fn run_phase4(
        &mut self,
        vendor_key: &str,
        force: bool,
        dry_run: bool,
    ) -> Result<PhaseResult, HarvestError> {
        let vendor = self.vendor(vendor_key)?;
        let mut result = PhaseResult::new(Phase::Classification, dry_run);
        let limit = self.config.pipeline.classification_limit;
        self.reporter
            .log(format!("Phase 4: Classification for {}", vendor.name));

        if dry_run {
            let pending = if force {
                self.graph.count_references(Some(&vendor.name))? as usize
            } else {
                unclassified_references(self.graph.as_ref(), &vendor.name, limit)?.len()
            };
            result.new = pending.min(limit);
            self.reporter.log(format!(
                "  [DRY RUN] Would classify {} references",
                result.new
            ));
            return Ok(result);
        }

        let Some(classifier) = self.classifier.as_ref() else {
            return Err(ConfigError::MissingCredential(
                self.config.classifier.api_key_env.clone(),
            )
            .into());
        };

        if force {
            let reset = self.graph.mark_unclassified(Some(&vendor.name), None)?;
            self.reporter.log(format!(
                "  Reset {} references for re-classification",
                reset.len()
            ));
        }

        let pending = unclassified_references(self.graph.as_ref(), &vendor.name, limit)?;
        if pending.is_empty() {
            self.reporter.log("  No unclassified references");
            return Ok(result);
        }

        for reference in &pending {
            match classifier.classify(&reference.text, &reference.url).await {
                Ok(Some(classification)) => {
                    match self
                        .graph
                        .update_classification(&reference.id, &classification)
                    {
                        Ok(()) => result.classified += 1,
                        Err(e) => {
                            self.reporter.log_error(format!(
                                "Failed to store classification for {}: {}",
                                truncate_url(&reference.url),
                                e
                            ));
                            result.failed += 1;
                        }
                    }
                }
                Ok(None) => {
                    tracing::warn!("No classification for {}", truncate_url(&reference.url));
                    result.failed += 1;
                }
                Err(e) => {
                    self.reporter.log_error(format!(
                        "Failed to classify {}: {}",
                        truncate_url(&reference.url),
                        e
                    ));
                    result.failed += 1;
                }
            }
        }

        self.reporter.log(format!(
            "  Classified {} references, failed {}",
            result.classified, result.failed
        ));
        Ok(result)
    }

    // ===== Orchestration =====

    /// Runs one phase and records its result
    pub async fn run_phase(
        &mut self,
        phase: Phase,
        vendor_key: &str,
        force: bool,
        dry_run: bool,
    ) -> Result<PhaseResult, HarvestError> {
        let outcome = match phase {
            Phase::Discovery => self.run_phase1(vendor_key, force, dry_run).await,
            Phase::Scraping => self.run_phase2(vendor_key, force, dry_run).await,
            Phase::Loading => self.run_phase3(vendor_key, force, dry_run).await,
            Phase::Classification => self.run_phase4(vendor_key, force, dry_run).await,
        };
        if let Ok(result) = &outcome {
            self.record(vendor_key, result);
        }
        outcome
    }

    /// Runs the selected phases for one vendor in ascending order
    ///
    /// An unrecoverable phase error is recorded as that phase's result. When
    /// the vendor sets `skip-on-error`, its remaining phases are abandoned.
    pub async fn run_all_phases(
        &mut self,
        vendor_key: &str,
        phases: Option<&[Phase]>,
        skip_phases: Option<&[Phase]>,
        force: bool,
        dry_run: bool,
    ) -> Result<VendorResults, HarvestError> {
        let vendor = self.vendor(vendor_key)?;
        let mut results = VendorResults::new();

        for phase in select_phases(phases, skip_phases) {
            match self.run_phase(phase, vendor_key, force, dry_run).await {
                Ok(result) => {
                    results.insert(phase, result);
                }
                Err(e) => {
                    self.reporter
                        .log_error(format!("{} failed for {}: {}", phase, vendor_key, e));
                    let result = PhaseResult::failed_with(phase, dry_run, e.to_string());
                    self.record(vendor_key, &result);
                    results.insert(phase, result);

                    if vendor.error_handling.skip_on_error {
                        self.reporter.warn(format!(
                            "Skipping remaining phases for {} (skip-on-error)",
                            vendor_key
                        ));
                        break;
                    }
                }
            }
        }

        Ok(results)
    }

    /// Runs the selected phases for each vendor, one vendor at a time
    ///
    /// # Arguments
    ///
    /// * `vendor_keys` - Vendors to process; all enabled vendors when `None`
    /// * `phases` - Allow-list of phases; all when `None`
    /// * `skip_phases` - Deny-list of phases; wins over `phases`
    /// * `force` - Bypass the idempotency filters
    /// * `dry_run` - Report intended work without side effects
    ///
    /// # Returns
    ///
    /// Phase results keyed by vendor key. Unknown and disabled vendors are
    /// logged and left out; a failing vendor never stops the loop.
    pub async fn run_all_vendors(
        &mut self,
        vendor_keys: Option<&[String]>,
        phases: Option<&[Phase]>,
        skip_phases: Option<&[Phase]>,
        force: bool,
        dry_run: bool,
    ) -> BTreeMap<String, VendorResults> {
        let keys = match vendor_keys {
            Some(keys) => keys.to_vec(),
            None => self.config.enabled_keys(),
        };
        let mut all = BTreeMap::new();

        for vendor_key in keys {
            let vendor = match self.config.get(&vendor_key) {
                Ok(vendor) => vendor.clone(),
                Err(e) => {
                    self.reporter.log_error(format!("{}, skipping", e));
                    continue;
                }
            };
            if !vendor.enabled {
                self.reporter
                    .log(format!("Skipping disabled vendor: {}", vendor_key));
                continue;
            }

            self.reporter.log("=".repeat(70));
            self.reporter
                .log(format!("Processing: {} ({})", vendor.name, vendor_key));
            self.reporter.log("=".repeat(70));

            match self
                .run_all_phases(&vendor_key, phases, skip_phases, force, dry_run)
                .await
            {
                Ok(results) => {
                    all.insert(vendor_key, results);
                }
                Err(e) => {
                    self.reporter
                        .log_error(format!("Failed to process {}: {}", vendor.name, e));
                }
            }
        }

        all
    }

    // ===== Completion =====

    /// Writes the run report and error log for everything recorded so far
    ///
    /// Called once at the end of a run, including an interrupted one.
    pub fn finish(
        &mut self,
        config_hash: &str,
        dry_run: bool,
        interrupted: bool,
    ) -> Result<RunSummary, HarvestError> {
        let costs = CostModel::new(&self.config.costs);
        let summary = self.reporter.generate_summary(
            &self.results,
            &costs,
            config_hash,
            dry_run,
            interrupted,
        );
        self.reporter.save_report(&summary)?;
        self.reporter.save_error_log()?;
        Ok(summary)
    }

    /// Releases the graph store
    pub fn close(self) -> Result<(), HarvestError> {
        self.graph.close()?;
        Ok(())
    }
}
