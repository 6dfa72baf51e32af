//! Maintenance operations on the graph store

use crate::config::VendorRegistry;
use crate::output::{load_statistics, GraphStatistics};
use crate::pipeline::PipelineRunner;
use crate::HarvestError;
use serde::Serialize;

/// Outcome of a duplicate cleanup
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DedupeReport {
    pub dry_run: bool,
    /// URLs held by more than one reference node
    pub duplicate_urls: usize,
    /// Nodes that are not the keeper of their URL
    pub redundant_nodes: usize,
    pub deleted: usize,
}

impl PipelineRunner {
    /// Clears classified flags and classification edges of matching references
    ///
    /// # Arguments
    ///
    /// * `vendor_key` - Restrict to one vendor
    /// * `url_pattern` - Restrict to URLs containing this substring
    ///
    /// # Returns
    ///
    /// The number of references reset
    pub fn reset_classification(
        &mut self,
        vendor_key: Option<&str>,
        url_pattern: Option<&str>,
    ) -> Result<usize, HarvestError> {
        let vendor_name = match vendor_key {
            Some(key) => Some(self.config.get(key)?.name.clone()),
            None => None,
        };

        let ids = self
            .graph
            .mark_unclassified(vendor_name.as_deref(), url_pattern)?;
        for id in &ids {
            self.graph.clear_classification(id)?;
        }

        self.reporter_mut().log(format!(
            "Reset classification of {} references",
            ids.len()
        ));
        Ok(ids.len())
    }

    /// Deletes every reference node that shares its URL with a keeper
    ///
    /// The keeper of a URL is its first classified node, or its oldest node
    /// when none is classified.
    pub fn cleanup_duplicates(&mut self, dry_run: bool) -> Result<DedupeReport, HarvestError> {
        let groups = self.graph.duplicate_groups()?;
        let mut report = DedupeReport {
            dry_run,
            duplicate_urls: groups.len(),
            ..Default::default()
        };

        for group in &groups {
            let redundant = group.redundant();
            report.redundant_nodes += redundant.len();
            tracing::debug!(
                "{}: keeping {:?}, {} redundant",
                group.url,
                group.keeper().map(|node| node.id.as_str()),
                redundant.len()
            );

            if dry_run {
                continue;
            }
            for node in redundant {
                self.graph.delete_reference(&node.id)?;
                report.deleted += 1;
            }
        }

        let verb = if dry_run { "Would delete" } else { "Deleted" };
        self.reporter_mut().log(format!(
            "{} {} redundant references across {} duplicated URLs",
            verb, report.redundant_nodes, report.duplicate_urls
        ));
        Ok(report)
    }

    /// Graph-wide counts plus a breakdown for every configured vendor
    pub fn stats(&self) -> Result<GraphStatistics, HarvestError> {
        let vendors: Vec<(String, String)> = self
            .config
            .vendors
            .iter()
            .map(|(key, vendor)| (key.clone(), vendor.name.clone()))
            .collect();
        Ok(load_statistics(self.graph.as_ref(), &vendors)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::Classification;
    use crate::config::parse_config;
    use crate::crawler::{
        ReferenceScraper, ScraperFactory, UrlDiscoverer,
    };
    use crate::pipeline::Collaborators;
    use crate::storage::{FileStore, GraphStore, ScrapeRecord, SqliteGraphStore};
    use crate::VendorConfig;
    use async_trait::async_trait;
    use tempfile::TempDir;

    struct NoScrapers;

    impl ScraperFactory for NoScrapers {
        fn scraper_for(
            &self,
            vendor_key: &str,
            _vendor: &VendorConfig,
        ) -> Result<Box<dyn ReferenceScraper>, HarvestError> {
            Err(HarvestError::UnknownVendor(vendor_key.to_string()))
        }
    }

    struct NoDiscovery;

    #[async_trait]
    impl UrlDiscoverer for NoDiscovery {
        async fn discover(&self, vendor: &VendorConfig) -> Result<Vec<String>, HarvestError> {
            Err(HarvestError::UnknownVendor(vendor.name.clone()))
        }
    }

    const CONFIG: &str = r#"
[vendors.acme]
name = "Acme Cloud"
website = "https://acme.example"
discovery-method = "sitemap"

[vendors.acme.sitemap]
url = "https://acme.example/sitemap.xml"
"#;

    fn record(url: &str) -> ScrapeRecord {
        ScrapeRecord {
            url: url.to_string(),
            customer_name: "Initech".to_string(),
            raw_text: "Initech story".to_string(),
            scraped_date: "2026-01-01T00:00:00Z".to_string(),
            word_count: 2,
            method: "http".to_string(),
            vendor_website: None,
        }
    }

    fn runner(graph: SqliteGraphStore, temp_dir: &TempDir) -> PipelineRunner {
        let mut config = parse_config(CONFIG).unwrap();
        config.pipeline.logs_dir = temp_dir.path().join("logs");
        PipelineRunner::new(
            config,
            Collaborators {
                graph: Box::new(graph),
                files: FileStore::new(temp_dir.path().join("data")),
                scrapers: Box::new(NoScrapers),
                discoverer: Box::new(NoDiscovery),
                classifier: None,
            },
        )
    }

    #[test]
    fn test_reset_classification_by_pattern() {
        let temp_dir = TempDir::new().unwrap();
        let mut graph = SqliteGraphStore::new_in_memory().unwrap();
        for url in [
            "https://acme.example/customers/one",
            "https://acme.example/customers/two",
        ] {
            let id = graph
                .load_raw_reference("Acme Cloud", &record(url))
                .unwrap()
                .unwrap();
            graph
                .update_classification(&id, &Classification::default())
                .unwrap();
        }

        let mut runner = runner(graph, &temp_dir);
        let reset = runner
            .reset_classification(Some("acme"), Some("/two"))
            .unwrap();

        assert_eq!(reset, 1);
        assert_eq!(runner.graph().count_classified(Some("Acme Cloud")).unwrap(), 1);
    }

    #[test]
    fn test_reset_unknown_vendor() {
        let temp_dir = TempDir::new().unwrap();
        let mut runner = runner(SqliteGraphStore::new_in_memory().unwrap(), &temp_dir);

        assert!(matches!(
            runner.reset_classification(Some("nope"), None),
            Err(HarvestError::UnknownVendor(_))
        ));
    }

    #[test]
    fn test_stats_lists_configured_vendors() {
        let temp_dir = TempDir::new().unwrap();
        let mut graph = SqliteGraphStore::new_in_memory().unwrap();
        graph
            .load_raw_reference("Acme Cloud", &record("https://acme.example/customers/one"))
            .unwrap();

        let runner = runner(graph, &temp_dir);
        let stats = runner.stats().unwrap();

        assert_eq!(stats.graph.total_references, 1);
        assert_eq!(stats.vendors.len(), 1);
        assert_eq!(stats.vendors[0].vendor_key, "acme");
        assert_eq!(stats.vendors[0].references, 1);
    }

    #[test]
    fn test_cleanup_without_duplicates() {
        let temp_dir = TempDir::new().unwrap();
        let mut graph = SqliteGraphStore::new_in_memory().unwrap();
        graph
            .load_raw_reference("Acme Cloud", &record("https://acme.example/customers/one"))
            .unwrap();

        let mut runner = runner(graph, &temp_dir);
        let report = runner.cleanup_duplicates(false).unwrap();

        assert_eq!(report.duplicate_urls, 0);
        assert_eq!(report.deleted, 0);
        assert_eq!(runner.graph().count_references(None).unwrap(), 1);
    }
}
