//! File store for discovery artifacts and scrape records
//!
//! Layout under the data directory:
//!
//! ```text
//! {data-dir}/scraped/{vendor}/
//! ├── discovered_urls-YYYYmmdd-HHMMSS.json   # one per discovery run, never mutated
//! └── {slug}-YYYYmmdd-HHMMSS.json            # one per scraped page
//! ```

use crate::storage::traits::StorageResult;
use crate::storage::ScrapeRecord;
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

const ARTIFACT_PREFIX: &str = "discovered_urls";
const MAX_SLUG_LEN: usize = 100;

/// Output of one discovery run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryArtifact {
    pub vendor: String,
    pub discovery_method: String,
    pub discovery_date: String,
    pub total_urls: usize,
    pub urls: Vec<String>,
}

impl DiscoveryArtifact {
    pub fn new(vendor: &str, discovery_method: &str, urls: Vec<String>) -> Self {
        Self {
            vendor: vendor.to_string(),
            discovery_method: discovery_method.to_string(),
            discovery_date: chrono::Utc::now().to_rfc3339(),
            total_urls: urls.len(),
            urls,
        }
    }
}

/// Only the field the scraped-state scan needs
#[derive(Deserialize)]
struct RecordUrl {
    url: String,
}

/// Local file store rooted at the data directory
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory holding one vendor's artifacts and records
    pub fn vendor_dir(&self, vendor_key: &str) -> PathBuf {
        self.root.join("scraped").join(vendor_key.to_lowercase())
    }

    // ===== Discovery artifacts =====

    /// Writes a new discovery artifact and returns its path
    pub fn write_discovery_artifact(
        &self,
        vendor_key: &str,
        artifact: &DiscoveryArtifact,
    ) -> StorageResult<PathBuf> {
        let name = format!("{}-{}", ARTIFACT_PREFIX, timestamp());
        let path = self.unique_path(vendor_key, &name)?;
        write_json_atomic(&path, artifact)?;
        tracing::debug!("Wrote discovery artifact {}", path.display());
        Ok(path)
    }

    /// All discovery artifact files for a vendor, sorted by name
    pub fn list_discovery_artifacts(&self, vendor_key: &str) -> StorageResult<Vec<PathBuf>> {
        Ok(self
            .json_files(vendor_key)?
            .into_iter()
            .filter(|path| is_artifact(path))
            .collect())
    }

    /// Picks the artifact Phase 2 works from
    ///
    /// The artifact with the most URLs wins; ties go to the most recently
    /// modified file, then to the later file name. Unparseable artifacts are
    /// skipped; if none parse, the newest file's parse error is returned.
    pub fn select_authoritative_artifact(
        &self,
        vendor_key: &str,
    ) -> StorageResult<Option<(PathBuf, DiscoveryArtifact)>> {
        let paths = self.list_discovery_artifacts(vendor_key)?;
        if paths.is_empty() {
            return Ok(None);
        }

        let mut best: Option<(usize, SystemTime, PathBuf, DiscoveryArtifact)> = None;
        for path in &paths {
            let artifact: DiscoveryArtifact = match read_json(path) {
                Ok(artifact) => artifact,
                Err(e) => {
                    tracing::warn!("Skipping unreadable artifact {}: {}", path.display(), e);
                    continue;
                }
            };
            let modified = modified_time(path);
            let count = artifact.urls.len();

            let better = match &best {
                None => true,
                Some((best_count, best_modified, best_path, _)) => {
                    (count, modified, path) > (*best_count, *best_modified, best_path)
                }
            };
            if better {
                best = Some((count, modified, path.clone(), artifact));
            }
        }

        match best {
            Some((_, _, path, artifact)) => Ok(Some((path, artifact))),
            None => {
                let newest = paths
                    .iter()
                    .max_by_key(|path| modified_time(path))
                    .cloned()
                    .unwrap_or_else(|| paths[paths.len() - 1].clone());
                let artifact: DiscoveryArtifact = read_json(&newest)?;
                Ok(Some((newest, artifact)))
            }
        }
    }

    // ===== Scrape records =====

    /// Writes one scrape record and returns its path
    ///
    /// The file name is derived from the URL slug or customer name plus a
    /// timestamp; a numeric suffix is added when that name is taken.
    pub fn save_reference_file(
        &self,
        vendor_key: &str,
        record: &ScrapeRecord,
    ) -> StorageResult<PathBuf> {
        let name = format!(
            "{}-{}",
            reference_slug(&record.url, Some(&record.customer_name)),
            timestamp()
        );
        let path = self.unique_path(vendor_key, &name)?;
        write_json_atomic(&path, record)?;
        Ok(path)
    }

    /// All record files for a vendor (artifacts excluded), sorted by name
    pub fn record_files(&self, vendor_key: &str) -> StorageResult<Vec<PathBuf>> {
        Ok(self
            .json_files(vendor_key)?
            .into_iter()
            .filter(|path| !is_artifact(path))
            .collect())
    }

    /// Reads one record file
    pub fn read_record(&self, path: &Path) -> StorageResult<ScrapeRecord> {
        read_json(path)
    }

    /// URLs of every parseable record file for a vendor
    pub fn scraped_urls(&self, vendor_key: &str) -> StorageResult<HashSet<String>> {
        let mut urls = HashSet::new();
        for path in self.record_files(vendor_key)? {
            match read_json::<RecordUrl>(&path) {
                Ok(record) => {
                    urls.insert(record.url);
                }
                Err(e) => {
                    tracing::debug!("Ignoring unparseable record {}: {}", path.display(), e);
                }
            }
        }
        Ok(urls)
    }

    // ===== Helpers =====

    fn json_files(&self, vendor_key: &str) -> StorageResult<Vec<PathBuf>> {
        let dir = self.vendor_dir(vendor_key);
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut files = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.is_file() && path.extension().map_or(false, |ext| ext == "json") {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    fn unique_path(&self, vendor_key: &str, stem: &str) -> StorageResult<PathBuf> {
        let dir = self.vendor_dir(vendor_key);
        std::fs::create_dir_all(&dir)?;

        let mut path = dir.join(format!("{}.json", stem));
        let mut suffix = 2;
        while path.exists() {
            path = dir.join(format!("{}-{}.json", stem, suffix));
            suffix += 1;
        }
        Ok(path)
    }
}

fn is_artifact(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .map_or(false, |name| name.starts_with(ARTIFACT_PREFIX))
}

fn modified_time(path: &Path) -> SystemTime {
    std::fs::metadata(path)
        .and_then(|meta| meta.modified())
        .unwrap_or(SystemTime::UNIX_EPOCH)
}

fn timestamp() -> String {
    Local::now().format("%Y%m%d-%H%M%S").to_string()
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> StorageResult<T> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

/// Writes to a temp file, then renames over the target
fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> StorageResult<()> {
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, serde_json::to_vec_pretty(value)?)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Makes a string safe to use as a file name stem
pub fn sanitize_filename(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '-',
            c => c,
        })
        .collect();

    let mut out = String::with_capacity(replaced.len());
    let mut last_was_sep = false;
    for c in replaced.trim_matches(|c| c == '.' || c == ' ').chars() {
        if c.is_whitespace() || c == '-' {
            if !last_was_sep {
                out.push('-');
            }
            last_was_sep = true;
        } else {
            out.push(c);
            last_was_sep = false;
        }
    }

    out.chars().take(MAX_SLUG_LEN).collect()
}

/// File name stem for a reference
///
/// Prefers the segment after `case-study` or `video` in the URL path, then
/// the customer name, then the last path segment.
pub fn reference_slug(url: &str, customer_name: Option<&str>) -> String {
    let segments: Vec<String> = url::Url::parse(url)
        .ok()
        .map(|parsed| {
            parsed
                .path_segments()
                .map(|parts| {
                    parts
                        .filter(|p| !p.is_empty())
                        .map(|p| p.to_string())
                        .collect()
                })
                .unwrap_or_default()
        })
        .unwrap_or_default();

    let after = |marker: &str| {
        segments
            .iter()
            .position(|s| s == marker)
            .and_then(|i| segments.get(i + 1))
            .cloned()
    };

    let slug = after("case-study")
        .or_else(|| after("video"))
        .or_else(|| {
            customer_name
                .map(|name| name.trim().to_lowercase())
                .filter(|name| !name.is_empty())
        })
        .or_else(|| segments.last().cloned())
        .unwrap_or_else(|| "reference".to_string());

    let sanitized = sanitize_filename(&slug);
    if sanitized.is_empty() {
        "reference".to_string()
    } else {
        sanitized
    }
}
