//! SQLite graph store implementation
//!
//! This module provides a SQLite-based implementation of the GraphStore trait.

use crate::classify::Classification;
use crate::storage::schema::{initialize_schema, INDEX_SQL};
use crate::storage::traits::{GraphStore, StorageError, StorageResult};
use crate::storage::{DuplicateGroup, DuplicateNode, GraphStats, PendingReference, ScrapeRecord};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use std::collections::HashSet;
use std::path::Path;
use uuid::Uuid;

/// SQLite graph store backend
pub struct SqliteGraphStore {
    conn: Connection,
}

impl SqliteGraphStore {
    /// Opens or creates the graph database at `path`
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file; parent directories are created
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteGraphStore)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open database
    pub fn open(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;
        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }
}

/// Inserts a name-keyed node if missing and returns its id
fn merge_named_node(tx: &Transaction<'_>, table: &str, name: &str) -> rusqlite::Result<i64> {
    tx.execute(
        &format!("INSERT OR IGNORE INTO {} (name) VALUES (?1)", table),
        params![name],
    )?;
    tx.query_row(
        &format!("SELECT id FROM {} WHERE name = ?1", table),
        params![name],
        |row| row.get(0),
    )
}

/// Deletes every classification edge of a reference
fn clear_edges(tx: &Transaction<'_>, reference_id: &str) -> rusqlite::Result<()> {
    for table in [
        "ref_customers",
        "ref_use_cases",
        "ref_technologies",
        "outcomes",
        "personas",
    ] {
        tx.execute(
            &format!("DELETE FROM {} WHERE ref_id = ?1", table),
            params![reference_id],
        )?;
    }
    Ok(())
}

fn delete_orphan_customers(tx: &Transaction<'_>) -> rusqlite::Result<usize> {
    tx.execute(
        "DELETE FROM customers WHERE id NOT IN (SELECT customer_id FROM ref_customers)",
        [],
    )
}

fn reference_exists(tx: &Transaction<'_>, reference_id: &str) -> rusqlite::Result<bool> {
    let found: Option<i64> = tx
        .query_row(
            "SELECT seq FROM refs WHERE id = ?1",
            params![reference_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

impl GraphStore for SqliteGraphStore {
    fn verify_connection(&self) -> bool {
        self.conn
            .query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .is_ok()
    }

    fn ensure_indexes(&mut self) -> StorageResult<()> {
        self.conn.execute_batch(INDEX_SQL)?;
        Ok(())
    }

    // ===== Idempotency lookups =====

    fn existing_urls(&self, vendor: &str) -> StorageResult<HashSet<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT r.url FROM refs r JOIN vendors v ON v.id = r.vendor_id WHERE v.name = ?1",
        )?;
        let urls = stmt
            .query_map(params![vendor], |row| row.get::<_, String>(0))?
            .collect::<Result<HashSet<_>, _>>()?;
        Ok(urls)
    }

    fn unclassified_references(
        &self,
        vendor: &str,
        limit: usize,
    ) -> StorageResult<Vec<PendingReference>> {
        let mut stmt = self.conn.prepare(
            "SELECT r.id, r.url, r.raw_text FROM refs r
             JOIN vendors v ON v.id = r.vendor_id
             WHERE v.name = ?1 AND r.classified = 0
             ORDER BY r.seq
             LIMIT ?2",
        )?;
        let refs = stmt
            .query_map(params![vendor, limit as i64], |row| {
                Ok(PendingReference {
                    id: row.get(0)?,
                    url: row.get(1)?,
                    text: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(refs)
    }

    // ===== Writes =====

    fn load_raw_reference(
        &mut self,
        vendor: &str,
        record: &ScrapeRecord,
    ) -> StorageResult<Option<String>> {
        let tx = self.conn.transaction()?;

        // URL is the merge key across all vendors
        let existing: Option<String> = tx
            .query_row(
                "SELECT id FROM refs WHERE url = ?1 LIMIT 1",
                params![record.url],
                |row| row.get(0),
            )
            .optional()?;
        if existing.is_some() {
            return Ok(None);
        }

        let now = Utc::now().to_rfc3339();
        tx.execute(
            "INSERT OR IGNORE INTO vendors (name, created_at) VALUES (?1, ?2)",
            params![vendor, now],
        )?;
        // First known website wins
        tx.execute(
            "UPDATE vendors SET website = COALESCE(website, ?2) WHERE name = ?1",
            params![vendor, record.vendor_website],
        )?;
        let vendor_id: i64 = tx.query_row(
            "SELECT id FROM vendors WHERE name = ?1",
            params![vendor],
            |row| row.get(0),
        )?;

        let id = Uuid::new_v4().to_string();
        tx.execute(
            "INSERT INTO refs (id, url, vendor_id, customer_name, raw_text, word_count,
                               scraped_date, method, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                id,
                record.url,
                vendor_id,
                record.customer_name,
                record.raw_text,
                record.word_count as i64,
                record.scraped_date,
                record.method,
                now
            ],
        )?;
        tx.commit()?;

        Ok(Some(id))
    }

    fn update_classification(
        &mut self,
        reference_id: &str,
        classification: &Classification,
    ) -> StorageResult<()> {
        let tx = self.conn.transaction()?;

        if !reference_exists(&tx, reference_id)? {
            return Err(StorageError::ReferenceNotFound(reference_id.to_string()));
        }

        clear_edges(&tx, reference_id)?;

        tx.execute(
            "UPDATE refs SET classified = 1, classification_date = ?2, quoted_text = ?3
             WHERE id = ?1",
            params![
                reference_id,
                Utc::now().to_rfc3339(),
                non_empty(&classification.quoted_text)
            ],
        )?;

        // Fall back to the name inferred at scrape time
        let scraped_name: String = tx.query_row(
            "SELECT customer_name FROM refs WHERE id = ?1",
            params![reference_id],
            |row| row.get(0),
        )?;
        let customer_name = non_empty(&classification.customer_name)
            .map(str::to_string)
            .or_else(|| Some(scraped_name.trim().to_string()).filter(|n| !n.is_empty()));

        if let Some(name) = customer_name {
            tx.execute(
                "INSERT INTO customers (name, company_size, region, country)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(name) DO UPDATE SET
                     company_size = COALESCE(excluded.company_size, customers.company_size),
                     region = COALESCE(excluded.region, customers.region),
                     country = COALESCE(excluded.country, customers.country)",
                params![
                    name,
                    non_empty(&classification.company_size),
                    non_empty(&classification.region),
                    non_empty(&classification.country)
                ],
            )?;
            let customer_id: i64 = tx.query_row(
                "SELECT id FROM customers WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )?;
            tx.execute(
                "INSERT OR IGNORE INTO ref_customers (ref_id, customer_id) VALUES (?1, ?2)",
                params![reference_id, customer_id],
            )?;

            if let Some(industry) = non_empty(&classification.industry) {
                let industry_id = merge_named_node(&tx, "industries", industry)?;
                tx.execute(
                    "INSERT OR IGNORE INTO customer_industries (customer_id, industry_id)
                     VALUES (?1, ?2)",
                    params![customer_id, industry_id],
                )?;
            }
        }

        for use_case in classification.use_cases.iter().map(|u| u.trim()) {
            if use_case.is_empty() {
                continue;
            }
            let use_case_id = merge_named_node(&tx, "use_cases", use_case)?;
            tx.execute(
                "INSERT OR IGNORE INTO ref_use_cases (ref_id, use_case_id) VALUES (?1, ?2)",
                params![reference_id, use_case_id],
            )?;
        }

        for technology in classification.tech_stack.iter().map(|t| t.trim()) {
            if technology.is_empty() {
                continue;
            }
            let technology_id = merge_named_node(&tx, "technologies", technology)?;
            tx.execute(
                "INSERT OR IGNORE INTO ref_technologies (ref_id, technology_id) VALUES (?1, ?2)",
                params![reference_id, technology_id],
            )?;
        }

        for outcome in &classification.outcomes {
            if outcome.description.is_none() && outcome.metric.is_none() {
                continue;
            }
            tx.execute(
                "INSERT INTO outcomes (ref_id, kind, description, metric) VALUES (?1, ?2, ?3, ?4)",
                params![
                    reference_id,
                    non_empty(&outcome.kind),
                    non_empty(&outcome.description),
                    non_empty(&outcome.metric)
                ],
            )?;
        }

        for persona in &classification.personas {
            if persona.title.is_none() && persona.name.is_none() {
                continue;
            }
            tx.execute(
                "INSERT INTO personas (ref_id, title, name, seniority) VALUES (?1, ?2, ?3, ?4)",
                params![
                    reference_id,
                    non_empty(&persona.title),
                    non_empty(&persona.name),
                    non_empty(&persona.seniority)
                ],
            )?;
        }

        delete_orphan_customers(&tx)?;
        tx.commit()?;
        Ok(())
    }

    fn mark_unclassified(
        &mut self,
        vendor: Option<&str>,
        url_pattern: Option<&str>,
    ) -> StorageResult<Vec<String>> {
        let tx = self.conn.transaction()?;

        let ids = {
            let mut stmt = tx.prepare(
                "SELECT r.id FROM refs r JOIN vendors v ON v.id = r.vendor_id
                 WHERE (?1 IS NULL OR v.name = ?1)
                   AND (?2 IS NULL OR instr(r.url, ?2) > 0)
                 ORDER BY r.seq",
            )?;
            let ids = stmt
                .query_map(params![vendor, url_pattern], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            ids
        };

        for id in &ids {
            tx.execute(
                "UPDATE refs SET classified = 0, classification_date = NULL WHERE id = ?1",
                params![id],
            )?;
        }
        tx.commit()?;

        Ok(ids)
    }

    fn clear_classification(&mut self, reference_id: &str) -> StorageResult<()> {
        let tx = self.conn.transaction()?;
        if !reference_exists(&tx, reference_id)? {
            return Err(StorageError::ReferenceNotFound(reference_id.to_string()));
        }
        clear_edges(&tx, reference_id)?;
        tx.execute(
            "UPDATE refs SET quoted_text = NULL WHERE id = ?1",
            params![reference_id],
        )?;
        delete_orphan_customers(&tx)?;
        tx.commit()?;
        Ok(())
    }

    fn delete_reference(&mut self, reference_id: &str) -> StorageResult<()> {
        let tx = self.conn.transaction()?;
        if !reference_exists(&tx, reference_id)? {
            return Err(StorageError::ReferenceNotFound(reference_id.to_string()));
        }
        clear_edges(&tx, reference_id)?;
        tx.execute("DELETE FROM refs WHERE id = ?1", params![reference_id])?;
        delete_orphan_customers(&tx)?;
        tx.commit()?;
        Ok(())
    }

    // ===== Statistics =====

    fn count_references(&self, vendor: Option<&str>) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM refs r JOIN vendors v ON v.id = r.vendor_id
             WHERE (?1 IS NULL OR v.name = ?1)",
            params![vendor],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn count_classified(&self, vendor: Option<&str>) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM refs r JOIN vendors v ON v.id = r.vendor_id
             WHERE r.classified = 1 AND (?1 IS NULL OR v.name = ?1)",
            params![vendor],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn get_stats(&self) -> StorageResult<GraphStats> {
        let count = |sql: &str| -> StorageResult<u64> {
            let n: i64 = self.conn.query_row(sql, [], |row| row.get(0))?;
            Ok(n as u64)
        };

        Ok(GraphStats {
            total_references: count("SELECT COUNT(*) FROM refs")?,
            classified_references: count("SELECT COUNT(*) FROM refs WHERE classified = 1")?,
            total_vendors: count("SELECT COUNT(*) FROM vendors")?,
            total_customers: count("SELECT COUNT(*) FROM customers")?,
        })
    }

    fn duplicate_groups(&self) -> StorageResult<Vec<DuplicateGroup>> {
        let mut url_stmt = self
            .conn
            .prepare("SELECT url FROM refs GROUP BY url HAVING COUNT(*) > 1 ORDER BY url")?;
        let urls = url_stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        let mut node_stmt = self
            .conn
            .prepare("SELECT id, classified FROM refs WHERE url = ?1 ORDER BY seq")?;

        let mut groups = Vec::with_capacity(urls.len());
        for url in urls {
            let nodes = node_stmt
                .query_map(params![url], |row| {
                    Ok(DuplicateNode {
                        id: row.get(0)?,
                        classified: row.get::<_, i64>(1)? != 0,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            groups.push(DuplicateGroup { url, nodes });
        }

        Ok(groups)
    }

    fn close(self: Box<Self>) -> StorageResult<()> {
        let store = *self;
        store
            .conn
            .close()
            .map_err(|(_, e)| StorageError::Database(e.to_string()))
    }
}
