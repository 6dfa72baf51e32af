//! Database schema definitions
//!
//! This module contains the SQL schema of the graph store. Nodes are tables
//! with a text or integer key; edges are join tables.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Vendor nodes
CREATE TABLE IF NOT EXISTS vendors (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    website TEXT,
    created_at TEXT NOT NULL
);

-- Reference nodes; url is checked on merge rather than constrained, so
-- duplicates left by older loaders can still be found and cleaned up
CREATE TABLE IF NOT EXISTS refs (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    id TEXT NOT NULL UNIQUE,
    url TEXT NOT NULL,
    vendor_id INTEGER NOT NULL REFERENCES vendors(id),
    customer_name TEXT NOT NULL,
    raw_text TEXT NOT NULL,
    word_count INTEGER NOT NULL,
    scraped_date TEXT NOT NULL,
    method TEXT NOT NULL,
    created_at TEXT NOT NULL,
    classified INTEGER NOT NULL DEFAULT 0,
    classification_date TEXT,
    quoted_text TEXT
);

-- Customer nodes
CREATE TABLE IF NOT EXISTS customers (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    company_size TEXT,
    region TEXT,
    country TEXT
);

-- Reference FEATURES Customer
CREATE TABLE IF NOT EXISTS ref_customers (
    ref_id TEXT NOT NULL REFERENCES refs(id) ON DELETE CASCADE,
    customer_id INTEGER NOT NULL REFERENCES customers(id) ON DELETE CASCADE,
    UNIQUE(ref_id, customer_id)
);

-- Industry nodes and Customer IN_INDUSTRY Industry
CREATE TABLE IF NOT EXISTS industries (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS customer_industries (
    customer_id INTEGER NOT NULL REFERENCES customers(id) ON DELETE CASCADE,
    industry_id INTEGER NOT NULL REFERENCES industries(id),
    UNIQUE(customer_id, industry_id)
);

-- UseCase nodes and Reference ADDRESSES UseCase
CREATE TABLE IF NOT EXISTS use_cases (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS ref_use_cases (
    ref_id TEXT NOT NULL REFERENCES refs(id) ON DELETE CASCADE,
    use_case_id INTEGER NOT NULL REFERENCES use_cases(id),
    UNIQUE(ref_id, use_case_id)
);

-- Technology nodes and Reference MENTIONS Technology
CREATE TABLE IF NOT EXISTS technologies (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS ref_technologies (
    ref_id TEXT NOT NULL REFERENCES refs(id) ON DELETE CASCADE,
    technology_id INTEGER NOT NULL REFERENCES technologies(id),
    UNIQUE(ref_id, technology_id)
);

-- Outcome and Persona nodes hang off a single reference
CREATE TABLE IF NOT EXISTS outcomes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    ref_id TEXT NOT NULL REFERENCES refs(id) ON DELETE CASCADE,
    kind TEXT,
    description TEXT,
    metric TEXT
);

CREATE TABLE IF NOT EXISTS personas (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    ref_id TEXT NOT NULL REFERENCES refs(id) ON DELETE CASCADE,
    title TEXT,
    name TEXT,
    seniority TEXT
);
"#;

/// Indexes for the pipeline's lookups
pub const INDEX_SQL: &str = r#"
CREATE INDEX IF NOT EXISTS idx_refs_url ON refs(url);
CREATE INDEX IF NOT EXISTS idx_refs_vendor ON refs(vendor_id);
CREATE INDEX IF NOT EXISTS idx_refs_classified ON refs(vendor_id, classified);
CREATE INDEX IF NOT EXISTS idx_outcomes_ref ON outcomes(ref_id);
CREATE INDEX IF NOT EXISTS idx_personas_ref ON personas(ref_id);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
