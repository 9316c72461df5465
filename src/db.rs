// 🗄️ Business Directory Storage - SQLite + WAL
// BusinessRecord model, schema with the two uniqueness guarantees pushed down
// to the storage layer (composite key + slug), and the queries the import
// pipeline needs: existing-key fetch, slug probe, bulk insert, stats.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Business not found: NEQ {neq} establishment {etab_suffix}")]
    NotFound { neq: String, etab_suffix: String },
}

// ============================================================================
// BUSINESS RECORD
// ============================================================================

/// One legal establishment in the directory.
///
/// Identity: `id` (UUID, never changes once persisted).
/// Natural dedup key: `(neq, etab_suffix)` — one NEQ can register several
/// physical establishments, each with its own suffix.
/// `slug` is the SEO-facing identifier, globally unique across data sources.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusinessRecord {
    /// Stable identity (UUID)
    pub id: String,

    /// Quebec enterprise registry number (government-issued)
    pub neq: String,

    /// Establishment sequence number under this NEQ
    pub etab_suffix: String,

    /// Legal or establishment name
    pub name: String,

    /// Street address (first address line)
    pub address: Option<String>,

    /// City extracted from the address lines
    pub city: Option<String>,

    /// Administrative region (null when the city is unmapped)
    pub region: Option<String>,

    /// MRC / county-equivalent (null when the city is unmapped)
    pub mrc: Option<String>,

    /// Canadian postal code (A1A 1A1)
    pub postal_code: Option<String>,

    /// Economic-activity classification code from the registry
    pub act_econ_code: Option<String>,

    /// Free-text description of the activity code
    pub act_econ_desc: Option<String>,

    /// Whether this is the principal establishment of the enterprise
    pub is_principal: bool,

    /// Resolved directory category (null when the code is unmapped)
    pub category: Option<String>,
    pub sub_category: Option<String>,
    pub category_confidence: f64,

    /// Globally unique URL slug
    pub slug: String,

    /// Where the record came from ("req" for this importer)
    pub data_source: String,

    /// Claim state: owning user, null until a business owner claims it
    pub owner_id: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BusinessRecord {
    /// Create a fresh record with identity and timestamps initialized.
    pub fn new(neq: String, etab_suffix: String, name: String) -> Self {
        let now = Utc::now();
        BusinessRecord {
            id: uuid::Uuid::new_v4().to_string(),
            neq,
            etab_suffix,
            name,
            address: None,
            city: None,
            region: None,
            mrc: None,
            postal_code: None,
            act_econ_code: None,
            act_econ_desc: None,
            is_principal: false,
            category: None,
            sub_category: None,
            category_confidence: 0.0,
            slug: String::new(),
            data_source: "req".to_string(),
            owner_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// The natural dedup key.
    pub fn composite_key(&self) -> (String, String) {
        (self.neq.clone(), self.etab_suffix.clone())
    }
}

// ============================================================================
// SCHEMA
// ============================================================================

/// Open the directory database, creating it if needed.
pub fn open_database(path: &Path) -> Result<Connection, DbError> {
    let conn = Connection::open(path)?;
    setup_database(&conn)?;
    Ok(conn)
}

pub fn setup_database(conn: &Connection) -> Result<(), DbError> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS businesses (
            rowid_pk INTEGER PRIMARY KEY AUTOINCREMENT,
            id TEXT UNIQUE NOT NULL,
            neq TEXT NOT NULL,
            etab_suffix TEXT NOT NULL,
            name TEXT NOT NULL,
            address TEXT,
            city TEXT,
            region TEXT,
            mrc TEXT,
            postal_code TEXT,
            act_econ_code TEXT,
            act_econ_desc TEXT,
            is_principal INTEGER NOT NULL DEFAULT 0,
            category TEXT,
            sub_category TEXT,
            category_confidence REAL NOT NULL DEFAULT 0.0,
            slug TEXT NOT NULL,
            data_source TEXT NOT NULL,
            owner_id TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        [],
    )?;

    // The two uniqueness invariants live in the storage layer, so a lost
    // check-then-insert race surfaces as a constraint violation the batch
    // upserter already treats as a duplicate.
    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_businesses_neq_etab
         ON businesses(neq, etab_suffix)",
        [],
    )?;

    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_businesses_slug ON businesses(slug)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_businesses_region ON businesses(region)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_businesses_city ON businesses(city)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_businesses_source ON businesses(data_source)",
        [],
    )?;

    Ok(())
}

// ============================================================================
// QUERIES
// ============================================================================

/// Check whether a slug is already taken.
pub fn slug_exists(conn: &Connection, slug: &str) -> Result<bool, DbError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM businesses WHERE slug = ?1",
        params![slug],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Fetch the (NEQ, establishment suffix) pairs already persisted for a set
/// of NEQs, in one query. The batch upserter filters its candidates against
/// this set instead of probing row by row.
pub fn existing_establishments(
    conn: &Connection,
    neqs: &[String],
) -> Result<HashSet<(String, String)>, DbError> {
    let mut existing = HashSet::new();
    if neqs.is_empty() {
        return Ok(existing);
    }

    // SQLite caps bound parameters; chunk oversized batches.
    for chunk in neqs.chunks(500) {
        let placeholders = vec!["?"; chunk.len()].join(", ");
        let sql = format!(
            "SELECT neq, etab_suffix FROM businesses WHERE neq IN ({})",
            placeholders
        );

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(chunk.iter()), |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        for row in rows {
            existing.insert(row?);
        }
    }

    Ok(existing)
}

/// Outcome of a bulk insert.
#[derive(Debug, Default, Clone, Copy)]
pub struct InsertOutcome {
    pub inserted: usize,
    /// Rows rejected by a unique constraint (composite key or slug) — an
    /// expected outcome under concurrent runs, not an error.
    pub duplicates: usize,
}

/// Bulk-insert records inside one transaction.
///
/// Constraint violations are counted as duplicates and do not abort the
/// transaction; any other storage error rolls the whole batch back.
pub fn insert_businesses(
    conn: &Connection,
    records: &[BusinessRecord],
) -> Result<InsertOutcome, DbError> {
    let mut outcome = InsertOutcome::default();

    let tx = conn.unchecked_transaction()?;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO businesses (
                id, neq, etab_suffix, name, address, city, region, mrc,
                postal_code, act_econ_code, act_econ_desc, is_principal,
                category, sub_category, category_confidence, slug,
                data_source, owner_id, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20)",
        )?;

        for record in records {
            let result = stmt.execute(params![
                record.id,
                record.neq,
                record.etab_suffix,
                record.name,
                record.address,
                record.city,
                record.region,
                record.mrc,
                record.postal_code,
                record.act_econ_code,
                record.act_econ_desc,
                record.is_principal as i64,
                record.category,
                record.sub_category,
                record.category_confidence,
                record.slug,
                record.data_source,
                record.owner_id,
                record.created_at.to_rfc3339(),
                record.updated_at.to_rfc3339(),
            ]);

            match result {
                Ok(_) => outcome.inserted += 1,
                Err(rusqlite::Error::SqliteFailure(err, _))
                    if err.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    outcome.duplicates += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
    tx.commit()?;

    Ok(outcome)
}

/// Fetch one business by its composite key.
pub fn get_business(
    conn: &Connection,
    neq: &str,
    etab_suffix: &str,
) -> Result<BusinessRecord, DbError> {
    let mut stmt = conn.prepare(
        "SELECT id, neq, etab_suffix, name, address, city, region, mrc,
                postal_code, act_econ_code, act_econ_desc, is_principal,
                category, sub_category, category_confidence, slug,
                data_source, owner_id, created_at, updated_at
         FROM businesses WHERE neq = ?1 AND etab_suffix = ?2",
    )?;

    let mut rows = stmt.query_map(params![neq, etab_suffix], row_to_business)?;

    match rows.next() {
        Some(row) => Ok(row?),
        None => Err(DbError::NotFound {
            neq: neq.to_string(),
            etab_suffix: etab_suffix.to_string(),
        }),
    }
}

/// Fetch one business by slug.
pub fn get_business_by_slug(
    conn: &Connection,
    slug: &str,
) -> Result<Option<BusinessRecord>, DbError> {
    let mut stmt = conn.prepare(
        "SELECT id, neq, etab_suffix, name, address, city, region, mrc,
                postal_code, act_econ_code, act_econ_desc, is_principal,
                category, sub_category, category_confidence, slug,
                data_source, owner_id, created_at, updated_at
         FROM businesses WHERE slug = ?1",
    )?;

    let mut rows = stmt.query_map(params![slug], row_to_business)?;

    match rows.next() {
        Some(row) => Ok(Some(row?)),
        None => Ok(None),
    }
}

fn row_to_business(row: &rusqlite::Row) -> rusqlite::Result<BusinessRecord> {
    let created_at: String = row.get(18)?;
    let updated_at: String = row.get(19)?;

    Ok(BusinessRecord {
        id: row.get(0)?,
        neq: row.get(1)?,
        etab_suffix: row.get(2)?,
        name: row.get(3)?,
        address: row.get(4)?,
        city: row.get(5)?,
        region: row.get(6)?,
        mrc: row.get(7)?,
        postal_code: row.get(8)?,
        act_econ_code: row.get(9)?,
        act_econ_desc: row.get(10)?,
        is_principal: row.get::<_, i64>(11)? != 0,
        category: row.get(12)?,
        sub_category: row.get(13)?,
        category_confidence: row.get(14)?,
        slug: row.get(15)?,
        data_source: row.get(16)?,
        owner_id: row.get(17)?,
        created_at: parse_timestamp(&created_at),
        updated_at: parse_timestamp(&updated_at),
    })
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

pub fn verify_count(conn: &Connection) -> Result<i64, DbError> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM businesses", [], |row| row.get(0))?;
    Ok(count)
}

// ============================================================================
// STATS QUERIES (stats subcommand)
// ============================================================================

/// Businesses per administrative region.
#[derive(Debug, Clone)]
pub struct RegionStat {
    pub region: String,
    pub business_count: i64,
}

pub fn get_region_stats(conn: &Connection) -> Result<Vec<RegionStat>, DbError> {
    let mut stmt = conn.prepare(
        "SELECT COALESCE(region, '(non résolue)') AS region, COUNT(*) AS count
         FROM businesses
         GROUP BY region
         ORDER BY count DESC",
    )?;

    let stats = stmt
        .query_map([], |row| {
            Ok(RegionStat {
                region: row.get(0)?,
                business_count: row.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(stats)
}

/// Businesses per data source, with claim counts.
#[derive(Debug, Clone)]
pub struct SourceStat {
    pub data_source: String,
    pub business_count: i64,
    pub claimed_count: i64,
    pub with_category: i64,
}

pub fn get_source_stats(conn: &Connection) -> Result<Vec<SourceStat>, DbError> {
    let mut stmt = conn.prepare(
        "SELECT
            data_source,
            COUNT(*) AS count,
            SUM(CASE WHEN owner_id IS NOT NULL THEN 1 ELSE 0 END) AS claimed,
            SUM(CASE WHEN category IS NOT NULL THEN 1 ELSE 0 END) AS with_category
         FROM businesses
         GROUP BY data_source
         ORDER BY count DESC",
    )?;

    let stats = stmt
        .query_map([], |row| {
            Ok(SourceStat {
                data_source: row.get(0)?,
                business_count: row.get(1)?,
                claimed_count: row.get(2)?,
                with_category: row.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(stats)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn record(neq: &str, suffix: &str, name: &str, slug: &str) -> BusinessRecord {
        let mut r = BusinessRecord::new(neq.to_string(), suffix.to_string(), name.to_string());
        r.slug = slug.to_string();
        r
    }

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        conn
    }

    #[test]
    fn test_insert_and_fetch() {
        let conn = test_conn();

        let mut r = record("1234567890", "1", "Dépanneur Laval", "depanneur-laval");
        r.city = Some("Laval".to_string());
        r.region = Some("Laval".to_string());
        r.act_econ_code = Some("4520".to_string());
        r.is_principal = true;

        let outcome = insert_businesses(&conn, &[r]).unwrap();
        assert_eq!(outcome.inserted, 1);
        assert_eq!(outcome.duplicates, 0);

        let fetched = get_business(&conn, "1234567890", "1").unwrap();
        assert_eq!(fetched.name, "Dépanneur Laval");
        assert_eq!(fetched.region.as_deref(), Some("Laval"));
        assert!(fetched.is_principal);
        assert!(fetched.owner_id.is_none());
    }

    #[test]
    fn test_composite_key_constraint_counts_duplicate() {
        let conn = test_conn();

        let r1 = record("1111111111", "1", "Garage A", "garage-a");
        let r2 = record("1111111111", "1", "Garage A encore", "garage-a-encore");

        let outcome = insert_businesses(&conn, &[r1, r2]).unwrap();
        assert_eq!(outcome.inserted, 1);
        assert_eq!(outcome.duplicates, 1);
        assert_eq!(verify_count(&conn).unwrap(), 1);
    }

    #[test]
    fn test_slug_constraint_counts_duplicate() {
        let conn = test_conn();

        let r1 = record("1111111111", "1", "Café", "cafe");
        let r2 = record("2222222222", "1", "Café aussi", "cafe");

        let outcome = insert_businesses(&conn, &[r1, r2]).unwrap();
        assert_eq!(outcome.inserted, 1);
        assert_eq!(outcome.duplicates, 1);
    }

    #[test]
    fn test_existing_establishments_one_query() {
        let conn = test_conn();

        insert_businesses(
            &conn,
            &[
                record("1111111111", "1", "A", "a"),
                record("1111111111", "2", "B", "b"),
                record("3333333333", "1", "C", "c"),
            ],
        )
        .unwrap();

        let neqs = vec!["1111111111".to_string(), "9999999999".to_string()];
        let existing = existing_establishments(&conn, &neqs).unwrap();

        assert_eq!(existing.len(), 2);
        assert!(existing.contains(&("1111111111".to_string(), "1".to_string())));
        assert!(existing.contains(&("1111111111".to_string(), "2".to_string())));

        assert!(existing_establishments(&conn, &[]).unwrap().is_empty());
    }

    #[test]
    fn test_get_business_not_found() {
        let conn = test_conn();
        let err = get_business(&conn, "0000000000", "1").unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }

    #[test]
    fn test_stats_queries() {
        let conn = test_conn();

        let mut r1 = record("1111111111", "1", "A", "a");
        r1.region = Some("Laval".to_string());
        r1.category = Some("alimentation".to_string());
        let mut r2 = record("2222222222", "1", "B", "b");
        r2.region = Some("Laval".to_string());
        r2.owner_id = Some("user-42".to_string());
        let r3 = record("3333333333", "1", "C", "c");

        insert_businesses(&conn, &[r1, r2, r3]).unwrap();

        let regions = get_region_stats(&conn).unwrap();
        assert_eq!(regions[0].region, "Laval");
        assert_eq!(regions[0].business_count, 2);

        let sources = get_source_stats(&conn).unwrap();
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].data_source, "req");
        assert_eq!(sources[0].business_count, 3);
        assert_eq!(sources[0].claimed_count, 1);
        assert_eq!(sources[0].with_category, 1);
    }
}
