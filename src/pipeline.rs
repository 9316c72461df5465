// 🚚 Pipeline Driver - stream the REQ CSV into the directory
// STREAMING → (per row) NORMALIZE → LOOKUP → ACCUMULATE → [BATCH_FULL →
// FLUSH] → … → END_OF_STREAM → FINAL_FLUSH → REPORT.
// A failed batch is counted and the run continues: the composite-key dedup
// makes reruns over the same file safe, so partial completion is recoverable.

use anyhow::{Context, Result};
use rusqlite::Connection;
use std::path::Path;

use crate::batch::{self, BatchOutcome};
use crate::categories::CategoryResolver;
use crate::db::BusinessRecord;
use crate::normalizer::{self, NormalizeOutcome, RawEtablissement, SkipReason};
use crate::slug;

/// Rows accumulated before a flush.
pub const DEFAULT_BATCH_SIZE: usize = 100;

// ============================================================================
// OPTIONS
// ============================================================================

/// Run options, mapped one-to-one from the CLI flags.
#[derive(Debug, Clone)]
pub struct ImportOptions {
    /// Cap on rows read (after the offset)
    pub limit: Option<usize>,
    /// Rows to skip from the top of the file
    pub offset: usize,
    /// Parse and log without writing anything
    pub dry_run: bool,
    pub batch_size: usize,
}

impl Default for ImportOptions {
    fn default() -> Self {
        ImportOptions {
            limit: None,
            offset: 0,
            dry_run: false,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

// ============================================================================
// STATISTICS
// ============================================================================

/// Cumulative counters reported at end of run.
#[derive(Debug, Default, Clone)]
pub struct ImportStats {
    /// Rows read from the CSV (after offset, within limit)
    pub rows_read: usize,
    /// Rows the CSV reader could not deserialize
    pub rows_unparseable: usize,
    /// Filter skips, by reason
    pub skipped_missing_neq: usize,
    pub skipped_inactive: usize,
    pub skipped_shell: usize,
    /// Candidates that survived the filters
    pub candidates: usize,
    /// Candidates whose city resolved to a region
    pub regions_resolved: usize,
    /// Candidates carrying a classification code
    pub with_act_econ_code: usize,
    /// Rows persisted
    pub inserted: usize,
    /// Rows dropped as already present (composite key or slug)
    pub skipped_existing: usize,
    /// Whole-batch write failures
    pub batch_errors: usize,
}

impl ImportStats {
    fn absorb(&mut self, outcome: BatchOutcome) {
        self.inserted += outcome.inserted;
        self.skipped_existing += outcome.skipped_existing;
        self.batch_errors += outcome.errored;
    }

    pub fn skipped_filtered(&self) -> usize {
        self.skipped_missing_neq + self.skipped_inactive + self.skipped_shell
    }

    /// Print the end-of-run summary.
    pub fn report(&self, dry_run: bool) {
        println!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        if dry_run {
            println!("🔍 Import terminé (dry-run — aucune écriture)");
        } else {
            println!("✅ Import terminé");
        }
        println!("✓ Rows read:            {}", self.rows_read);
        println!("✓ Inserted:             {}", self.inserted);
        println!("✓ Skipped (existing):   {}", self.skipped_existing);
        println!(
            "✓ Skipped (filtered):   {} (no NEQ: {}, inactive: {}, shell: {})",
            self.skipped_filtered(),
            self.skipped_missing_neq,
            self.skipped_inactive,
            self.skipped_shell
        );
        println!("✓ Regions resolved:     {}/{}", self.regions_resolved, self.candidates);
        println!("✓ With ACT_ECON code:   {}/{}", self.with_act_econ_code, self.candidates);
        if self.rows_unparseable > 0 {
            println!("⚠ Unparseable rows:     {}", self.rows_unparseable);
        }
        if self.batch_errors > 0 {
            println!("⚠ Failed batches:       {} (rerun the import to recover)", self.batch_errors);
        }
    }
}

// ============================================================================
// DRIVER
// ============================================================================

/// Stream the REQ establishment CSV into the directory database.
///
/// Rows are processed in file order. Every `batch_size` surviving candidates
/// are flushed through the batch upserter; the final partial batch is always
/// flushed. A batch write failure is logged and counted, never fatal —
/// rerunning the same file is safe and picks up the abandoned rows.
///
/// Errors returned from here are setup errors only (unreadable input file);
/// they abort before any row is processed.
pub fn run_import(
    conn: &Connection,
    categories: &CategoryResolver,
    csv_path: &Path,
    options: &ImportOptions,
) -> Result<ImportStats> {
    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("Failed to open REQ CSV: {}", csv_path.display()))?;

    let mut stats = ImportStats::default();
    let mut current_batch: Vec<BusinessRecord> = Vec::with_capacity(options.batch_size);

    log::info!(
        "Starting REQ import from {} (offset {}, limit {:?}, batch size {})",
        csv_path.display(),
        options.offset,
        options.limit,
        options.batch_size
    );

    for (row_index, row) in reader.deserialize::<RawEtablissement>().enumerate() {
        if row_index < options.offset {
            continue;
        }
        if let Some(limit) = options.limit {
            if stats.rows_read >= limit {
                break;
            }
        }
        stats.rows_read += 1;

        let raw = match row {
            Ok(raw) => raw,
            Err(e) => {
                log::warn!("Row {}: unparseable, skipping: {}", row_index + 2, e);
                stats.rows_unparseable += 1;
                continue;
            }
        };

        let mut record = match normalizer::normalize(&raw, categories) {
            NormalizeOutcome::Record(record) => *record,
            NormalizeOutcome::Skip(reason) => {
                log::debug!("Row {}: skipped ({})", row_index + 2, reason.as_str());
                match reason {
                    SkipReason::MissingNeq => stats.skipped_missing_neq += 1,
                    SkipReason::Inactive => stats.skipped_inactive += 1,
                    SkipReason::ShellCompany => stats.skipped_shell += 1,
                }
                continue;
            }
        };

        stats.candidates += 1;
        if record.region.is_some() {
            stats.regions_resolved += 1;
        }
        if record.act_econ_code.is_some() {
            stats.with_act_econ_code += 1;
        }

        // Slug against live storage; batch-local collisions are handled at
        // flush time. In dry-run mode the base slug is enough for the log.
        record.slug = if options.dry_run {
            slug::slugify(&record.name)
        } else {
            slug::resolve_unique_slug(conn, &record.name, record.city.as_deref())
                .context("Slug resolution failed")?
        };

        if options.dry_run {
            log::info!(
                "[dry-run] {} / {} → slug {:?}, region {:?}, category {:?}",
                record.neq,
                record.name,
                record.slug,
                record.region,
                record.category
            );
            continue;
        }

        current_batch.push(record);
        if current_batch.len() >= options.batch_size {
            stats.absorb(batch::upsert_batch(conn, &current_batch));
            current_batch.clear();
        }
    }

    // FINAL_FLUSH: always runs, even for a short last batch
    if !current_batch.is_empty() {
        stats.absorb(batch::upsert_batch(conn, &current_batch));
        current_batch.clear();
    }

    Ok(stats)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{self, setup_database};
    use std::io::Write;

    const HEADER: &str =
        "NEQ,NO_SUF_ETAB,NOM_ETAB,LIGN1_ADR,LIGN2_ADR,LIGN3_ADR,LIGN4_ADR,COD_POSTAL,COD_ACT_ECON,DESC_ACT_ECON,IND_ETAB_PRINC,STAT_IMMAT";

    fn write_csv(rows: &[&str]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "{}", HEADER).unwrap();
        for row in rows {
            writeln!(file, "{}", row).unwrap();
        }
        file.flush().unwrap();
        file
    }

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        conn
    }

    #[test]
    fn test_small_import_end_to_end() {
        let conn = test_conn();
        let categories = CategoryResolver::new();
        let csv = write_csv(&[
            "1234567890,1,Dépanneur Laval,100 rue Principale,Laval (Québec),H7N 2K9,,,4520,Dépanneur,O,IMMATRICULÉE",
            "2345678901,1,9123-4567 QUÉBEC INC.,1 rue X,Montréal (Québec),,,,,,N,IMMATRICULÉE",
            "3456789012,1,Garage Untel,5 rue Y,Ville-Inconnue (Québec),,,,,,N,IMMATRICULÉE",
        ]);

        let stats =
            run_import(&conn, &categories, csv.path(), &ImportOptions::default()).unwrap();

        assert_eq!(stats.rows_read, 3);
        assert_eq!(stats.inserted, 2);
        assert_eq!(stats.skipped_shell, 1);
        assert_eq!(stats.regions_resolved, 1);
        assert_eq!(stats.with_act_econ_code, 1);

        let business = db::get_business(&conn, "1234567890", "1").unwrap();
        assert_eq!(business.slug, "depanneur-laval");
        assert_eq!(business.city.as_deref(), Some("Laval"));
        assert_eq!(business.region.as_deref(), Some("Laval"));

        // Unmapped city still inserted, region null
        let business = db::get_business(&conn, "3456789012", "1").unwrap();
        assert!(business.region.is_none());
    }

    #[test]
    fn test_rerun_is_idempotent() {
        let conn = test_conn();
        let categories = CategoryResolver::new();
        let csv = write_csv(&[
            "1234567890,1,Dépanneur Laval,100 rue Principale,Laval (Québec),,,,4520,,O,IMMATRICULÉE",
            "1234567890,2,Dépanneur Laval,200 autre rue,Laval (Québec),,,,4520,,N,IMMATRICULÉE",
        ]);

        let first = run_import(&conn, &categories, csv.path(), &ImportOptions::default()).unwrap();
        assert_eq!(first.inserted, 2);

        let second = run_import(&conn, &categories, csv.path(), &ImportOptions::default()).unwrap();
        assert_eq!(second.inserted, 0);
        assert_eq!(second.skipped_existing, 2);
        assert_eq!(db::verify_count(&conn).unwrap(), 2);
    }

    #[test]
    fn test_limit_and_offset() {
        let conn = test_conn();
        let categories = CategoryResolver::new();
        let csv = write_csv(&[
            "1000000001,1,Un,1 rue A,Laval (Québec),,,,,,N,IMMATRICULÉE",
            "1000000002,1,Deux,2 rue B,Laval (Québec),,,,,,N,IMMATRICULÉE",
            "1000000003,1,Trois,3 rue C,Laval (Québec),,,,,,N,IMMATRICULÉE",
            "1000000004,1,Quatre,4 rue D,Laval (Québec),,,,,,N,IMMATRICULÉE",
        ]);

        let options = ImportOptions {
            offset: 1,
            limit: Some(2),
            ..Default::default()
        };
        let stats = run_import(&conn, &categories, csv.path(), &options).unwrap();

        assert_eq!(stats.rows_read, 2);
        assert_eq!(stats.inserted, 2);
        assert!(db::get_business(&conn, "1000000002", "1").is_ok());
        assert!(db::get_business(&conn, "1000000003", "1").is_ok());
        assert!(db::get_business(&conn, "1000000001", "1").is_err());
    }

    #[test]
    fn test_dry_run_writes_nothing() {
        let conn = test_conn();
        let categories = CategoryResolver::new();
        let csv = write_csv(&[
            "1234567890,1,Dépanneur Laval,100 rue Principale,Laval (Québec),,,,4520,,O,IMMATRICULÉE",
        ]);

        let options = ImportOptions {
            dry_run: true,
            ..Default::default()
        };
        let stats = run_import(&conn, &categories, csv.path(), &options).unwrap();

        assert_eq!(stats.rows_read, 1);
        assert_eq!(stats.candidates, 1);
        assert_eq!(stats.inserted, 0);
        assert_eq!(db::verify_count(&conn).unwrap(), 0);
    }

    #[test]
    fn test_final_flush_handles_short_batch() {
        let conn = test_conn();
        let categories = CategoryResolver::new();
        let csv = write_csv(&[
            "1000000001,1,Un,1 rue A,Laval (Québec),,,,,,N,IMMATRICULÉE",
            "1000000002,1,Deux,2 rue B,Laval (Québec),,,,,,N,IMMATRICULÉE",
            "1000000003,1,Trois,3 rue C,Laval (Québec),,,,,,N,IMMATRICULÉE",
        ]);

        // Batch size 2: one full flush + one final flush of a single row
        let options = ImportOptions {
            batch_size: 2,
            ..Default::default()
        };
        let stats = run_import(&conn, &categories, csv.path(), &options).unwrap();
        assert_eq!(stats.inserted, 3);
        assert_eq!(db::verify_count(&conn).unwrap(), 3);
    }

    #[test]
    fn test_missing_file_is_a_setup_error() {
        let conn = test_conn();
        let categories = CategoryResolver::new();
        let result = run_import(
            &conn,
            &categories,
            Path::new("/nonexistent/etablissements.csv"),
            &ImportOptions::default(),
        );
        assert!(result.is_err());
    }
}
