// 📦 Batch Upserter - dedup by composite key, then bulk insert
// One storage round-trip fetches every (NEQ, suffix) pair already persisted
// for the batch's NEQs; survivors get batch-local slug collision fixes and go
// in as a single transaction. A failed batch is abandoned whole — the run
// stays idempotent, so a rerun recovers its rows.

use rusqlite::Connection;
use std::collections::HashSet;

use crate::db::{self, BusinessRecord};
use crate::slug;

// ============================================================================
// OUTCOME
// ============================================================================

/// Counts returned by one batch flush.
#[derive(Debug, Default, Clone, Copy)]
pub struct BatchOutcome {
    /// Rows actually persisted
    pub inserted: usize,
    /// Rows dropped because their composite key (or slug) already existed
    pub skipped_existing: usize,
    /// Whole-batch storage failures (0 or 1 per flush; no partial retry)
    pub errored: usize,
}

// ============================================================================
// UPSERT
// ============================================================================

/// Flush one batch of normalized candidates.
///
/// 1. Fetch existing (NEQ, suffix) pairs for the batch's NEQs in one query.
/// 2. Drop candidates whose composite key is already present.
/// 3. Fix slug collisions *inside* the batch — two new rows can generate the
///    same base slug, and neither is persisted yet for the per-row query to
///    have caught it.
/// 4. Bulk-insert the remainder in one transaction.
///
/// A storage failure abandons the batch: zero inserted, one error, and the
/// caller carries on with the next batch.
pub fn upsert_batch(conn: &Connection, batch: &[BusinessRecord]) -> BatchOutcome {
    let mut outcome = BatchOutcome::default();
    if batch.is_empty() {
        return outcome;
    }

    let mut neqs: Vec<String> = batch.iter().map(|r| r.neq.clone()).collect();
    neqs.sort();
    neqs.dedup();

    let existing = match db::existing_establishments(conn, &neqs) {
        Ok(existing) => existing,
        Err(e) => {
            log::error!("Batch existence check failed, abandoning batch: {}", e);
            outcome.errored = 1;
            return outcome;
        }
    };

    // Filter pre-existing composite keys, then resolve in-batch slug clashes
    let mut taken_slugs: HashSet<String> = HashSet::new();
    let mut survivors: Vec<BusinessRecord> = Vec::with_capacity(batch.len());

    for record in batch.iter() {
        if existing.contains(&record.composite_key()) {
            outcome.skipped_existing += 1;
            continue;
        }

        let mut record = record.clone();
        let resolved =
            slug::resolve_against_set(&taken_slugs, &record.slug, record.city.as_deref());
        if resolved != record.slug {
            log::debug!("Batch-local slug collision: {} → {}", record.slug, resolved);
            record.slug = resolved;
        }
        taken_slugs.insert(record.slug.clone());
        survivors.push(record);
    }

    if survivors.is_empty() {
        return outcome;
    }

    match db::insert_businesses(conn, &survivors) {
        Ok(insert) => {
            outcome.inserted = insert.inserted;
            // Constraint violations at insert time are the race the pre-check
            // cannot close; same bucket as pre-existing keys.
            outcome.skipped_existing += insert.duplicates;
        }
        Err(e) => {
            log::error!(
                "Batch insert failed ({} rows abandoned): {}",
                survivors.len(),
                e
            );
            outcome.errored = 1;
        }
    }

    outcome
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::setup_database;

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
    fn test_pre_existing_keys_are_filtered() {
        let conn = test_conn();

        // 10 establishments already persisted
        let mut seed = Vec::new();
        for i in 0..10 {
            seed.push(record(&format!("00000000{:02}", i), "1", "Seed", &format!("seed-{}", i)));
        }
        db::insert_businesses(&conn, &seed).unwrap();

        // Batch of 150 candidates, 10 of which collide by composite key
        let mut batch = Vec::new();
        for i in 0..150 {
            batch.push(record(
                &format!("00000000{:02}", i),
                "1",
                "Candidate",
                &format!("candidate-{}", i),
            ));
        }

        let outcome = upsert_batch(&conn, &batch);
        assert_eq!(outcome.inserted, 140);
        assert_eq!(outcome.skipped_existing, 10);
        assert_eq!(outcome.errored, 0);
        assert_eq!(db::verify_count(&conn).unwrap(), 150);
    }

    #[test]
    fn test_batch_local_slug_collision_renamed() {
        let conn = test_conn();

        let mut r1 = record("1111111111", "1", "Dépanneur du Coin", "depanneur-du-coin");
        r1.city = Some("Laval".to_string());
        let mut r2 = record("2222222222", "1", "Dépanneur du Coin", "depanneur-du-coin");
        r2.city = Some("Montréal".to_string());

        let batch = vec![r1, r2];
        let outcome = upsert_batch(&conn, &batch);

        assert_eq!(outcome.inserted, 2);
        assert_eq!(outcome.skipped_existing, 0);

        assert!(db::get_business_by_slug(&conn, "depanneur-du-coin")
            .unwrap()
            .is_some());
        let renamed = db::get_business_by_slug(&conn, "depanneur-du-coin-montreal")
            .unwrap()
            .expect("second row should be city-suffixed");
        assert_eq!(renamed.neq, "2222222222");
    }

    #[test]
    fn test_duplicate_composite_key_inside_batch() {
        let conn = test_conn();

        // Same (NEQ, suffix) twice in one batch: the pre-check can't see it,
        // the unique index catches the second insert.
        let batch = vec![
            record("1111111111", "1", "A", "a"),
            record("1111111111", "1", "A bis", "a-bis"),
        ];

        let outcome = upsert_batch(&conn, &batch);
        assert_eq!(outcome.inserted, 1);
        assert_eq!(outcome.skipped_existing, 1);
        assert_eq!(db::verify_count(&conn).unwrap(), 1);
    }

    #[test]
    fn test_empty_batch_is_a_noop() {
        let conn = test_conn();
        let outcome = upsert_batch(&conn, &[]);
        assert_eq!(outcome.inserted, 0);
        assert_eq!(outcome.skipped_existing, 0);
        assert_eq!(outcome.errored, 0);
    }

    #[test]
    fn test_rerun_of_same_batch_inserts_nothing() {
        let conn = test_conn();

        let make_batch = || {
            vec![
                record("1111111111", "1", "A", "a"),
                record("2222222222", "1", "B", "b"),
            ]
        };

        let first = upsert_batch(&conn, &make_batch());
        assert_eq!(first.inserted, 2);

        let second = upsert_batch(&conn, &make_batch());
        assert_eq!(second.inserted, 0);
        assert_eq!(second.skipped_existing, 2);
        assert_eq!(db::verify_count(&conn).unwrap(), 2);
    }
}
