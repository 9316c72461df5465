// Annuaire Québec - Core Library
// REQ establishment CSV → normalized, deduplicated business directory (SQLite)

pub mod batch;
pub mod categories;
pub mod db;
pub mod normalizer;
pub mod pipeline;
pub mod regions;
pub mod slug;

// Re-export commonly used types
pub use batch::{upsert_batch, BatchOutcome};
pub use categories::{CategoryMapping, CategoryMatch, CategoryResolver};
pub use db::{
    get_business, get_business_by_slug, get_region_stats, get_source_stats, insert_businesses,
    open_database, setup_database, verify_count, BusinessRecord, DbError, InsertOutcome,
    RegionStat, SourceStat,
};
pub use normalizer::{normalize, NormalizeOutcome, RawEtablissement, SkipReason};
pub use pipeline::{run_import, ImportOptions, ImportStats, DEFAULT_BATCH_SIZE};
pub use regions::{lookup_city, CityLocation};
pub use slug::{resolve_unique_slug, slugify};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
