// 🏢 Annuaire Québec - REQ import CLI
// `annuaire import` streams the government establishment CSV into the
// directory database; `annuaire stats` summarizes what's in there.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use annuaire_quebec::categories::CategoryResolver;
use annuaire_quebec::db;
use annuaire_quebec::pipeline::{self, ImportOptions, DEFAULT_BATCH_SIZE};
use annuaire_quebec::regions;

#[derive(Parser)]
#[command(name = "annuaire", version, about = "Annuaire d'entreprises du Québec - import REQ")]
struct Cli {
    /// Directory database path
    #[arg(long, default_value = "annuaire.db", global = true)]
    db: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Import an REQ establishment CSV (Etablissements.csv)
    Import {
        /// Path to the CSV file
        file: PathBuf,

        /// Stop after this many rows
        #[arg(long)]
        limit: Option<usize>,

        /// Skip this many rows before processing
        #[arg(long, default_value_t = 0)]
        offset: usize,

        /// Parse and report without writing to the database
        #[arg(long)]
        dry_run: bool,

        /// Rows per write batch
        #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
        batch_size: usize,

        /// JSON file overriding the built-in ACT_ECON category mappings
        #[arg(long)]
        categories: Option<PathBuf>,
    },

    /// Show directory statistics (regions, sources, claims)
    Stats,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Command::Import {
            file,
            limit,
            offset,
            dry_run,
            batch_size,
            categories,
        } => run_import(&cli.db, &file, limit, offset, dry_run, batch_size, categories),
        Command::Stats => run_stats(&cli.db),
    }
}

#[allow(clippy::too_many_arguments)]
fn run_import(
    db_path: &PathBuf,
    csv_path: &PathBuf,
    limit: Option<usize>,
    offset: usize,
    dry_run: bool,
    batch_size: usize,
    categories_path: Option<PathBuf>,
) -> Result<()> {
    println!("🏢 Annuaire Québec - Import REQ");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    // Setup errors abort before any row is touched
    if !csv_path.exists() {
        bail!("Input file not found: {}", csv_path.display());
    }
    if batch_size == 0 {
        bail!("--batch-size must be at least 1");
    }

    let categories = match categories_path {
        Some(path) => CategoryResolver::from_file(&path)
            .with_context(|| format!("Failed to load category mappings: {}", path.display()))?,
        None => CategoryResolver::new(),
    };
    println!("✓ Category mappings: {} prefixes", categories.prefix_count());
    println!("✓ Region table: {} cities", regions::city_count());

    println!("\n🔧 Setting up database...");
    let conn = db::open_database(db_path)
        .with_context(|| format!("Failed to open database: {}", db_path.display()))?;
    println!("✓ Database ready: {}", db_path.display());

    println!("\n📂 Importing {}...", csv_path.display());
    let options = ImportOptions {
        limit,
        offset,
        dry_run,
        batch_size,
    };
    let stats = pipeline::run_import(&conn, &categories, csv_path, &options)?;

    stats.report(dry_run);

    if !dry_run {
        let total = db::verify_count(&conn)?;
        println!("✓ Directory now holds {} businesses", total);
    }

    Ok(())
}

fn run_stats(db_path: &PathBuf) -> Result<()> {
    if !db_path.exists() {
        bail!(
            "Database not found: {} (run `annuaire import` first)",
            db_path.display()
        );
    }

    let conn = db::open_database(db_path)
        .with_context(|| format!("Failed to open database: {}", db_path.display()))?;

    println!("📊 Annuaire Québec - Statistiques");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let total = db::verify_count(&conn)?;
    println!("✓ Total businesses: {}", total);

    println!("\n🗺️  Par région:");
    for stat in db::get_region_stats(&conn)? {
        println!("  {:<30} {}", stat.region, stat.business_count);
    }

    println!("\n📦 Par source:");
    for stat in db::get_source_stats(&conn)? {
        println!(
            "  {:<10} {} businesses ({} claimed, {} categorized)",
            stat.data_source, stat.business_count, stat.claimed_count, stat.with_category
        );
    }

    Ok(())
}
