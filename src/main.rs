//! # Tabcat CLI (`tabcat`)
//!
//! The `tabcat` binary is the primary interface for the catalog engine. It
//! provides commands for database initialization, file ingestion, search,
//! document retrieval, filter discovery, and deletion.
//!
//! ## Usage
//!
//! ```bash
//! tabcat --config ./config/tabcat.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `tabcat init` | Create the SQLite database and run schema migrations |
//! | `tabcat ingest <file>` | Ingest a CSV/TSV/XLSX catalog file |
//! | `tabcat search "<keyword>"` | Relevance-ranked keyword search |
//! | `tabcat get <id>` | Retrieve a full document by UUID |
//! | `tabcat filters` | List distinct attribute keys and their values |
//! | `tabcat values <key>` | List distinct values for one attribute key |
//! | `tabcat delete <id>...` | Soft delete documents (`--hard` to purge) |
//!
//! ## Examples
//!
//! ```bash
//! # Initialize the database
//! tabcat init --config ./config/tabcat.toml
//!
//! # Ingest a supplier spreadsheet
//! tabcat ingest suppliers/acme.xlsx --uploaded-by maria
//!
//! # Ranked keyword search
//! tabcat search "25mm copper pipe"
//!
//! # Attribute filters: exact, contains, range, in-list
//! tabcat search --filter "material=Copper"
//! tabcat search --filter "material~copp"
//! tabcat search --filter "size_millimeter=20..30"
//! tabcat search --filter "category=Fittings|Valves"
//!
//! # Discover what is filterable
//! tabcat filters
//! tabcat values material
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use tabcat::config;
use tabcat::db;
use tabcat::error::CatalogError;
use tabcat::ingest::IngestionPipeline;
use tabcat::migrate;
use tabcat::search::{FilterKind, FilterSpec, SearchEngine, SearchRequest};
use tabcat::store::sqlite::SqliteStore;
use tabcat::store::CatalogStore;

/// Tabcat CLI — schema-less catalog ingestion and relevance-ranked search
/// over tabular files.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file and a `--tenant` flag scoping the operation to one tenant.
#[derive(Parser)]
#[command(
    name = "tabcat",
    about = "Tabcat — schema-less catalog ingestion and relevance-ranked search",
    version,
    long_about = "Tabcat ingests whatever spreadsheet or delimited file a supplier provides, \
    canonicalizes its headers, detects the type of every cell, and stores each row as a \
    self-describing document searchable by keyword and attribute filters."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/tabcat.toml")]
    config: PathBuf,

    /// Tenant scope for every data operation.
    #[arg(long, global = true, default_value = "default")]
    tenant: String,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and the catalog tables. Idempotent;
    /// running it multiple times is safe.
    Init,

    /// Ingest a tabular catalog file.
    ///
    /// Accepts `.csv`, `.tsv`, and `.xlsx`. The first row is treated as the
    /// header row; every following non-blank row becomes one document.
    Ingest {
        /// Path to the catalog file.
        file: PathBuf,

        /// Recorded as the uploader on every created document.
        #[arg(long, default_value = "cli")]
        uploaded_by: String,
    },

    /// Search the catalog.
    ///
    /// With a keyword, results are relevance-ranked. Without one, results
    /// are sorted by the requested field (creation time descending by
    /// default). Filters always narrow the result set.
    Search {
        /// Keyword to rank by. Omit for a pure filter listing.
        keyword: Option<String>,

        /// Restrict to one category (exact match).
        #[arg(long)]
        category: Option<String>,

        /// Attribute filter, repeatable. Syntax: `key=value` (exact),
        /// `key~value` (contains), `key=min..max` (numeric range, either
        /// bound optional), `key=a|b|c` (in-list).
        #[arg(long = "filter")]
        filters: Vec<String>,

        /// Zero-based page number.
        #[arg(long, default_value_t = 0)]
        page: u64,

        /// Page size. Defaults to the configured page size.
        #[arg(long)]
        size: Option<u64>,

        /// Sort field for non-keyword search: `created_at`, `display_name`,
        /// or `business_id`.
        #[arg(long)]
        sort_by: Option<String>,

        /// Sort direction: `asc` or `desc`.
        #[arg(long)]
        sort_direction: Option<String>,

        /// Emit the full result page as JSON instead of a listing.
        #[arg(long)]
        json: bool,
    },

    /// Retrieve a document by its UUID.
    ///
    /// Prints the document as JSON, including attributes, detected types,
    /// and source provenance.
    Get {
        /// Document UUID.
        id: String,
    },

    /// List distinct attribute keys with their observed values.
    ///
    /// Useful for discovering what `--filter` can target after ingesting
    /// files with unknown schemas.
    Filters,

    /// List distinct values for one attribute key.
    Values {
        /// Canonical attribute key (e.g. `size_millimeter`).
        key: String,
    },

    /// Delete documents.
    ///
    /// Soft delete by default: documents disappear from search and reads
    /// but the records remain. `--hard` removes them permanently.
    Delete {
        /// Document UUIDs.
        ids: Vec<String>,

        /// Remove the records permanently instead of flagging them.
        #[arg(long)]
        hard: bool,
    },
}

/// Parse one `--filter` argument into its attribute key and spec.
fn parse_filter(raw: &str) -> anyhow::Result<(String, FilterSpec)> {
    let mut spec = FilterSpec {
        kind: FilterKind::Exact,
        value: None,
        values: None,
        min: None,
        max: None,
    };

    if let Some(pos) = raw.find('~') {
        let (key, value) = (&raw[..pos], &raw[pos + 1..]);
        spec.kind = FilterKind::Contains;
        spec.value = Some(value.to_string());
        return Ok((key.to_string(), spec));
    }

    let pos = raw
        .find('=')
        .ok_or_else(|| anyhow::anyhow!("invalid filter '{raw}': expected key=value or key~value"))?;
    let (key, value) = (&raw[..pos], &raw[pos + 1..]);

    if let Some((min, max)) = value.split_once("..") {
        spec.kind = FilterKind::Range;
        if !min.is_empty() {
            spec.min = Some(min.parse().map_err(|_| {
                anyhow::anyhow!("invalid filter '{raw}': '{min}' is not a number")
            })?);
        }
        if !max.is_empty() {
            spec.max = Some(max.parse().map_err(|_| {
                anyhow::anyhow!("invalid filter '{raw}': '{max}' is not a number")
            })?);
        }
    } else if value.contains('|') {
        spec.kind = FilterKind::In;
        spec.values = Some(value.split('|').map(str::to_string).collect());
    } else {
        spec.value = Some(value.to_string());
    }

    Ok((key.to_string(), spec))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;
    let pool = db::connect(&cfg).await?;

    if let Commands::Init = cli.command {
        migrate::run_migrations(&pool).await?;
        println!("Database initialized successfully.");
        return Ok(());
    }

    let store: Arc<dyn CatalogStore> = Arc::new(SqliteStore::new(pool));
    let engine = SearchEngine::new(
        Arc::clone(&store),
        cfg.search.candidate_cap,
        cfg.search.default_page_size,
    );

    match cli.command {
        Commands::Init => unreachable!(),
        Commands::Ingest { file, uploaded_by } => {
            // Resume the id sequence from the database so repeated runs
            // never re-issue a business identifier.
            let pipeline = IngestionPipeline::resume(store, cfg.ingestion.max_rows).await?;
            let result = pipeline.ingest_file(&file, &cli.tenant, &uploaded_by).await?;
            println!(
                "Ingested {} of {} rows from {}",
                result.count, result.attempted, result.file_name
            );
            for business_id in &result.business_ids {
                println!("  {business_id}");
            }
        }
        Commands::Search {
            keyword,
            category,
            filters,
            page,
            size,
            sort_by,
            sort_direction,
            json,
        } => {
            let mut request = SearchRequest {
                keyword,
                category,
                page,
                size,
                sort_by,
                sort_direction,
                ..Default::default()
            };
            for raw in &filters {
                let (key, spec) = parse_filter(raw)?;
                request.filters.insert(key, spec);
            }

            let results = engine.search(&cli.tenant, &request).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&results)?);
            } else {
                println!(
                    "{} matches (page {}, {} per page)",
                    results.total, results.page, results.page_size
                );
                for hit in &results.items {
                    println!(
                        "  {}  {}  {}",
                        hit.product_id,
                        hit.display_name.as_deref().unwrap_or("-"),
                        hit.category.as_deref().unwrap_or("-")
                    );
                }
            }
        }
        Commands::Get { id } => {
            let doc = engine.get(&cli.tenant, &id).await?;
            println!("{}", serde_json::to_string_pretty(&doc)?);
        }
        Commands::Filters => {
            for descriptor in engine.available_filters(&cli.tenant).await? {
                println!(
                    "{} ({}, {:?}): {}",
                    descriptor.attribute_key,
                    descriptor.display_name,
                    descriptor.attribute_type,
                    descriptor.available_values.join(", ")
                );
            }
        }
        Commands::Values { key } => {
            for value in engine.distinct_values(&cli.tenant, &key).await? {
                println!("{value}");
            }
        }
        Commands::Delete { ids, hard } => {
            if ids.is_empty() {
                return Err(CatalogError::bad_input("no document ids given").into());
            }
            let deleted = if hard {
                engine.bulk_hard_delete(&cli.tenant, &ids).await?
            } else {
                engine.bulk_soft_delete(&cli.tenant, &ids).await?
            };
            println!(
                "{} of {} documents {}",
                deleted,
                ids.len(),
                if hard { "removed" } else { "soft-deleted" }
            );
        }
    }

    Ok(())
}
