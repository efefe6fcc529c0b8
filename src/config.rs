use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub ingestion: IngestionConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
    /// Connection pool size; ingest and search share the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    /// Hard cap on the keyword candidate set materialized before in-memory
    /// ranking. Matches beyond the cap are counted but not ranked.
    #[serde(default = "default_candidate_cap")]
    pub candidate_cap: usize,
    #[serde(default = "default_page_size")]
    pub default_page_size: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            candidate_cap: default_candidate_cap(),
            default_page_size: default_page_size(),
        }
    }
}

fn default_candidate_cap() -> usize {
    200
}
fn default_page_size() -> u64 {
    20
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestionConfig {
    /// Upper bound on data rows accepted from a single file.
    #[serde(default = "default_max_rows")]
    pub max_rows: usize,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            max_rows: default_max_rows(),
        }
    }
}

fn default_max_rows() -> usize {
    50_000
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.search.candidate_cap == 0 {
        anyhow::bail!("search.candidate_cap must be > 0");
    }
    if config.search.default_page_size == 0 {
        anyhow::bail!("search.default_page_size must be > 0");
    }
    if config.ingestion.max_rows == 0 {
        anyhow::bail!("ingestion.max_rows must be > 0");
    }
    if config.db.max_connections == 0 {
        anyhow::bail!("db.max_connections must be > 0");
    }

    Ok(config)
}
