//! Configuration and local databases
//!
//! Settings live in an optional TOML file (default
//! `~/.config/sfetl/config.toml`); every key has a default so the tool runs
//! without one. Credentials never go in this file, they come from the
//! environment (see `api::auth`).

pub mod repository;

use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Which of the three CRM datasets / target orgs to work with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OrgType {
    #[default]
    Original,
    B2b,
    B2c,
}

impl OrgType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrgType::Original => "original",
            OrgType::B2b => "b2b",
            OrgType::B2c => "b2c",
        }
    }

    /// Prefix of the credential environment variables
    pub fn env_prefix(&self) -> &'static str {
        match self {
            OrgType::Original => "SALESFORCE",
            OrgType::B2b => "SALESFORCE_B2B",
            OrgType::B2c => "SALESFORCE_B2C",
        }
    }

    /// Snapshot database file name used when none is configured
    pub fn default_source_db(&self) -> &'static str {
        match self {
            OrgType::Original => "crmarena_data.db",
            OrgType::B2b => "crmarenapro_b2b_data.db",
            OrgType::B2c => "crmarenapro_b2c_data.db",
        }
    }
}

impl std::fmt::Display for OrgType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-org-type settings (`[orgs.<type>]`)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OrgConfig {
    /// Snapshot database; relative paths are resolved against `data_dir`
    pub source_db: Option<PathBuf>,
    /// `sf` CLI alias used when no token or password is in the environment
    pub target_org: Option<String>,
    /// Instance URL paired with an access token from the environment
    pub instance_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_version: String,
    pub login_url: String,
    /// Rows submitted per upload batch
    pub batch_size: usize,
    pub data_dir: PathBuf,
    /// ID mapping store; defaults to `<data_dir>/id_mappings.db`
    pub mapping_db: Option<PathBuf>,
    /// Keyed by org type name (`original`, `b2b`, `b2c`)
    pub orgs: HashMap<String, OrgConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_version: "59.0".to_string(),
            login_url: "https://login.salesforce.com".to_string(),
            batch_size: 1000,
            data_dir: PathBuf::from("local_data"),
            mapping_db: None,
            orgs: HashMap::new(),
        }
    }
}

impl Config {
    /// Default config file location
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("sfetl").join("config.toml"))
    }

    /// Load from an explicit path (must exist) or the default path (optional)
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, required) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => match Self::default_path() {
                Some(p) => (p, false),
                None => return Ok(Self::default()),
            },
        };

        if !path.exists() {
            if required {
                anyhow::bail!("Config file not found: {}", path.display());
            }
            log::debug!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config = Self::from_toml(&content)
            .with_context(|| format!("Invalid config file {}", path.display()))?;

        log::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        if config.batch_size == 0 {
            anyhow::bail!("batch_size must be greater than 0");
        }
        Ok(config)
    }

    pub fn org(&self, org_type: OrgType) -> OrgConfig {
        self.orgs.get(org_type.as_str()).cloned().unwrap_or_default()
    }

    /// Snapshot database path for an org type
    pub fn source_db_path(&self, org_type: OrgType) -> PathBuf {
        let configured = self
            .org(org_type)
            .source_db
            .unwrap_or_else(|| PathBuf::from(org_type.default_source_db()));

        if configured.is_absolute() {
            configured
        } else {
            self.data_dir.join(configured)
        }
    }

    pub fn mapping_db_path(&self) -> PathBuf {
        self.mapping_db
            .clone()
            .unwrap_or_else(|| self.data_dir.join("id_mappings.db"))
    }

    /// Directory for exported schemas and reports
    pub fn output_dir(&self) -> PathBuf {
        self.data_dir.join("output")
    }
}

/// Open (creating if needed) the ID mapping database and apply migrations
pub async fn open_mapping_pool(path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }
    }

    let options = SqliteConnectOptions::new()
        .filename(path)
        .journal_mode(SqliteJournalMode::Wal)
        .create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(2)
        .connect_with(options)
        .await
        .with_context(|| format!("Failed to open mapping database {}", path.display()))?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run mapping database migrations")?;

    Ok(pool)
}

/// In-memory mapping database with migrations applied
///
/// Single connection, since every `sqlite::memory:` connection is its own database.
pub async fn open_memory_pool() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .context("Failed to open in-memory database")?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run migrations")?;

    Ok(pool)
}
