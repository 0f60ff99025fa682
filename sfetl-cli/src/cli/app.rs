//! Shared state for command handlers

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::time::Duration;

use crate::api::{Credentials, SalesforceClient};
use crate::config::{self, Config, OrgType};
use crate::services::IdMapStore;
use crate::source::SourceDb;

const HTTP_TIMEOUT: Duration = Duration::from_secs(300);

pub struct AppContext {
    pub config: Config,
    pub org_type: OrgType,
}

impl AppContext {
    pub fn new(config: Config, org_type: OrgType) -> Self {
        Self { config, org_type }
    }

    /// Authenticate against the org of the selected type
    pub async fn connect(&self) -> Result<SalesforceClient> {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;

        let credentials = Credentials::resolve(self.org_type, &self.config);
        let session = credentials
            .authenticate(&http, &self.config.api_version)
            .await
            .with_context(|| format!("Failed to connect to the {} org", self.org_type))?;

        log::info!("Connected to {}", session.instance_url);
        Ok(SalesforceClient::new(http, session, self.config.api_version.clone()))
    }

    pub async fn source(&self) -> Result<SourceDb> {
        SourceDb::open(&self.config.source_db_path(self.org_type)).await
    }

    /// ID mapping cache; in dry runs new mappings are kept in memory only
    pub async fn id_map(&self, dry_run: bool) -> Result<IdMapStore> {
        let pool = config::open_mapping_pool(&self.config.mapping_db_path()).await?;
        let store = IdMapStore::load(pool).await?;
        Ok(if dry_run { store.memory_only() } else { store })
    }

    /// Output directory, created if missing
    pub fn output_dir(&self) -> Result<PathBuf> {
        let dir = self.config.output_dir();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create output directory {}", dir.display()))?;
        Ok(dir)
    }
}
