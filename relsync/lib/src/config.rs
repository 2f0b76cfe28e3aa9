//! Run configuration.
//!
//! Read from a JSON file with kebab-case keys; every key is optional. Tokens
//! may also come from `GITHUB_TOKEN` and `WIKIBASE_TOKEN`, which win over the
//! file.

use crate::error::{Result, SyncError};
use crate::github::GITHUB_API_BASE_URL;
use crate::knowledge::WIKIDATA_API_URL;
use crate::reconcile::{DEFAULT_MAX_RELEASES, LONG_TERM_SUPPORT, ReconcilePolicy, STABLE_VERSION};
use crate::release_set::DEFAULT_MAX_TAGS;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

pub const CONFIG_FILE_NAME: &str = "config.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct SyncConfig {
    pub github_oauth_token: Option<String>,
    pub github_api_url: String,
    pub wikibase_api_url: String,
    pub wikibase_token: Option<String>,
    pub user_agent: String,
    pub max_releases: usize,
    pub max_tags: usize,
    pub read_tags: bool,
    /// Upstream requests in flight at once, across all projects
    pub max_concurrent_requests: usize,
    /// Items reconciled at once
    pub max_concurrent_projects: usize,
    pub project_timeout_secs: u64,
    /// Version types whose preferred claims are never demoted
    pub exempt_version_types: Vec<String>,
    pub stable_version_type: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            github_oauth_token: None,
            github_api_url: GITHUB_API_BASE_URL.to_string(),
            wikibase_api_url: WIKIDATA_API_URL.to_string(),
            wikibase_token: None,
            user_agent: concat!("relsync/", env!("CARGO_PKG_VERSION")).to_string(),
            max_releases: DEFAULT_MAX_RELEASES,
            max_tags: DEFAULT_MAX_TAGS,
            read_tags: true,
            max_concurrent_requests: 8,
            max_concurrent_projects: 4,
            project_timeout_secs: 600,
            exempt_version_types: vec![LONG_TERM_SUPPORT.to_string()],
            stable_version_type: STABLE_VERSION.to_string(),
        }
    }
}

impl SyncConfig {
    /// `config.json` in the working directory if present, else the one in
    /// the user's config directory.
    pub fn default_path() -> PathBuf {
        let local = PathBuf::from(CONFIG_FILE_NAME);
        if local.exists() {
            return local;
        }
        dirs::config_dir()
            .map(|dir| dir.join("relsync").join(CONFIG_FILE_NAME))
            .unwrap_or(local)
    }

    /// Loads `path`, or the default location when `None`. A missing file
    /// yields the defaults.
    ///
    /// ## Errors
    ///
    /// Returns `SyncError::Io` / `SyncError::JsonParse` for unreadable or
    /// malformed files.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path.map(Path::to_path_buf).unwrap_or_else(Self::default_path);
        if !path.exists() {
            debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }
        let reader = BufReader::new(File::open(&path)?);
        Ok(serde_json::from_reader(reader)?)
    }

    /// Overrides tokens from the process environment.
    pub fn apply_env(self) -> Self {
        self.apply_env_with(|key| std::env::var(key).ok())
    }

    /// Overrides tokens from `lookup`; empty values are ignored.
    pub fn apply_env_with(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let lookup = |key: &str| lookup(key).filter(|v| !v.is_empty());
        if let Some(token) = lookup("GITHUB_TOKEN") {
            self.github_oauth_token = Some(token);
        }
        if let Some(token) = lookup("WIKIBASE_TOKEN") {
            self.wikibase_token = Some(token);
        }
        self
    }

    /// Checks the settings a run can't start without.
    ///
    /// ## Errors
    ///
    /// Returns `SyncError::Config` naming the first problem found.
    pub fn validate(&self) -> Result<()> {
        if self.github_oauth_token.as_deref().is_none_or(str::is_empty) {
            return Err(SyncError::Config(
                "github-oauth-token is missing (config file, GITHUB_TOKEN or --github-oauth-token)".to_string(),
            ));
        }
        if self.max_concurrent_requests == 0 || self.max_concurrent_projects == 0 {
            return Err(SyncError::Config("concurrency limits must be at least 1".to_string()));
        }
        if self.max_releases == 0 {
            return Err(SyncError::Config("max-releases must be at least 1".to_string()));
        }
        self.policy()?;
        Ok(())
    }

    /// The reconciliation policy these settings describe.
    pub fn policy(&self) -> Result<ReconcilePolicy> {
        ReconcilePolicy::new(
            self.max_releases,
            &self.exempt_version_types,
            &self.stable_version_type,
        )
    }

    pub fn project_timeout(&self) -> Duration {
        Duration::from_secs(self.project_timeout_secs)
    }
}
