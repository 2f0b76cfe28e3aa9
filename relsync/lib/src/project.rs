//! The projects to sync and which of them to skip.
//!
//! Projects come from a JSON array as produced by the discovery query:
//!
//! ```json
//! [{ "project": "http://www.wikidata.org/entity/Q1", "projectLabel": "Example", "repo": "https://github.com/o/example" }]
//! ```
//!
//! Allow and deny lists are plain text with one item id per line; a `#`
//! starts a comment and any other line is ignored.

use crate::error::Result;
use crate::github::is_supported_repo_url;
use crate::knowledge::ItemId;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub item_id: ItemId,
    pub label: String,
    pub repo: String,
}

#[derive(Debug, Deserialize)]
struct ProjectRecord {
    project: String,
    #[serde(rename = "projectLabel")]
    project_label: String,
    repo: String,
}

/// Parses the project list, skipping records whose entity URI has no item id.
///
/// ## Errors
///
/// Returns `SyncError::JsonParse` if `json` is not an array of project records.
pub fn parse_projects(json: &str) -> Result<Vec<Project>> {
    let records: Vec<ProjectRecord> = serde_json::from_str(json)?;
    let projects = records
        .into_iter()
        .filter_map(|record| match ItemId::from_entity_uri(&record.project) {
            Ok(item_id) => Some(Project {
                item_id,
                label: record.project_label,
                repo: record.repo,
            }),
            Err(e) => {
                warn!(project = %record.project, error = %e, "Skipping project without item id");
                None
            }
        })
        .collect();
    Ok(projects)
}

pub fn load_projects(path: &Path) -> Result<Vec<Project>> {
    parse_projects(&std::fs::read_to_string(path)?)
}

/// Item ids listed in a filter list.
pub fn parse_filter_list(text: &str) -> Vec<ItemId> {
    text.lines()
        .filter_map(|line| {
            let entry = line.split('#').next().unwrap_or_default().trim();
            ItemId::parse(entry).ok()
        })
        .collect()
}

pub fn load_filter_list(path: &Path) -> Result<Vec<ItemId>> {
    Ok(parse_filter_list(&std::fs::read_to_string(path)?))
}

/// Decides which projects a run touches.
#[derive(Debug, Clone, Default)]
pub struct ProjectSelection {
    filter: Option<String>,
    denylist: HashSet<ItemId>,
    ignore_denylist: bool,
}

impl ProjectSelection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keeps only projects whose item id or label contains `filter`,
    /// case-insensitively. An empty filter keeps everything.
    pub fn with_filter(mut self, filter: Option<String>) -> Self {
        self.filter = filter
            .map(|f| f.to_lowercase())
            .filter(|f| !f.is_empty());
        self
    }

    pub fn with_denylist(mut self, denylist: impl IntoIterator<Item = ItemId>) -> Self {
        self.denylist = denylist.into_iter().collect();
        self
    }

    pub fn ignore_denylist(mut self, ignore: bool) -> Self {
        self.ignore_denylist = ignore;
        self
    }

    pub fn accepts(&self, project: &Project) -> bool {
        if let Some(filter) = &self.filter
            && !project.item_id.as_str().to_lowercase().contains(filter)
            && !project.label.to_lowercase().contains(filter)
        {
            return false;
        }
        if !self.ignore_denylist && self.denylist.contains(&project.item_id) {
            info!(label = %project.label, item = %project.item_id, "Project is deny-listed");
            return false;
        }
        if !is_supported_repo_url(&project.repo) {
            info!(label = %project.label, item = %project.item_id, repo = %project.repo, "Removing project with unsupported repository");
            return false;
        }
        true
    }

    pub fn select(&self, projects: Vec<Project>) -> Vec<Project> {
        let total = projects.len();
        let selected: Vec<Project> = projects.into_iter().filter(|p| self.accepts(p)).collect();
        info!(total, remaining = selected.len(), "Projects remaining after filtering");
        selected
    }
}
