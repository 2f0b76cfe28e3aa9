//! Reconciling a project's stable releases against its knowledge-base item.
//!
//! One software-version claim per release, each with a publication date, a
//! version type and a reference back to the release page. The newest release
//! holds the preferred rank; every other claim is normal, except claims
//! qualified with an exempt version type (long-term support branches), which
//! keep whatever rank they have.
//!
//! The engine refuses to guess. It leaves ranks alone when the item prefers a
//! version the upstream doesn't list or has deprecated the newest one, writes nothing at all when the upstream
//! lists a version twice, and stops promoting after losing an edit conflict.
//! Running it twice on unchanged data writes nothing the second time.

use crate::analysis::Release;
use crate::error::Result;
use crate::knowledge::{
    ClaimValue, EditGroup, Item, ItemId, KnowledgeBase, Property, Rank, RankTransition, Snak,
};
use crate::version::sort_by_version;
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tracing::{error, info, warn};

/// Default ceiling on the releases written per pass.
pub const DEFAULT_MAX_RELEASES: usize = 100;

/// Version type marking a long-term support release.
pub const LONG_TERM_SUPPORT: &str = "Q15726348";

/// Version type attached to every created claim.
pub const STABLE_VERSION: &str = "Q2804309";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcilePolicy {
    /// Only the newest this many releases are written.
    pub max_releases: usize,
    /// Preferred claims qualified with one of these version types are never demoted.
    pub exempt_version_types: Vec<ItemId>,
    /// Version type qualifier for created claims.
    pub stable_version_type: ItemId,
}

impl ReconcilePolicy {
    /// Builds a policy from raw item ids.
    ///
    /// ## Errors
    ///
    /// Returns `SyncError::Config` if an id isn't of the form `Q<digits>`.
    pub fn new(
        max_releases: usize,
        exempt_version_types: &[String],
        stable_version_type: &str,
    ) -> Result<Self> {
        Ok(Self {
            max_releases,
            exempt_version_types: exempt_version_types
                .iter()
                .map(|id| ItemId::parse(id))
                .collect::<Result<_>>()?,
            stable_version_type: ItemId::parse(stable_version_type)?,
        })
    }
}

impl Default for ReconcilePolicy {
    fn default() -> Self {
        Self {
            max_releases: DEFAULT_MAX_RELEASES,
            exempt_version_types: vec![ItemId::from_static(LONG_TERM_SUPPORT)],
            stable_version_type: ItemId::from_static(STABLE_VERSION),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "versions", rename_all = "kebab-case")]
pub enum ReconcileOutcome {
    #[default]
    Applied,
    /// Nothing stable upstream; nothing written.
    NoStableReleases,
    /// The listed `version (page)` entries collide; nothing written.
    DuplicateVersions(Vec<String>),
}

/// What a pass did to one item.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub outcome: ReconcileOutcome,
    /// The version that should hold the preferred rank, if any
    pub latest: Option<String>,
    pub created: Vec<String>,
    pub promoted: Vec<String>,
    pub demoted: Vec<String>,
    /// Versions whose demotion lost against a concurrent edit
    pub conflicts: Vec<String>,
}

impl ReconcileReport {
    /// True when the pass changed nothing.
    pub fn is_unchanged(&self) -> bool {
        self.created.is_empty() && self.promoted.is_empty() && self.demoted.is_empty()
    }
}

pub struct ReconciliationEngine<'a> {
    kb: &'a dyn KnowledgeBase,
    policy: &'a ReconcilePolicy,
    edit: &'a EditGroup,
    retrieved: NaiveDate,
}

impl<'a> ReconciliationEngine<'a> {
    pub fn new(
        kb: &'a dyn KnowledgeBase,
        policy: &'a ReconcilePolicy,
        edit: &'a EditGroup,
        retrieved: NaiveDate,
    ) -> Self {
        Self {
            kb,
            policy,
            edit,
            retrieved,
        }
    }

    /// Brings the software-version claims of `item` in line with `releases`.
    ///
    /// `releases` must already be filtered to stable ones; order doesn't
    /// matter. `item` is the state fetched right before the pass.
    ///
    /// ## Errors
    ///
    /// Propagates knowledge-base failures. An edit conflict while demoting is
    /// not an error: it is logged, recorded in the report and ends rank
    /// changes for the pass.
    #[tracing::instrument(skip_all, fields(item = %item.id))]
    pub async fn reconcile(&self, item: &Item, mut releases: Vec<Release>) -> Result<ReconcileReport> {
        let mut report = ReconcileReport::default();
        sort_by_version(&mut releases, |r| r.version.as_str());

        if releases.is_empty() {
            info!("No stable releases");
            report.outcome = ReconcileOutcome::NoStableReleases;
            return Ok(report);
        }

        let duplicates = duplicate_versions(&releases);
        if !duplicates.is_empty() {
            warn!(duplicates = %duplicates.join(", "), "There are duplicate releases");
            report.outcome = ReconcileOutcome::DuplicateVersions(duplicates);
            return Ok(report);
        }

        let existing = item.claims_for(Property::SoftwareVersion);
        let mut latest = releases.last().map(|r| r.version.clone());
        let upstream: HashSet<&str> = releases.iter().map(|r| r.version.as_str()).collect();
        for claim in existing.iter().filter(|c| c.rank == Rank::Preferred) {
            let listed = claim
                .value
                .as_string()
                .is_some_and(|version| upstream.contains(version));
            if !listed {
                warn!(
                    preferred = %claim.value,
                    "Preferred version is not among the upstream releases, leaving ranks alone"
                );
                latest = None;
            }
        }
        if let Some(version) = latest.as_deref()
            && item
                .find_claim(Property::SoftwareVersion, &ClaimValue::string(version))
                .is_some_and(|claim| claim.rank == Rank::Deprecated)
        {
            warn!(version, "Latest version is deprecated, leaving ranks alone");
            latest = None;
        }
        report.latest = latest.clone();

        if releases.len() > self.policy.max_releases {
            info!(
                limit = self.policy.max_releases,
                total = releases.len(),
                "Limiting stable releases"
            );
            releases.drain(..releases.len() - self.policy.max_releases);
        } else {
            info!(count = releases.len(), latest = ?latest, "Stable releases");
        }

        let mut avoid_preferred = false;
        if releases.len() == 1 {
            let only = ClaimValue::string(releases[0].version.as_str());
            if existing.is_empty() || (existing.len() == 1 && existing[0].value == only) {
                info!("Only a single version, not setting the preferred rank");
                avoid_preferred = true;
            }
        }

        for release in &releases {
            let value = ClaimValue::string(release.version.as_str());
            let current = item.find_claim(Property::SoftwareVersion, &value);

            if let Some(claim) = current
                && latest.as_deref().is_some_and(|l| l != release.version)
                && !claim.has_item_qualifier(Property::VersionType, &self.policy.exempt_version_types)
                && let Some(rank) = claim.rank.transition(RankTransition::Demote)
            {
                info!(version = %release.version, "Setting normal rank");
                match self.kb.set_rank(&claim.id, rank, item.revision, self.edit).await {
                    Ok(()) => report.demoted.push(release.version.clone()),
                    Err(e) if e.is_edit_conflict() => {
                        error!(version = %release.version, error = %e, "Edit conflict while setting the normal rank");
                        avoid_preferred = true;
                        report.conflicts.push(release.version.clone());
                        continue;
                    }
                    Err(e) => return Err(e),
                }
            }

            let preferred = !avoid_preferred && latest.as_deref() == Some(release.version.as_str());
            match current {
                None => {
                    self.create(item, release, preferred).await?;
                    report.created.push(release.version.clone());
                    if preferred {
                        report.promoted.push(release.version.clone());
                    }
                }
                Some(claim) if preferred => {
                    if let Some(rank) = claim.rank.transition(RankTransition::Promote) {
                        info!(version = %release.version, "Claim exists, setting preferred rank");
                        self.kb
                            .set_rank(&claim.id, rank, item.revision, self.edit)
                            .await?;
                        report.promoted.push(release.version.clone());
                    }
                }
                Some(_) => {}
            }
        }

        Ok(report)
    }

    async fn create(&self, item: &Item, release: &Release, preferred: bool) -> Result<()> {
        info!(
            version = %release.version,
            rank = if preferred { "preferred" } else { "normal" },
            "Creating version"
        );
        let date = ClaimValue::Date(release.date);
        let claim = self
            .kb
            .create_claim(
                &item.id,
                Property::SoftwareVersion,
                &ClaimValue::string(release.version.as_str()),
                self.edit,
            )
            .await?;
        self.kb
            .add_qualifier(&claim, Property::PublicationDate, &date, self.edit)
            .await?;
        self.kb
            .add_qualifier(
                &claim,
                Property::VersionType,
                &ClaimValue::Item(self.policy.stable_version_type.clone()),
                self.edit,
            )
            .await?;
        let sources = [
            Snak::new(Property::ReferenceUrl, ClaimValue::Url(release.page_url.clone())),
            Snak::new(Property::Retrieved, ClaimValue::Date(self.retrieved)),
            Snak::new(
                Property::Title,
                ClaimValue::MonolingualText {
                    text: format!("Release {}", release.version),
                    language: "en".to_string(),
                },
            ),
            Snak::new(Property::PublicationDate, date),
        ];
        self.kb.add_sources(&claim, &sources, self.edit).await?;
        if preferred {
            self.kb
                .set_rank(&claim, Rank::Preferred, item.revision, self.edit)
                .await?;
        }
        Ok(())
    }
}

/// `version (page)` for every release whose version occurs more than once.
fn duplicate_versions(releases: &[Release]) -> Vec<String> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for release in releases {
        *counts.entry(release.version.as_str()).or_default() += 1;
    }
    releases
        .iter()
        .filter(|r| counts[r.version.as_str()] > 1)
        .map(|r| format!("{} ({})", r.version, r.page_url))
        .collect()
}
