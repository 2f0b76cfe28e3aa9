//! Running sync passes over projects.
//!
//! A [`SyncContext`] holds everything one run shares: settings, the upstream
//! source, the knowledge base, the edit group and the retrieval date. It is
//! built once and passed by reference.
//!
//! Projects that share a knowledge-base item run one after another, since
//! claim writes aren't transactional; different items run concurrently.

use crate::analysis::Release;
use crate::config::SyncConfig;
use crate::error::{Result, SyncError};
use crate::github::RepoRef;
use crate::knowledge::{EditGroup, ItemId, KnowledgeBase, MemoryKnowledgeBase, Mutation};
use crate::project::Project;
use crate::reconcile::{ReconcilePolicy, ReconcileReport, ReconciliationEngine};
use crate::release_set::{ReleaseSet, ReleaseSetBuilder, ReleaseSource};
use chrono::{NaiveDate, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Knowledge-base passes per project: the first try plus one retry.
const KB_ATTEMPTS: u32 = 2;

pub struct SyncContext {
    pub config: SyncConfig,
    pub policy: ReconcilePolicy,
    pub source: Arc<dyn ReleaseSource>,
    pub kb: Arc<dyn KnowledgeBase>,
    pub edit: EditGroup,
    pub retrieved: NaiveDate,
    /// Items whose tags are read even when platform releases exist
    pub allowlist: HashSet<ItemId>,
    /// Reconcile against a scratch copy and only report the mutations
    pub dry_run: bool,
}

impl SyncContext {
    /// Builds a context with a fresh edit group, retrieving as of today (UTC).
    ///
    /// ## Errors
    ///
    /// Returns `SyncError::Config` if the policy ids in `config` are malformed.
    pub fn new(
        config: SyncConfig,
        source: Arc<dyn ReleaseSource>,
        kb: Arc<dyn KnowledgeBase>,
    ) -> Result<Self> {
        Ok(Self {
            policy: config.policy()?,
            config,
            source,
            kb,
            edit: EditGroup::random(),
            retrieved: Utc::now().date_naive(),
            allowlist: HashSet::new(),
            dry_run: false,
        })
    }

    pub fn with_allowlist(mut self, allowlist: impl IntoIterator<Item = ItemId>) -> Self {
        self.allowlist = allowlist.into_iter().collect();
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_edit_group(mut self, edit: EditGroup) -> Self {
        self.edit = edit;
        self
    }

    pub fn with_retrieved(mut self, retrieved: NaiveDate) -> Self {
        self.retrieved = retrieved;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum ProjectStatus {
    Synced {
        report: ReconcileReport,
        /// Mutations a dry run would have written
        #[serde(skip_serializing_if = "Vec::is_empty")]
        planned: Vec<Mutation>,
    },
    /// Upstream data couldn't be fetched; the knowledge base wasn't touched.
    Skipped { reason: String },
    Failed { error: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct ProjectOutcome {
    pub project: Project,
    #[serde(flatten)]
    pub status: ProjectStatus,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchSummary {
    pub outcomes: Vec<ProjectOutcome>,
}

impl BatchSummary {
    pub fn synced(&self) -> usize {
        self.count(|s| matches!(s, ProjectStatus::Synced { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|s| matches!(s, ProjectStatus::Skipped { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|s| matches!(s, ProjectStatus::Failed { .. }))
    }

    pub fn has_failures(&self) -> bool {
        self.failed() > 0
    }

    fn count(&self, f: impl Fn(&ProjectStatus) -> bool) -> usize {
        self.outcomes.iter().filter(|o| f(&o.status)).count()
    }
}

/// Runs one project's pass under the configured timeout.
///
/// Commits made before a timeout stay committed.
///
/// ## Errors
///
/// - `SyncError::Timeout` when the pass takes too long
/// - any knowledge-base error that persisted through the retry
#[tracing::instrument(skip_all, fields(project = %project.label, item = %project.item_id))]
pub async fn sync_project(ctx: &SyncContext, project: &Project) -> Result<ProjectStatus> {
    let limit = ctx.config.project_timeout();
    match tokio::time::timeout(limit, run_pass(ctx, project)).await {
        Ok(result) => result,
        Err(_) => Err(SyncError::Timeout {
            project: project.label.clone(),
            elapsed: limit,
        }),
    }
}

async fn run_pass(ctx: &SyncContext, project: &Project) -> Result<ProjectStatus> {
    info!(repo = %project.repo, "Syncing project");

    let set = match fetch_releases(ctx, project).await {
        Ok(set) => set,
        Err(e) => {
            error!(error = %e, "Fetching upstream releases failed, skipping project");
            return Ok(ProjectStatus::Skipped {
                reason: e.to_string(),
            });
        }
    };

    let mut attempt = 1;
    loop {
        match reconcile_item(ctx, project, set.releases.clone()).await {
            Ok(status) => return Ok(status),
            Err(e) if attempt < KB_ATTEMPTS && !e.is_edit_conflict() => {
                warn!(error = %e, attempt, "Knowledge base update failed, retrying");
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

async fn fetch_releases(ctx: &SyncContext, project: &Project) -> Result<ReleaseSet> {
    let repo = RepoRef::from_url(&project.repo)?;
    ReleaseSetBuilder::new(ctx.source.as_ref())
        .read_tags(ctx.config.read_tags)
        .max_tags(ctx.config.max_tags)
        .concurrency(ctx.config.max_concurrent_requests)
        .build(&repo, ctx.allowlist.contains(&project.item_id))
        .await
}

async fn reconcile_item(
    ctx: &SyncContext,
    project: &Project,
    releases: Vec<Release>,
) -> Result<ProjectStatus> {
    let item = ctx.kb.get_item(&project.item_id).await?;

    if ctx.dry_run {
        let scratch = MemoryKnowledgeBase::seeded(item.clone());
        let report = ReconciliationEngine::new(&scratch, &ctx.policy, &ctx.edit, ctx.retrieved)
            .reconcile(&item, releases)
            .await?;
        let planned = scratch.mutations();
        for mutation in &planned {
            info!(%mutation, "Would write");
        }
        return Ok(ProjectStatus::Synced { report, planned });
    }

    let report = ReconciliationEngine::new(ctx.kb.as_ref(), &ctx.policy, &ctx.edit, ctx.retrieved)
        .reconcile(&item, releases)
        .await?;
    Ok(ProjectStatus::Synced {
        report,
        planned: Vec::new(),
    })
}

/// Syncs every project, never stopping on a single failure.
///
/// Outcomes come back in the order of `projects`.
pub async fn run_batch(ctx: &SyncContext, projects: Vec<Project>) -> BatchSummary {
    info!(count = projects.len(), "Processing projects");

    let mut groups: Vec<Vec<(usize, Project)>> = Vec::new();
    let mut group_of: HashMap<ItemId, usize> = HashMap::new();
    for (index, project) in projects.into_iter().enumerate() {
        let group = *group_of.entry(project.item_id.clone()).or_insert_with(|| {
            groups.push(Vec::new());
            groups.len() - 1
        });
        groups[group].push((index, project));
    }

    let mut outcomes: Vec<(usize, ProjectOutcome)> = stream::iter(groups)
        .map(|group| async move {
            let mut done = Vec::with_capacity(group.len());
            for (index, project) in group {
                let status = match sync_project(ctx, &project).await {
                    Ok(status) => status,
                    Err(e) => {
                        error!(
                            project = %project.label,
                            item = %project.item_id,
                            error = %e,
                            "Failed to update project"
                        );
                        ProjectStatus::Failed {
                            error: e.to_string(),
                        }
                    }
                };
                done.push((index, ProjectOutcome { project, status }));
            }
            done
        })
        .buffer_unordered(ctx.config.max_concurrent_projects.max(1))
        .flat_map(stream::iter)
        .collect()
        .await;
    outcomes.sort_by_key(|(index, _)| *index);

    let summary = BatchSummary {
        outcomes: outcomes.into_iter().map(|(_, outcome)| outcome).collect(),
    };
    info!(
        synced = summary.synced(),
        skipped = summary.skipped(),
        failed = summary.failed(),
        "Finished"
    );
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BoxFuture;
    use crate::github::{ProjectInfo, RawRelease, RawTag, TagObject};
    use crate::knowledge::{ClaimValue, Property, Rank};
    use crate::reconcile::ReconcileOutcome;
    use crate::release_set::tests::FakeSource;
    use std::time::Duration;
    use tracing_test::traced_test;

    /// Source whose every call fails, or never returns.
    struct BrokenSource {
        hang: bool,
    }

    impl BrokenSource {
        fn fail<'a, T: Send + 'a>(&'a self) -> BoxFuture<'a, Result<T>> {
            Box::pin(async move {
                if self.hang {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                }
                Err(SyncError::UnexpectedStatus {
                    status: 502,
                    url: "https://api.github.com".to_string(),
                    body: String::new(),
                })
            })
        }
    }

    impl ReleaseSource for BrokenSource {
        fn project_info<'a>(&'a self, _repo: &'a RepoRef) -> BoxFuture<'a, Result<ProjectInfo>> {
            self.fail()
        }

        fn releases_page<'a>(
            &'a self,
            _repo: &'a RepoRef,
            _page: u32,
        ) -> BoxFuture<'a, Result<Vec<RawRelease>>> {
            self.fail()
        }

        fn tags<'a>(&'a self, _repo: &'a RepoRef) -> BoxFuture<'a, Result<Vec<RawTag>>> {
            self.fail()
        }

        fn tag_object<'a>(&'a self, _url: &'a str) -> BoxFuture<'a, Result<TagObject>> {
            self.fail()
        }
    }

    fn project(id: &str) -> Project {
        Project {
            item_id: ItemId::parse(id).unwrap(),
            label: format!("program {}", id),
            repo: "https://github.com/owner/program".to_string(),
        }
    }

    fn source() -> Arc<FakeSource> {
        Arc::new(FakeSource {
            pages: vec![vec![
                FakeSource::release("v1.0", None, false),
                FakeSource::release("v2.0", Some("Version 2.0"), false),
                FakeSource::release("v2.1-beta", None, true),
            ]],
            ..Default::default()
        })
    }

    fn context(source: Arc<dyn ReleaseSource>, kb: Arc<MemoryKnowledgeBase>) -> SyncContext {
        let config = SyncConfig {
            github_oauth_token: Some("token".to_string()),
            project_timeout_secs: 5,
            ..Default::default()
        };
        SyncContext::new(config, source, kb)
            .unwrap()
            .with_edit_group(EditGroup::new("abc"))
            .with_retrieved(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap())
    }

    fn rank_of(kb: &MemoryKnowledgeBase, id: &str, version: &str) -> Option<Rank> {
        kb.item(&ItemId::parse(id).unwrap())?
            .find_claim(Property::SoftwareVersion, &ClaimValue::string(version))
            .map(|c| c.rank)
    }

    #[tokio::test]
    async fn test_sync_project_writes_stable_releases() {
        let kb = Arc::new(MemoryKnowledgeBase::new());
        let ctx = context(source(), kb.clone());

        let status = sync_project(&ctx, &project("Q1")).await.unwrap();
        let ProjectStatus::Synced { report, planned } = status else {
            panic!("expected a synced project, got {:?}", status);
        };
        assert_eq!(report.outcome, ReconcileOutcome::Applied);
        assert_eq!(report.created, vec!["1.0", "2.0"]);
        assert!(planned.is_empty());
        assert_eq!(rank_of(&kb, "Q1", "2.0"), Some(Rank::Preferred));
        assert_eq!(rank_of(&kb, "Q1", "2.1-beta"), None);
    }

    #[tokio::test]
    async fn test_dry_run_leaves_knowledge_base_alone() {
        let kb = Arc::new(MemoryKnowledgeBase::new());
        let ctx = context(source(), kb.clone()).with_dry_run(true);

        let status = sync_project(&ctx, &project("Q1")).await.unwrap();
        let ProjectStatus::Synced { planned, .. } = status else {
            panic!("expected a synced project, got {:?}", status);
        };
        assert!(planned.iter().any(|m| matches!(m, Mutation::CreateClaim { .. })));
        assert!(kb.mutations().is_empty());
    }

    #[tokio::test]
    #[traced_test]
    async fn test_upstream_failure_skips_project() {
        let kb = Arc::new(MemoryKnowledgeBase::new());
        let ctx = context(Arc::new(BrokenSource { hang: false }), kb.clone());

        let status = sync_project(&ctx, &project("Q1")).await.unwrap();
        assert!(matches!(status, ProjectStatus::Skipped { .. }));
        assert!(kb.mutations().is_empty());
        assert!(logs_contain("Fetching upstream releases failed"));
    }

    #[tokio::test]
    async fn test_knowledge_base_failure_is_retried_once() {
        let kb = Arc::new(MemoryKnowledgeBase::new());
        let ctx = context(source(), kb.clone());

        kb.fail_next_reads(1);
        assert!(matches!(
            sync_project(&ctx, &project("Q1")).await,
            Ok(ProjectStatus::Synced { .. })
        ));

        kb.fail_next_reads(2);
        let err = sync_project(&ctx, &project("Q2")).await.unwrap_err();
        assert!(matches!(err, SyncError::KnowledgeBase { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_project_times_out() {
        let kb = Arc::new(MemoryKnowledgeBase::new());
        let ctx = context(Arc::new(BrokenSource { hang: true }), kb);

        let err = sync_project(&ctx, &project("Q1")).await.unwrap_err();
        assert!(matches!(err, SyncError::Timeout { elapsed, .. } if elapsed == Duration::from_secs(5)));
    }

    #[tokio::test]
    async fn test_batch_keeps_going_and_keeps_order() {
        let kb = Arc::new(MemoryKnowledgeBase::new());
        let ctx = context(source(), kb.clone());
        let mut broken = project("Q3");
        broken.repo = "https://github.com/owner".to_string();

        // Q1 shows up twice; the second pass finds everything in place.
        let summary = run_batch(&ctx, vec![project("Q1"), project("Q2"), broken, project("Q1")]).await;

        let items: Vec<&str> = summary
            .outcomes
            .iter()
            .map(|o| o.project.item_id.as_str())
            .collect();
        assert_eq!(items, vec!["Q1", "Q2", "Q3", "Q1"]);
        assert_eq!(summary.synced(), 3);
        assert_eq!(summary.skipped(), 1);
        assert!(!summary.has_failures());

        let ProjectStatus::Synced { report, .. } = &summary.outcomes[3].status else {
            panic!("expected a synced project");
        };
        assert!(report.is_unchanged());
    }
}
