//! Building the stable release set of one project.
//!
//! Platform releases are paged through until an empty page comes back. When
//! none of them classifies, or the project is allow-listed for it, the builder
//! falls back to scanning git tags: tags are classified, ordered by version,
//! capped to the newest `max_tags` and only then dated, since dating costs one
//! request per tag.
//!
//! ## Examples
//!
//! ```rust,no_run
//! use relsync_lib::github::{GitHubClient, RepoRef, RequestGate};
//! use relsync_lib::release_set::ReleaseSetBuilder;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = GitHubClient::new("https://api.github.com", "relsync", Arc::new(RequestGate::new(8)))?;
//! let repo = RepoRef::from_url("https://github.com/tokio-rs/tokio")?;
//! let set = ReleaseSetBuilder::new(&client).build(&repo, false).await?;
//! println!("{} stable releases", set.releases.len());
//! # Ok(())
//! # }
//! ```

use crate::BoxFuture;
use crate::analysis::{Release, analyse_release, analyse_tag, resolve_tag_date};
use crate::error::Result;
use crate::github::{ProjectInfo, RawRelease, RawTag, RepoRef, TagObject};
use crate::version::sort_by_version;
use futures::stream::{self, StreamExt};
use tracing::{info, warn};

/// Default ceiling on the number of tags that get dated.
pub const DEFAULT_MAX_TAGS: usize = 300;

/// Read-only access to a code host's release data.
///
/// Dyn-compatible via boxed futures so the builder can run against the real
/// client or an in-memory fake.
pub trait ReleaseSource: Send + Sync {
    /// General repository information (name, canonical URL).
    fn project_info<'a>(&'a self, repo: &'a RepoRef) -> BoxFuture<'a, Result<ProjectInfo>>;

    /// One page of releases, 1-based. An empty page ends pagination.
    fn releases_page<'a>(
        &'a self,
        repo: &'a RepoRef,
        page: u32,
    ) -> BoxFuture<'a, Result<Vec<RawRelease>>>;

    /// All tag refs of the repository.
    fn tags<'a>(&'a self, repo: &'a RepoRef) -> BoxFuture<'a, Result<Vec<RawTag>>>;

    /// The tag or commit object a tag ref points at.
    fn tag_object<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<TagObject>>;
}

/// Result of scanning one repository.
#[derive(Debug, Clone)]
pub struct ReleaseSet {
    pub project: ProjectInfo,
    /// Stable releases, oldest first
    pub releases: Vec<Release>,
    /// `(tag_name, display_name)` of releases that didn't classify
    pub invalid_releases: Vec<(String, Option<String>)>,
    /// Tag names that didn't classify
    pub invalid_tags: Vec<String>,
    /// Whether the set came from tag scanning
    pub from_tags: bool,
}

pub struct ReleaseSetBuilder<'a> {
    source: &'a dyn ReleaseSource,
    read_tags: bool,
    max_tags: usize,
    concurrency: usize,
}

impl<'a> ReleaseSetBuilder<'a> {
    pub fn new(source: &'a dyn ReleaseSource) -> Self {
        Self {
            source,
            read_tags: true,
            max_tags: DEFAULT_MAX_TAGS,
            concurrency: 8,
        }
    }

    /// Enables or disables the tag fallback.
    pub fn read_tags(mut self, read_tags: bool) -> Self {
        self.read_tags = read_tags;
        self
    }

    /// Caps the number of tags that get dated.
    pub fn max_tags(mut self, max_tags: usize) -> Self {
        self.max_tags = max_tags;
        self
    }

    /// Number of tag dates fetched concurrently.
    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Fetches, classifies and filters the releases of `repo`.
    ///
    /// `force_tags` scans tags even when platform releases classified (the
    /// allow-list case); the tag results then replace the release results.
    ///
    /// ## Errors
    ///
    /// Propagates failures of the project, release-page and tag-list requests.
    /// A 404 on the tag list counts as "no tags". Failures while dating a
    /// single tag only drop that tag.
    pub async fn build(&self, repo: &RepoRef, force_tags: bool) -> Result<ReleaseSet> {
        let project = self.source.project_info(repo).await?;

        let mut extracted = Vec::new();
        let mut invalid_releases = Vec::new();
        let mut page = 1;
        loop {
            let releases = self.source.releases_page(repo, page).await?;
            if releases.is_empty() {
                break;
            }
            for raw in &releases {
                match analyse_release(raw, &project.name) {
                    Some(release) => extracted.push(release),
                    None => invalid_releases.push((raw.tag_name.clone(), raw.display_name.clone())),
                }
            }
            page += 1;
        }

        if !invalid_releases.is_empty() {
            let message = invalid_releases
                .iter()
                .map(|(tag, name)| format!("({}, {})", tag, name.as_deref().unwrap_or("None")))
                .collect::<Vec<_>>()
                .join(", ");
            info!(
                %repo,
                count = invalid_releases.len(),
                releases = %shorten(&message, 200),
                "Invalid releases"
            );
        }

        let mut invalid_tags = Vec::new();
        let from_tags = self.read_tags && (extracted.is_empty() || force_tags);
        if from_tags {
            info!(%repo, "Falling back to tags");
            extracted = self.releases_from_tags(repo, &project, &mut invalid_tags).await?;
        }

        let mut releases: Vec<Release> = extracted
            .into_iter()
            .filter(|release| release.maturity.is_stable())
            .collect();
        sort_by_version(&mut releases, |r| r.version.as_str());

        Ok(ReleaseSet {
            project,
            releases,
            invalid_releases,
            invalid_tags,
            from_tags,
        })
    }

    async fn releases_from_tags(
        &self,
        repo: &RepoRef,
        project: &ProjectInfo,
        invalid_tags: &mut Vec<String>,
    ) -> Result<Vec<Release>> {
        let tags = match self.source.tags(repo).await {
            Ok(tags) => tags,
            // GitHub answers 404 when a repository has no tags at all.
            Err(e) if e.is_not_found() => Vec::new(),
            Err(e) => return Err(e),
        };

        let mut pending: Vec<_> = tags
            .iter()
            .filter_map(|tag| analyse_tag(tag, project, invalid_tags))
            .collect();
        sort_by_version(&mut pending, |p| p.version.as_str());

        if pending.len() > self.max_tags {
            info!(
                %repo,
                limit = self.max_tags,
                total = pending.len(),
                "Limiting tags for performance reasons"
            );
            pending.drain(..pending.len() - self.max_tags);
        }

        if !invalid_tags.is_empty() {
            info!(
                %repo,
                tags = %shorten(&invalid_tags.join(", "), 200),
                "Invalid version strings in tags"
            );
        }

        // `buffered` keeps input order, so the result stays deterministic.
        let releases: Vec<Release> = stream::iter(pending)
            .map(|tag| async move {
                let object_url = tag.object_url.clone();
                let dated = match self.source.tag_object(&tag.object_url).await {
                    Ok(object) => resolve_tag_date(tag, &object),
                    Err(e) => Err(e),
                };
                dated.map_err(|e| (object_url, e))
            })
            .buffered(self.concurrency)
            .filter_map(|dated| async move {
                match dated {
                    Ok(release) => Some(release),
                    Err((url, e)) => {
                        warn!(url = %url, error = %e, "Could not date tag, skipping");
                        None
                    }
                }
            })
            .collect()
            .await;

        Ok(releases)
    }
}

/// Truncates `text` to at most `width` characters, marking the cut with `...`.
fn shorten(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    let kept: String = text.chars().take(width.saturating_sub(3)).collect();
    format!("{}...", kept)
}
