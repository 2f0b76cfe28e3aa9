//! Repository URL normalization.
//!
//! Canonical repository URLs look like `https://github.com/owner/repo`: https
//! scheme, no fragment, no `.git` suffix and no trailing slash (the API 404s
//! on `/repos/owner/repo/`).

use crate::error::{Result, SyncError};
use regex::Regex;
use std::fmt;
use std::sync::LazyLock;
use url::Url;

/// The shape of repository URLs the bot is willing to touch.
static REPO_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z]+://github\.com/[^/]+/[^/]+/?$").expect("valid regex"));

/// Owner/name pair identifying a repository on the platform.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepoRef {
    pub owner: String,
    pub name: String,
}

impl RepoRef {
    /// Parses any accepted spelling of a repository URL.
    ///
    /// ## Examples
    ///
    /// ```
    /// use relsync_lib::github::RepoRef;
    ///
    /// let repo = RepoRef::from_url("git://github.com/certbot/certbot.git").unwrap();
    /// assert_eq!(repo.owner, "certbot");
    /// assert_eq!(repo.name, "certbot");
    /// ```
    pub fn from_url(raw: &str) -> Result<Self> {
        let normalized = normalize_repo_url(raw)?;
        let url = Url::parse(&normalized)
            .map_err(|e| SyncError::InvalidRepoUrl(format!("{}: {}", raw, e)))?;
        let mut segments = url
            .path_segments()
            .ok_or_else(|| SyncError::InvalidRepoUrl(raw.to_string()))?
            .filter(|s| !s.is_empty());
        match (segments.next(), segments.next()) {
            (Some(owner), Some(name)) => Ok(Self {
                owner: owner.to_string(),
                name: name.to_string(),
            }),
            _ => Err(SyncError::InvalidRepoUrl(raw.to_string())),
        }
    }

    /// `{api_base}/repos/{owner}/{name}`
    pub fn api_url(&self, api_base: &str) -> String {
        format!(
            "{}/repos/{}/{}",
            api_base.trim_end_matches('/'),
            self.owner,
            self.name
        )
    }
}

impl fmt::Display for RepoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// Canonicalizes a repository URL.
///
/// The scheme is rebuilt rather than swapped because `url` refuses to change
/// a non-special scheme such as `git` into `https`.
pub fn normalize_repo_url(raw: &str) -> Result<String> {
    let url = Url::parse(raw.trim())
        .map_err(|e| SyncError::InvalidRepoUrl(format!("{}: {}", raw, e)))?;
    let host = url
        .host_str()
        .ok_or_else(|| SyncError::InvalidRepoUrl(raw.to_string()))?;
    let path = url.path();
    let path = path.strip_suffix(".git").unwrap_or(path);
    let path = path.trim_end_matches('/');
    Ok(format!("https://{}{}", host, path))
}

/// True for URLs of the form `scheme://github.com/owner/repo[/]`.
pub fn is_supported_repo_url(url: &str) -> bool {
    REPO_URL.is_match(url)
}
