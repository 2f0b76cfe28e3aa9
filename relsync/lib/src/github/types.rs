//! Typed views of the GitHub REST payloads we consume.
//!
//! JSON is decoded into these structs exactly once, in the client; nothing
//! past this module touches untyped maps.

use chrono::{DateTime, Utc};
use serde::Deserialize;

/// One entry of `GET /repos/{owner}/{repo}/releases`.
#[derive(Debug, Clone, Deserialize)]
pub struct RawRelease {
    /// Tag name (e.g., "v1.2.3")
    #[serde(default)]
    pub tag_name: String,
    /// Release title as shown on the release page
    #[serde(rename = "name", default)]
    pub display_name: Option<String>,
    /// The platform's own prerelease checkbox
    #[serde(rename = "prerelease", default)]
    pub is_prerelease: bool,
    #[serde(default)]
    pub draft: bool,
    /// Null for drafts
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
    /// Canonical permalink of the release page
    #[serde(rename = "html_url", default)]
    pub page_url: String,
}

/// One entry of `GET /repos/{owner}/{repo}/git/refs/tags`.
#[derive(Debug, Clone, Deserialize)]
pub struct RawTag {
    /// Full ref, e.g. `refs/tags/v1.2.3`
    #[serde(rename = "ref")]
    pub ref_name: String,
    #[serde(rename = "object")]
    pub target: TagTarget,
}

impl RawTag {
    /// The tag name without the `refs/tags/` prefix.
    pub fn tag_name(&self) -> &str {
        self.ref_name
            .strip_prefix("refs/tags/")
            .unwrap_or(&self.ref_name)
    }
}

/// The git object a tag ref points at.
#[derive(Debug, Clone, Deserialize)]
pub struct TagTarget {
    #[serde(rename = "type")]
    pub kind: TagObjectKind,
    /// API URL of the tag or commit object
    pub url: String,
}

/// Annotated tags point at a tag object, lightweight tags at a commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagObjectKind {
    Tag,
    Commit,
    #[serde(other)]
    Other,
}

/// Either a `git/tags/{sha}` or a `git/commits/{sha}` payload; only the
/// signature dates matter.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TagObject {
    #[serde(default)]
    pub tagger: Option<Signature>,
    #[serde(default)]
    pub committer: Option<Signature>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Signature {
    #[serde(default)]
    pub date: Option<DateTime<Utc>>,
}

/// `GET /repos/{owner}/{repo}`.
#[derive(Debug, Clone, Deserialize)]
pub struct ProjectInfo {
    pub name: String,
    pub html_url: String,
    #[serde(default)]
    pub homepage: Option<String>,
    #[serde(default)]
    pub license: Option<LicenseInfo>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LicenseInfo {
    #[serde(default)]
    pub spdx_id: Option<String>,
}
