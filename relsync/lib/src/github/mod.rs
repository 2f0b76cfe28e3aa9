//! GitHub as the upstream release source.
//!
//! - [`types`]: serde views of releases, tag refs, tag objects and repository info
//! - [`url`]: repository URL normalization and the owner/name pair
//! - [`gate`]: shared concurrency ceiling plus global rate-limit backoff
//! - [`client`]: the REST client, implementing [`ReleaseSource`](crate::release_set::ReleaseSource)

pub mod client;
pub mod gate;
pub mod types;
pub mod url;

pub use client::{GITHUB_API_BASE_URL, GitHubClient};
pub use gate::RequestGate;
pub use types::{LicenseInfo, ProjectInfo, RawRelease, RawTag, Signature, TagObject, TagObjectKind, TagTarget};
pub use url::{RepoRef, is_supported_repo_url, normalize_repo_url};
