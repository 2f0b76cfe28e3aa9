use super::Release;
use crate::error::{Result, SyncError};
use crate::github::{ProjectInfo, RawTag, TagObject, TagObjectKind};
use crate::version::{Maturity, extract_version};
use url::form_urlencoded;

/// A classified tag whose date still has to be looked up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTag {
    pub version: String,
    pub maturity: Maturity,
    /// Release page for the tag on the platform
    pub page_url: String,
    /// API URL of the tag or commit object carrying the date
    pub object_url: String,
    pub object_kind: TagObjectKind,
}

/// Classifies a git tag ref.
///
/// Tags carry no prerelease flag, so only the ref name is classified. Names
/// that don't classify are pushed to `invalid` for the caller to report.
pub fn analyse_tag(raw: &RawTag, project: &ProjectInfo, invalid: &mut Vec<String>) -> Option<PendingTag> {
    let tag_name = raw.tag_name();
    let Some(classified) = extract_version(tag_name, Some(&project.name)) else {
        invalid.push(tag_name.to_string());
        return None;
    };

    let encoded: String = form_urlencoded::byte_serialize(tag_name.as_bytes()).collect();
    let (maturity, version) = classified.into_parts();
    Some(PendingTag {
        version,
        maturity,
        page_url: format!(
            "{}/releases/tag/{}",
            project.html_url.trim_end_matches('/'),
            encoded
        ),
        object_url: raw.target.url.clone(),
        object_kind: raw.target.kind,
    })
}

/// Completes a pending tag with the date from its git object.
///
/// Annotated tags are dated by their tagger, lightweight tags by the commit's
/// committer. A missing date is an error; no date is ever made up.
///
/// ## Errors
///
/// - `SyncError::MissingDate` if the relevant signature has no date
/// - `SyncError::UnknownTagType` if the ref points at neither a tag nor a commit
pub fn resolve_tag_date(pending: PendingTag, object: &TagObject) -> Result<Release> {
    let signature = match pending.object_kind {
        TagObjectKind::Tag => object.tagger.as_ref(),
        TagObjectKind::Commit => object.committer.as_ref(),
        TagObjectKind::Other => return Err(SyncError::UnknownTagType(pending.object_url)),
    };
    let date = signature
        .and_then(|s| s.date)
        .ok_or_else(|| SyncError::MissingDate(pending.object_url.clone()))?;

    Ok(Release {
        version: pending.version,
        maturity: pending.maturity,
        date: date.date_naive(),
        page_url: pending.page_url,
    })
}
