use super::Release;
use crate::github::RawRelease;
use crate::version::{Maturity, extract_version};
use tracing::{debug, info};

/// Classifies one platform release.
///
/// The tag name and the display name are classified independently. If both
/// yield a result and they disagree, the release is rejected; otherwise the
/// tag name wins, falling back to whichever one classified.
///
/// The platform's prerelease flag is then cross-checked: an unflagged release
/// that classifies as non-stable keeps its classified maturity (prereleases
/// are often not flagged), while a flagged release that looks stable is
/// downgraded to [`Maturity::Unstable`].
///
/// Drafts and releases without a publication date are rejected.
pub fn analyse_release(raw: &RawRelease, project_name: &str) -> Option<Release> {
    if raw.draft {
        debug!(tag = %raw.tag_name, "Skipping draft release");
        return None;
    }

    let from_tag = extract_version(&raw.tag_name, Some(project_name));
    let from_name = raw
        .display_name
        .as_deref()
        .and_then(|name| extract_version(name, Some(project_name)));

    let (classified, original) = match (from_tag, from_name) {
        (Some(tag), Some(name)) if tag != name => {
            info!(
                tag_name = %raw.tag_name,
                name = raw.display_name.as_deref().unwrap_or_default(),
                from_tag = %tag,
                from_name = %name,
                project = project_name,
                "Conflicting versions"
            );
            return None;
        }
        (Some(tag), _) => (tag, raw.tag_name.as_str()),
        (None, Some(name)) => (name, raw.display_name.as_deref().unwrap_or_default()),
        (None, None) => return None,
    };

    let (mut maturity, version) = classified.into_parts();
    if !raw.is_prerelease && !maturity.is_stable() {
        info!(label = original, %maturity, "Unflagged prerelease");
    } else if raw.is_prerelease && maturity.is_stable() {
        maturity = Maturity::Unstable;
    }

    let Some(published_at) = raw.published_at else {
        info!(label = original, "Release has no publication date");
        return None;
    };

    Some(Release {
        version,
        maturity,
        date: published_at.date_naive(),
        page_url: raw.page_url.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};

    fn raw(tag: &str, name: Option<&str>, prerelease: bool) -> RawRelease {
        RawRelease {
            tag_name: tag.to_string(),
            display_name: name.map(str::to_string),
            is_prerelease: prerelease,
            draft: false,
            published_at: Some(Utc.with_ymd_and_hms(2024, 1, 15, 23, 59, 59).unwrap()),
            page_url: format!("https://github.com/owner/program/releases/tag/{}", tag),
        }
    }

    #[test]
    fn test_tag_and_name_agree() {
        let release = analyse_release(&raw("v1.2.3", Some("program 1.2.3"), false), "program").unwrap();
        assert_eq!(release.version, "1.2.3");
        assert_eq!(release.maturity, Maturity::Stable);
        assert_eq!(release.date, NaiveDate::from_ymd_opt(2024, 1, 15).unwrap());
        assert_eq!(
            release.page_url,
            "https://github.com/owner/program/releases/tag/v1.2.3"
        );
    }

    #[test]
    fn test_disagreement_is_rejected() {
        assert!(analyse_release(&raw("v1.2.3", Some("1.2.4"), false), "program").is_none());
        // Same version, different maturity.
        assert!(analyse_release(&raw("v1.2", Some("1.2 beta"), false), "program").is_none());
    }

    #[test]
    fn test_single_source_is_used() {
        let release = analyse_release(&raw("nightly", Some("Version 2.0"), false), "program").unwrap();
        assert_eq!(release.version, "2.0");

        let release = analyse_release(&raw("v3.1", Some("The big one"), false), "program").unwrap();
        assert_eq!(release.version, "3.1");

        let release = analyse_release(&raw("v3.1", None, false), "program").unwrap();
        assert_eq!(release.version, "3.1");

        assert!(analyse_release(&raw("nightly", Some("latest"), false), "program").is_none());
    }

    #[test]
    fn test_unflagged_prerelease_keeps_classified_maturity() {
        let release = analyse_release(&raw("v2.0-rc1", None, false), "program").unwrap();
        assert_eq!(release.maturity, Maturity::Rc);
    }

    #[test]
    fn test_flagged_prerelease_is_never_stable() {
        let release = analyse_release(&raw("v2.0", None, true), "program").unwrap();
        assert_eq!(release.maturity, Maturity::Unstable);

        let release = analyse_release(&raw("v2.0-beta1", None, true), "program").unwrap();
        assert_eq!(release.maturity, Maturity::Beta);
    }

    #[test]
    fn test_drafts_and_undated_releases_are_rejected() {
        let mut draft = raw("v1.0", None, false);
        draft.draft = true;
        assert!(analyse_release(&draft, "program").is_none());

        let mut undated = raw("v1.0", None, false);
        undated.published_at = None;
        assert!(analyse_release(&undated, "program").is_none());
    }

    use proptest::prelude::*;

    fn label() -> impl Strategy<Value = String> {
        prop_oneof![
            "(v|program |release-)?[0-9]{1,2}\\.[0-9]{1,2}(-beta|-rc1|alpha|\\.Final)?",
            "\\PC{0,20}",
        ]
    }

    proptest! {
        #[test]
        fn disagreeing_tag_and_name_are_always_rejected(
            tag in label(),
            name in label(),
            prerelease in any::<bool>()
        ) {
            let from_tag = extract_version(&tag, Some("program"));
            let from_name = extract_version(&name, Some("program"));
            let release = analyse_release(&raw(&tag, Some(name.as_str()), prerelease), "program");
            match (from_tag, from_name) {
                (Some(a), Some(b)) if a != b => prop_assert!(release.is_none()),
                (Some(a), _) | (None, Some(a)) => {
                    let release = release.expect("a classified label yields a release");
                    prop_assert_eq!(release.version.as_str(), a.version());
                }
                (None, None) => prop_assert!(release.is_none()),
            }
        }
    }
}
