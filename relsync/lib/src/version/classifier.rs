//! Heuristic version extraction from free-form release and tag labels.
//!
//! Upstream labels are wildly inconsistent (`v1.2.3`, `Picard 2.0.0beta3`,
//! `REL-1.2`, `4_3_0`, `9.3.2_RC1`, ...). [`extract_version`] strips the usual
//! decorations, detects a maturity keyword and a dotted version number, and
//! returns `None` whenever either step finds more than one candidate.
//!
//! ## Examples
//!
//! ```
//! use relsync_lib::version::{extract_version, Maturity};
//!
//! let classified = extract_version("v1.0.0-beta3", None).unwrap();
//! assert_eq!(classified.maturity(), Maturity::Beta);
//! assert_eq!(classified.version(), "1.0.0-beta3");
//!
//! assert!(extract_version("2016-10-12", None).is_none());
//! ```

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::LazyLock;

/// Release-word prefixes such as `release-`, `REL_`, `version/` or `v.`.
static RELEASE_WORD_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(releases|release|rel|version|vers|v\.)[ _/-]?").expect("valid regex")
});

/// A bare `v`/`r` (optionally followed by `_`) directly in front of a digit.
static BARE_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^[vr]_?(\d)").expect("valid regex"));

/// A `final` / `release` token together with the separators around it.
static RELEASE_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(^|[._ -])(final|release)([._ -]|$)").expect("valid regex")
});

static DIGITS_UNDERSCORES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9_]*$").expect("valid regex"));

static DIGITS_HYPHENS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9-]*$").expect("valid regex"));

/// Maturity keywords. `pre` precedes `preview`, so `preview` is reported as `pre`.
static MATURITY_WORDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(stable|beta|alpha|rc|pre|preview|b\d|dev)").expect("valid regex")
});

/// Dotted numeric groups with an optional letter, maturity suffix or `-N` build.
static VERSION_NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(?:\s|^)(\d{1,3}(?:\.\d{1,3})+[a-z]?(?:[._ -]?(?:alpha|beta|pre|rc|b|stable|preview|dev)[._-]?\d*|-\d+)?)(?:\s|$)",
    )
    .expect("valid regex")
});

static EMBEDDED_STABLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)[._-]stable[._-]?").expect("valid regex"));

/// A bare number is accepted when it is short and has no leading zero.
static BARE_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[1-9]\d{0,4}$").expect("valid regex"));

/// Maturity of a release as inferred from its label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Maturity {
    Stable,
    Beta,
    Alpha,
    Rc,
    /// Anything that is clearly not a release but has no specific keyword
    /// (`pre`, `preview`, `dev`), and stable-looking labels the platform
    /// flagged as prerelease.
    Unstable,
}

impl Maturity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Maturity::Stable => "stable",
            Maturity::Beta => "beta",
            Maturity::Alpha => "alpha",
            Maturity::Rc => "rc",
            Maturity::Unstable => "unstable",
        }
    }

    pub fn is_stable(&self) -> bool {
        *self == Maturity::Stable
    }

    /// Maps a matched keyword onto a maturity.
    fn from_keyword(keyword: &str) -> Self {
        let keyword = keyword.to_lowercase();
        if keyword.starts_with('b') {
            return Maturity::Beta;
        }
        match keyword.as_str() {
            "stable" => Maturity::Stable,
            "alpha" => Maturity::Alpha,
            "rc" => Maturity::Rc,
            _ => Maturity::Unstable,
        }
    }
}

impl fmt::Display for Maturity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A label that was successfully classified.
///
/// The version string is never empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassifiedVersion {
    maturity: Maturity,
    version: String,
}

impl ClassifiedVersion {
    /// Returns `None` for an empty version.
    pub fn new(maturity: Maturity, version: impl Into<String>) -> Option<Self> {
        let version = version.into();
        if version.is_empty() {
            return None;
        }
        Some(Self { maturity, version })
    }

    pub fn maturity(&self) -> Maturity {
        self.maturity
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn into_parts(self) -> (Maturity, String) {
        (self.maturity, self.version)
    }
}

impl fmt::Display for ClassifiedVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.version, self.maturity)
    }
}

fn distinct_ignoring_case<'a>(values: impl IntoIterator<Item = &'a str>) -> usize {
    values
        .into_iter()
        .map(str::to_lowercase)
        .collect::<HashSet<_>>()
        .len()
}

/// `label` without a leading `name` (any case) and the separator after it.
fn strip_name_prefix<'a>(label: &'a str, name: &str) -> Option<&'a str> {
    let head = label.get(..name.len())?;
    if head.to_lowercase() != name.to_lowercase() {
        return None;
    }
    label[name.len()..].strip_prefix([' ', '_', '/', '-'])
}

/// Strips the project name, release words and `final`/`release` markers, and
/// turns `4_3_0`/`4-3-0` into `4.3.0`.
fn normalize_label(raw: &str, project_name: Option<&str>) -> String {
    let mut label = raw.trim();
    if let Some(name) = project_name.filter(|n| !n.trim().is_empty())
        && let Some(rest) = strip_name_prefix(label, name)
    {
        label = rest;
    }

    let mut label = RELEASE_WORD_PREFIX.replace(label, "").into_owned();
    label = BARE_PREFIX.replace(&label, "$1").into_owned();
    label = RELEASE_MARKER.replace_all(&label, "").into_owned();

    // Only pure digit runs get their separators rewritten, so words survive.
    if DIGITS_UNDERSCORES.is_match(&label) {
        label = label.replace('_', ".");
    }
    if DIGITS_HYPHENS.is_match(&label) {
        label = label.replace('-', ".");
    }
    label
}

/// Extracts a normalized version and its maturity from a release or tag label.
///
/// `project_name` is stripped when the label starts with it followed by a
/// separator (`program-1.2`, `Program 1.2`).
///
/// Returns `None` when no version is found, when the label carries more than
/// one distinct maturity keyword, or when it contains more than one distinct
/// version number.
pub fn extract_version(raw: &str, project_name: Option<&str>) -> Option<ClassifiedVersion> {
    let label = normalize_label(raw, project_name);

    let keywords: Vec<&str> = MATURITY_WORDS
        .find_iter(&label)
        .map(|m| m.as_str())
        .collect();
    let maturity = match distinct_ignoring_case(keywords.iter().copied()) {
        0 => None,
        1 => Some(Maturity::from_keyword(keywords[0])),
        _ => return None,
    };

    let candidates: Vec<String> = VERSION_NUMBER
        .captures_iter(&label)
        .filter_map(|caps| caps.get(1))
        .map(|m| EMBEDDED_STABLE.replace_all(m.as_str(), "").into_owned())
        .collect();

    let version = if distinct_ignoring_case(candidates.iter().map(String::as_str)) == 1 {
        candidates.into_iter().next()?
    } else if BARE_NUMBER.is_match(&label) {
        label
    } else {
        return None;
    };

    ClassifiedVersion::new(maturity.unwrap_or(Maturity::Stable), version)
}
