//! Turning raw upstream records into dated, classified releases.
//!
//! - [`release`]: platform releases, reconciling tag name, title and prerelease flag
//! - [`tag`]: plain git tags, dated in a second lookup

pub mod release;
pub mod tag;

use crate::version::Maturity;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub use release::analyse_release;
pub use tag::{PendingTag, analyse_tag, resolve_tag_date};

/// A resolved release: one version, one day-precision date, one permalink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Release {
    pub version: String,
    pub maturity: Maturity,
    pub date: NaiveDate,
    pub page_url: String,
}
