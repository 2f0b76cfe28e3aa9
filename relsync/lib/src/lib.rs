//! Keeps knowledge-base release claims in sync with GitHub releases.
//!
//! The pipeline for one project:
//!
//! 1. [`version`] classifies free-form release and tag labels
//! 2. [`analysis`] turns raw releases and tags into dated [`Release`]s
//! 3. [`release_set`] pages through the upstream and keeps the stable ones
//! 4. [`reconcile`] diffs them against the item's claims and writes the changes
//!
//! [`runner`] drives that over many projects; [`github`] and [`knowledge`]
//! hold the two network collaborators.

use std::future::Future;
use std::pin::Pin;

pub mod analysis;
pub mod config;
pub mod error;
pub mod github;
pub mod knowledge;
pub mod project;
pub mod reconcile;
pub mod release_set;
pub mod runner;
pub mod version;

pub use analysis::Release;
pub use config::SyncConfig;
pub use error::{Result, SyncError};
pub use project::{Project, ProjectSelection};
pub use reconcile::{ReconcileOutcome, ReconcilePolicy, ReconcileReport, ReconciliationEngine};
pub use release_set::{ReleaseSet, ReleaseSetBuilder, ReleaseSource};
pub use runner::{BatchSummary, ProjectOutcome, ProjectStatus, SyncContext, run_batch, sync_project};
pub use version::{ClassifiedVersion, Maturity, extract_version};

/// Boxed future used by the dyn-compatible collaborator traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
