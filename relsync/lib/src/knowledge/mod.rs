//! The knowledge base whose release claims are kept in sync.
//!
//! - [`model`]: typed items, claims and values
//! - [`rank`]: statement ranks and their transitions
//! - [`memory`]: in-memory implementation for tests and dry runs
//! - [`wikibase`]: MediaWiki action API client
//!
//! Every mutation carries the run's [`EditGroup`] so edits can be reviewed
//! and reverted as a batch.

pub mod memory;
pub mod model;
pub mod rank;
pub mod wikibase;

pub use memory::{MemoryKnowledgeBase, Mutation};
pub use model::{Claim, ClaimId, ClaimValue, Item, ItemId, Property, Snak};
pub use rank::{Rank, RankTransition};
pub use wikibase::{WIKIDATA_API_URL, WikibaseClient};

use crate::BoxFuture;
use crate::error::Result;
use std::process;
use std::time::{SystemTime, UNIX_EPOCH};
use xxhash_rust::xxh3::xxh3_64;

/// Write access to knowledge-base items.
///
/// Mutations are atomic per call only; nothing groups them into a
/// transaction.
pub trait KnowledgeBase: Send + Sync {
    /// Fetches the current state of an item.
    fn get_item<'a>(&'a self, id: &'a ItemId) -> BoxFuture<'a, Result<Item>>;

    /// Adds a new claim with normal rank and returns its id.
    fn create_claim<'a>(
        &'a self,
        item: &'a ItemId,
        property: Property,
        value: &'a ClaimValue,
        edit: &'a EditGroup,
    ) -> BoxFuture<'a, Result<ClaimId>>;

    fn add_qualifier<'a>(
        &'a self,
        claim: &'a ClaimId,
        property: Property,
        value: &'a ClaimValue,
        edit: &'a EditGroup,
    ) -> BoxFuture<'a, Result<()>>;

    /// Adds one reference block made of `sources`.
    fn add_sources<'a>(
        &'a self,
        claim: &'a ClaimId,
        sources: &'a [Snak],
        edit: &'a EditGroup,
    ) -> BoxFuture<'a, Result<()>>;

    /// Changes the rank of `claim`.
    ///
    /// With a `base_revision`, the write fails with an edit conflict when
    /// someone else changed the item after that revision.
    fn set_rank<'a>(
        &'a self,
        claim: &'a ClaimId,
        rank: Rank,
        base_revision: Option<u64>,
        edit: &'a EditGroup,
    ) -> BoxFuture<'a, Result<()>>;
}

/// Audit identifier shared by every edit of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditGroup {
    hash: String,
}

impl EditGroup {
    pub fn new(hash: impl Into<String>) -> Self {
        Self { hash: hash.into() }
    }

    /// A fresh 48-bit hex identifier for this run.
    pub fn random() -> Self {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        let mut seed = nanos.to_le_bytes().to_vec();
        seed.extend_from_slice(&process::id().to_le_bytes());
        Self::new(format!("{:x}", xxh3_64(&seed) & 0xffff_ffff_ffff))
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    /// Edit summary linking to the edit group tool.
    pub fn summary(&self) -> String {
        format!(
            "Update with GitHub data ([[:toollabs:editgroups/b/CB/{}|details]])",
            self.hash
        )
    }
}
