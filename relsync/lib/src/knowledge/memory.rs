use super::model::{Claim, ClaimId, ClaimValue, Item, ItemId, Property, Snak};
use super::rank::Rank;
use super::{EditGroup, KnowledgeBase};
use crate::BoxFuture;
use crate::error::{Result, SyncError};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// One write, as recorded by [`MemoryKnowledgeBase`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Mutation {
    CreateClaim {
        item: String,
        claim: ClaimId,
        property: String,
        value: ClaimValue,
    },
    AddQualifier {
        claim: ClaimId,
        property: String,
        value: ClaimValue,
    },
    AddSources {
        claim: ClaimId,
        sources: Vec<Snak>,
    },
    SetRank {
        claim: ClaimId,
        rank: Rank,
    },
}

impl fmt::Display for Mutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mutation::CreateClaim { item, property, value, .. } => {
                write!(f, "create {} {} = {}", item, property, value)
            }
            Mutation::AddQualifier { claim, property, value } => {
                write!(f, "qualify {} with {} = {}", claim, property, value)
            }
            Mutation::AddSources { claim, sources } => {
                write!(f, "add {} sources to {}", sources.len(), claim)
            }
            Mutation::SetRank { claim, rank } => write!(f, "set rank of {} to {}", claim, rank),
        }
    }
}

/// Knowledge base held in memory.
///
/// Records every mutation in order. Seeded with a fetched item it doubles as
/// the dry-run sink: the reconciliation runs unchanged and the log shows what
/// would have been written.
#[derive(Debug, Default)]
pub struct MemoryKnowledgeBase {
    items: Mutex<BTreeMap<String, Item>>,
    mutations: Mutex<Vec<Mutation>>,
    conflicts: Mutex<HashSet<ClaimId>>,
    /// Latest revision per item written by someone other than us
    foreign_revisions: Mutex<HashMap<String, u64>>,
    failing_reads: AtomicUsize,
    next_id: AtomicUsize,
}

impl MemoryKnowledgeBase {
    pub fn new() -> Self {
        Self::default()
    }

    /// A knowledge base holding a copy of `item`.
    pub fn seeded(item: Item) -> Self {
        let kb = Self::new();
        kb.insert(item);
        kb
    }

    pub fn insert(&self, item: Item) {
        lock(&self.items).insert(item.id.to_string(), item);
    }

    pub fn item(&self, id: &ItemId) -> Option<Item> {
        lock(&self.items).get(id.as_str()).cloned()
    }

    /// All mutations so far, oldest first.
    pub fn mutations(&self) -> Vec<Mutation> {
        lock(&self.mutations).clone()
    }

    pub fn clear_mutations(&self) {
        lock(&self.mutations).clear();
    }

    /// Makes every rank change on `claim` fail with an edit conflict.
    pub fn inject_conflict(&self, claim: ClaimId) {
        lock(&self.conflicts).insert(claim);
    }

    /// Records an edit to `id` by another user, bumping its revision.
    ///
    /// Rank changes based on an earlier revision then fail with an edit
    /// conflict; our own edits in between never do.
    pub fn edit_externally(&self, id: &ItemId) {
        let mut items = lock(&self.items);
        let item = items
            .entry(id.to_string())
            .or_insert_with(|| Item::new(id));
        let revision = bump(item);
        lock(&self.foreign_revisions).insert(id.to_string(), revision);
    }

    /// Makes the next `count` item reads fail with an API error.
    pub fn fail_next_reads(&self, count: usize) {
        self.failing_reads.store(count, Ordering::SeqCst);
    }

    fn record(&self, mutation: Mutation) {
        lock(&self.mutations).push(mutation);
    }

    fn with_claim<T>(&self, id: &ClaimId, f: impl FnOnce(&mut Claim) -> T) -> Result<T> {
        let mut items = lock(&self.items);
        let item = items
            .get_mut(id.item())
            .filter(|item| item.find_claim_by_id(id).is_some())
            .ok_or_else(|| SyncError::NotFound(format!("claim {}", id)))?;
        bump(item);
        let claim = item
            .find_claim_by_id_mut(id)
            .ok_or_else(|| SyncError::NotFound(format!("claim {}", id)))?;
        Ok(f(claim))
    }

    fn conflicts_with(&self, claim: &ClaimId, base_revision: Option<u64>) -> bool {
        if lock(&self.conflicts).contains(claim) {
            return true;
        }
        let foreign = lock(&self.foreign_revisions).get(claim.item()).copied();
        matches!((base_revision, foreign), (Some(base), Some(foreign)) if foreign > base)
    }
}

fn bump(item: &mut Item) -> u64 {
    let revision = item.revision.unwrap_or(0) + 1;
    item.revision = Some(revision);
    revision
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl KnowledgeBase for MemoryKnowledgeBase {
    fn get_item<'a>(&'a self, id: &'a ItemId) -> BoxFuture<'a, Result<Item>> {
        Box::pin(async move {
            let failing = self
                .failing_reads
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
            if failing.is_ok() {
                return Err(SyncError::KnowledgeBase {
                    code: "internal_api_error".to_string(),
                    info: format!("injected read failure for {}", id),
                    messages: vec![],
                });
            }
            Ok(self.item(id).unwrap_or_else(|| Item::new(id)))
        })
    }

    fn create_claim<'a>(
        &'a self,
        item: &'a ItemId,
        property: Property,
        value: &'a ClaimValue,
        _edit: &'a EditGroup,
    ) -> BoxFuture<'a, Result<ClaimId>> {
        Box::pin(async move {
            let n = self.next_id.fetch_add(1, Ordering::SeqCst);
            let id = ClaimId::new(format!("{}$relsync-{}", item, n));
            {
                let mut items = lock(&self.items);
                let entry = items
                    .entry(item.to_string())
                    .or_insert_with(|| Item::new(item));
                bump(entry);
                entry
                    .claims
                    .entry(property.id().to_string())
                    .or_default()
                    .push(Claim {
                        id: id.clone(),
                        property: property.id().to_string(),
                        value: value.clone(),
                        rank: Rank::Normal,
                        qualifiers: vec![],
                        references: vec![],
                    });
            }
            self.record(Mutation::CreateClaim {
                item: item.to_string(),
                claim: id.clone(),
                property: property.id().to_string(),
                value: value.clone(),
            });
            Ok(id)
        })
    }

    fn add_qualifier<'a>(
        &'a self,
        claim: &'a ClaimId,
        property: Property,
        value: &'a ClaimValue,
        _edit: &'a EditGroup,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.with_claim(claim, |c| {
                c.qualifiers.push(Snak::new(property, value.clone()));
            })?;
            self.record(Mutation::AddQualifier {
                claim: claim.clone(),
                property: property.id().to_string(),
                value: value.clone(),
            });
            Ok(())
        })
    }

    fn add_sources<'a>(
        &'a self,
        claim: &'a ClaimId,
        sources: &'a [Snak],
        _edit: &'a EditGroup,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.with_claim(claim, |c| c.references.push(sources.to_vec()))?;
            self.record(Mutation::AddSources {
                claim: claim.clone(),
                sources: sources.to_vec(),
            });
            Ok(())
        })
    }

    fn set_rank<'a>(
        &'a self,
        claim: &'a ClaimId,
        rank: Rank,
        base_revision: Option<u64>,
        _edit: &'a EditGroup,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            if self.conflicts_with(claim, base_revision) {
                return Err(SyncError::EditConflict(claim.to_string()));
            }
            self.with_claim(claim, |c| c.rank = rank)?;
            self.record(Mutation::SetRank {
                claim: claim.clone(),
                rank,
            });
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn q(id: &str) -> ItemId {
        ItemId::parse(id).unwrap()
    }

    #[tokio::test]
    async fn test_create_and_rank_are_recorded() {
        let kb = MemoryKnowledgeBase::new();
        let edit = EditGroup::new("abc");
        let item = q("Q1");

        let id = kb
            .create_claim(&item, Property::SoftwareVersion, &ClaimValue::string("1.0"), &edit)
            .await
            .unwrap();
        assert_eq!(id.item(), "Q1");
        kb.set_rank(&id, Rank::Preferred, None, &edit).await.unwrap();

        let stored = kb.get_item(&item).await.unwrap();
        let claim = stored
            .find_claim(Property::SoftwareVersion, &ClaimValue::string("1.0"))
            .unwrap();
        assert_eq!(claim.rank, Rank::Preferred);

        let mutations = kb.mutations();
        assert_eq!(mutations.len(), 2);
        assert!(matches!(mutations[1], Mutation::SetRank { rank: Rank::Preferred, .. }));
    }

    #[tokio::test]
    async fn test_unknown_item_reads_as_empty() {
        let kb = MemoryKnowledgeBase::new();
        let item = kb.get_item(&q("Q7")).await.unwrap();
        assert_eq!(item.id.as_str(), "Q7");
        assert!(item.claims.is_empty());
    }

    #[tokio::test]
    async fn test_injected_conflict() {
        let kb = MemoryKnowledgeBase::new();
        let edit = EditGroup::new("abc");
        let id = kb
            .create_claim(&q("Q1"), Property::SoftwareVersion, &ClaimValue::string("1.0"), &edit)
            .await
            .unwrap();
        kb.inject_conflict(id.clone());

        let err = kb.set_rank(&id, Rank::Preferred, None, &edit).await.unwrap_err();
        assert!(err.is_edit_conflict());
        assert_eq!(kb.mutations().len(), 1);
    }

    #[tokio::test]
    async fn test_foreign_edit_after_base_revision_conflicts() {
        let kb = MemoryKnowledgeBase::new();
        let edit = EditGroup::new("abc");
        let id = kb
            .create_claim(&q("Q1"), Property::SoftwareVersion, &ClaimValue::string("1.0"), &edit)
            .await
            .unwrap();
        let base = kb.get_item(&q("Q1")).await.unwrap().revision;
        assert!(base.is_some());

        // Our own later edits don't count against the base revision.
        kb.add_qualifier(&id, Property::VersionType, &ClaimValue::Item(q("Q2804309")), &edit)
            .await
            .unwrap();
        kb.set_rank(&id, Rank::Preferred, base, &edit).await.unwrap();

        kb.edit_externally(&q("Q1"));
        let err = kb.set_rank(&id, Rank::Normal, base, &edit).await.unwrap_err();
        assert!(err.is_edit_conflict());

        let fresh = kb.get_item(&q("Q1")).await.unwrap().revision;
        kb.set_rank(&id, Rank::Normal, fresh, &edit).await.unwrap();
    }

    #[tokio::test]
    async fn test_failing_reads_run_out() {
        let kb = MemoryKnowledgeBase::new();
        kb.fail_next_reads(1);
        assert!(kb.get_item(&q("Q1")).await.is_err());
        assert!(kb.get_item(&q("Q1")).await.is_ok());
    }

    #[tokio::test]
    async fn test_mutating_unknown_claim_is_not_found() {
        let kb = MemoryKnowledgeBase::new();
        let edit = EditGroup::new("abc");
        let err = kb
            .set_rank(&ClaimId::new("Q1$missing"), Rank::Normal, None, &edit)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
