use super::rank::Rank;
use crate::error::{Result, SyncError};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Id of a knowledge-base item, e.g. `Q42`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ItemId(String);

impl ItemId {
    /// Parses `Q<digits>`.
    pub fn parse(raw: &str) -> Result<Self> {
        let digits = raw.strip_prefix('Q').unwrap_or_default();
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(SyncError::Config(format!("not an item id: {:?}", raw)));
        }
        Ok(Self(raw.to_string()))
    }

    /// Takes the last path segment of an entity URI
    /// (`http://www.wikidata.org/entity/Q42` becomes `Q42`).
    pub fn from_entity_uri(uri: &str) -> Result<Self> {
        Self::parse(uri.trim_end_matches('/').rsplit('/').next().unwrap_or_default())
    }

    /// Wraps an id known to be well-formed.
    pub(crate) fn from_static(raw: &'static str) -> Self {
        debug_assert!(Self::parse(raw).is_ok());
        Self(raw.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ItemId {
    type Error = SyncError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<ItemId> for String {
    fn from(id: ItemId) -> Self {
        id.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Statement GUID, `<item>$<uuid>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClaimId(String);

impl ClaimId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The item part of the GUID.
    pub fn item(&self) -> &str {
        self.0.split('$').next().unwrap_or_default()
    }
}

impl fmt::Display for ClaimId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Properties written by the sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Property {
    SoftwareVersion,
    PublicationDate,
    Retrieved,
    ReferenceUrl,
    Title,
    VersionType,
}

impl Property {
    pub fn id(&self) -> &'static str {
        match self {
            Property::SoftwareVersion => "P348",
            Property::PublicationDate => "P577",
            Property::Retrieved => "P813",
            Property::ReferenceUrl => "P854",
            Property::Title => "P1476",
            Property::VersionType => "P548",
        }
    }
}

impl fmt::Display for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// Value of a claim, qualifier or reference snak.
///
/// Only the shapes the sync writes or compares are modeled; anything else is
/// kept as `Unsupported` with its datavalue type so it still round-trips into
/// logs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "kebab-case")]
pub enum ClaimValue {
    String(String),
    Item(ItemId),
    /// Day-precision Gregorian date
    Date(NaiveDate),
    MonolingualText { text: String, language: String },
    Url(String),
    Unsupported(String),
}

impl ClaimValue {
    pub fn string(value: impl Into<String>) -> Self {
        ClaimValue::String(value.into())
    }

    pub fn as_string(&self) -> Option<&str> {
        match self {
            ClaimValue::String(s) | ClaimValue::Url(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for ClaimValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClaimValue::String(s) | ClaimValue::Url(s) => f.write_str(s),
            ClaimValue::Item(id) => write!(f, "{}", id),
            ClaimValue::Date(d) => write!(f, "{}", d),
            ClaimValue::MonolingualText { text, language } => write!(f, "{}@{}", text, language),
            ClaimValue::Unsupported(kind) => write!(f, "<{}>", kind),
        }
    }
}

/// A property/value pair inside a qualifier or reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snak {
    pub property: String,
    pub value: ClaimValue,
}

impl Snak {
    pub fn new(property: Property, value: ClaimValue) -> Self {
        Self {
            property: property.id().to_string(),
            value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    pub id: ClaimId,
    pub property: String,
    pub value: ClaimValue,
    pub rank: Rank,
    #[serde(default)]
    pub qualifiers: Vec<Snak>,
    /// One inner list per reference block
    #[serde(default)]
    pub references: Vec<Vec<Snak>>,
}

impl Claim {
    /// True if a qualifier on `property` points at one of `items`.
    pub fn has_item_qualifier(&self, property: Property, items: &[ItemId]) -> bool {
        self.qualifiers.iter().any(|q| {
            q.property == property.id()
                && matches!(&q.value, ClaimValue::Item(id) if items.contains(id))
        })
    }
}

/// A knowledge-base item with its claims grouped by property id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    /// Revision the claims were read at; rank changes are checked against it
    #[serde(default)]
    pub revision: Option<u64>,
    pub claims: BTreeMap<String, Vec<Claim>>,
}

impl Item {
    pub fn new(id: &ItemId) -> Self {
        Self {
            id: id.clone(),
            revision: None,
            claims: BTreeMap::new(),
        }
    }

    pub fn claims_for(&self, property: Property) -> &[Claim] {
        self.claims
            .get(property.id())
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// First claim on `property` whose value equals `value`.
    pub fn find_claim(&self, property: Property, value: &ClaimValue) -> Option<&Claim> {
        self.claims_for(property).iter().find(|c| &c.value == value)
    }

    pub fn find_claim_by_id(&self, id: &ClaimId) -> Option<&Claim> {
        self.claims.values().flatten().find(|c| &c.id == id)
    }

    pub(crate) fn find_claim_by_id_mut(&mut self, id: &ClaimId) -> Option<&mut Claim> {
        self.claims.values_mut().flatten().find(|c| &c.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claim(id: &str, version: &str, rank: Rank) -> Claim {
        Claim {
            id: ClaimId::new(id),
            property: "P348".to_string(),
            value: ClaimValue::string(version),
            rank,
            qualifiers: vec![],
            references: vec![],
        }
    }

    #[test]
    fn test_item_id_parsing() {
        assert_eq!(ItemId::parse("Q42").unwrap().as_str(), "Q42");
        assert!(ItemId::parse("P42").is_err());
        assert!(ItemId::parse("Q").is_err());
        assert!(ItemId::parse("Q4x").is_err());
        assert_eq!(
            ItemId::from_entity_uri("http://www.wikidata.org/entity/Q1234").unwrap(),
            ItemId::parse("Q1234").unwrap()
        );
    }

    #[test]
    fn test_claim_id_item() {
        assert_eq!(ClaimId::new("Q42$5627445f-43cb").item(), "Q42");
    }

    #[test]
    fn test_find_claim() {
        let mut item = Item::new(&ItemId::parse("Q1").unwrap());
        item.claims.insert(
            "P348".to_string(),
            vec![claim("Q1$a", "1.0", Rank::Normal), claim("Q1$b", "2.0", Rank::Preferred)],
        );

        let found = item
            .find_claim(Property::SoftwareVersion, &ClaimValue::string("2.0"))
            .unwrap();
        assert_eq!(found.id.as_str(), "Q1$b");
        assert!(item.find_claim(Property::SoftwareVersion, &ClaimValue::string("3.0")).is_none());
        assert!(item.claims_for(Property::Title).is_empty());
        assert!(item.find_claim_by_id(&ClaimId::new("Q1$a")).is_some());
    }

    #[test]
    fn test_item_qualifier_check() {
        let lts = ItemId::parse("Q15726348").unwrap();
        let mut c = claim("Q1$a", "1.0", Rank::Preferred);
        assert!(!c.has_item_qualifier(Property::VersionType, std::slice::from_ref(&lts)));

        c.qualifiers.push(Snak::new(Property::VersionType, ClaimValue::Item(lts.clone())));
        assert!(c.has_item_qualifier(Property::VersionType, &[lts]));
    }
}
