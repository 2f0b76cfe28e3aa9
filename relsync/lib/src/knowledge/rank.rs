use serde::{Deserialize, Serialize};
use std::fmt;

/// Rank of a statement on a knowledge-base item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rank {
    Preferred,
    Normal,
    Deprecated,
}

/// A rank change the reconciliation may ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankTransition {
    /// Mark as the current value.
    Promote,
    /// Mark as superseded.
    Demote,
}

impl Rank {
    /// Parses the wire form (`preferred`, `normal`, `deprecated`).
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "preferred" => Some(Rank::Preferred),
            "normal" => Some(Rank::Normal),
            "deprecated" => Some(Rank::Deprecated),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Rank::Preferred => "preferred",
            Rank::Normal => "normal",
            Rank::Deprecated => "deprecated",
        }
    }

    /// Returns the rank after `transition`, or `None` when nothing changes.
    ///
    /// Claims cycle between normal and preferred. A deprecated claim was
    /// marked by a human and is never touched.
    pub fn transition(self, transition: RankTransition) -> Option<Rank> {
        match (self, transition) {
            (Rank::Normal, RankTransition::Promote) => Some(Rank::Preferred),
            (Rank::Preferred, RankTransition::Demote) => Some(Rank::Normal),
            _ => None,
        }
    }
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
