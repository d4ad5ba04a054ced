//! Closed vocabularies for entity and relation kinds.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Failure to parse a type name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} `{value}`")]
pub struct ParseTypeError {
    pub kind: &'static str,
    pub value: String,
}

// ============================================================================
// Entity types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Person,
    Organization,
    Location,
    Concept,
    Table,
    Column,
    Database,
    Document,
    Keyword,
    Unknown,
}

impl EntityType {
    pub const ALL: [EntityType; 10] = [
        EntityType::Person,
        EntityType::Organization,
        EntityType::Location,
        EntityType::Concept,
        EntityType::Table,
        EntityType::Column,
        EntityType::Database,
        EntityType::Document,
        EntityType::Keyword,
        EntityType::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Person => "person",
            EntityType::Organization => "organization",
            EntityType::Location => "location",
            EntityType::Concept => "concept",
            EntityType::Table => "table",
            EntityType::Column => "column",
            EntityType::Database => "database",
            EntityType::Document => "document",
            EntityType::Keyword => "keyword",
            EntityType::Unknown => "unknown",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = ParseTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        EntityType::ALL
            .into_iter()
            .find(|t| t.as_str() == needle)
            .ok_or_else(|| ParseTypeError {
                kind: "entity type",
                value: s.to_string(),
            })
    }
}

// ============================================================================
// Relation types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationType {
    Contains,
    BelongsTo,
    References,
    SimilarTo,
    RelatedTo,
    DependsOn,
    ForeignKey,
    Mentions,
    Describes,
    Synonyms,
}

impl RelationType {
    pub const ALL: [RelationType; 10] = [
        RelationType::Contains,
        RelationType::BelongsTo,
        RelationType::References,
        RelationType::SimilarTo,
        RelationType::RelatedTo,
        RelationType::DependsOn,
        RelationType::ForeignKey,
        RelationType::Mentions,
        RelationType::Describes,
        RelationType::Synonyms,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RelationType::Contains => "contains",
            RelationType::BelongsTo => "belongs_to",
            RelationType::References => "references",
            RelationType::SimilarTo => "similar_to",
            RelationType::RelatedTo => "related_to",
            RelationType::DependsOn => "depends_on",
            RelationType::ForeignKey => "foreign_key",
            RelationType::Mentions => "mentions",
            RelationType::Describes => "describes",
            RelationType::Synonyms => "synonyms",
        }
    }

    /// Relations that hold in both directions.
    pub fn is_symmetric(&self) -> bool {
        matches!(self, RelationType::SimilarTo | RelationType::Synonyms)
    }

    /// The type carried by the reversed edge.
    pub fn reversed(&self) -> RelationType {
        match self {
            RelationType::Contains => RelationType::BelongsTo,
            RelationType::BelongsTo => RelationType::Contains,
            other => *other,
        }
    }
}

impl fmt::Display for RelationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RelationType {
    type Err = ParseTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        RelationType::ALL
            .into_iter()
            .find(|t| t.as_str() == needle)
            .ok_or_else(|| ParseTypeError {
                kind: "relation type",
                value: s.to_string(),
            })
    }
}

/// Which endpoint of a relation an entity must occupy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Entity is the tail.
    In,
    /// Entity is the head.
    Out,
    #[default]
    Both,
}
