//! Entities and relations: the records a [`crate::KnowledgeGraph`] owns.
//!
//! Relations reference their endpoints by entity id only; resolving an id to
//! an [`Entity`] goes through the graph that owns both.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};
use uuid::Uuid;

use crate::types::{EntityType, RelationType};

/// Open property bag attached to entities and relations.
pub type Properties = BTreeMap<String, serde_json::Value>;

pub(crate) fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Lower-cased, trimmed form used as the alignment key for names.
pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

fn clamp_confidence(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

// ============================================================================
// Entity
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,
    pub name: String,
    pub entity_type: EntityType,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub properties: Properties,
    #[serde(default)]
    pub aliases: Vec<String>,
    pub confidence: f64,
    #[serde(default)]
    pub source: String,
    pub created_at: DateTime<Utc>,
}

impl Entity {
    pub fn new(name: impl Into<String>, entity_type: EntityType) -> Self {
        Self {
            id: new_id(),
            name: name.into(),
            entity_type,
            description: String::new(),
            properties: Properties::new(),
            aliases: Vec::new(),
            confidence: 1.0,
            source: String::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.set_confidence(confidence);
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.add_alias(alias);
        self
    }

    /// Confidence is kept inside `[0, 1]`.
    pub fn set_confidence(&mut self, confidence: f64) {
        self.confidence = clamp_confidence(confidence);
    }

    pub fn normalized_name(&self) -> String {
        normalize_name(&self.name)
    }

    /// A copy under a freshly generated id.
    pub fn with_new_id(&self) -> Entity {
        Entity {
            id: new_id(),
            ..self.clone()
        }
    }

    /// Add an alias unless it (case-insensitively) equals the name or an
    /// existing alias. Returns whether it was added.
    pub fn add_alias(&mut self, alias: impl Into<String>) -> bool {
        let alias = alias.into();
        let key = normalize_name(&alias);
        if key.is_empty() || key == self.normalized_name() || self.has_alias(&alias) {
            return false;
        }
        self.aliases.push(alias.trim().to_string());
        true
    }

    pub fn has_alias(&self, alias: &str) -> bool {
        let key = normalize_name(alias);
        self.aliases.iter().any(|a| normalize_name(a) == key)
    }

    /// Case-insensitive match against the name or any alias.
    pub fn matches_name(&self, name: &str) -> bool {
        self.normalized_name() == normalize_name(name) || self.has_alias(name)
    }

    /// Fold `other` into `self`.
    ///
    /// - aliases are unioned, and `other`'s name becomes an alias when it differs
    /// - properties are unioned, `other` winning on key collisions
    /// - confidence becomes the maximum of the two
    /// - the description of the more confident entity wins (an empty one never does)
    /// - the type of the more confident entity wins; on a tie the smaller type wins
    ///   (`unknown` sorts last), so the outcome does not depend on merge order
    pub fn merge_attributes(&mut self, other: &Entity) {
        if other.name != self.name {
            self.add_alias(other.name.clone());
        }
        for alias in &other.aliases {
            self.add_alias(alias.clone());
        }
        for (key, value) in &other.properties {
            self.properties.insert(key.clone(), value.clone());
        }

        let other_wins = other.confidence > self.confidence;
        if !other.description.is_empty() && (other_wins || self.description.is_empty()) {
            self.description = other.description.clone();
        }

        self.entity_type = if other_wins {
            other.entity_type
        } else if other.confidence < self.confidence {
            self.entity_type
        } else {
            self.entity_type.min(other.entity_type)
        };

        if other_wins {
            self.confidence = other.confidence;
        }
    }
}

impl PartialEq for Entity {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Entity {}

impl Hash for Entity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

// ============================================================================
// Relation
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relation {
    pub id: String,
    #[serde(rename = "head_entity_id")]
    pub head_id: String,
    #[serde(rename = "tail_entity_id")]
    pub tail_id: String,
    pub relation_type: RelationType,
    #[serde(default)]
    pub properties: Properties,
    pub confidence: f64,
    #[serde(default)]
    pub source: String,
    pub created_at: DateTime<Utc>,
}

impl Relation {
    pub fn new(
        head_id: impl Into<String>,
        tail_id: impl Into<String>,
        relation_type: RelationType,
    ) -> Self {
        Self {
            id: new_id(),
            head_id: head_id.into(),
            tail_id: tail_id.into(),
            relation_type,
            properties: Properties::new(),
            confidence: 1.0,
            source: String::new(),
            created_at: Utc::now(),
        }
    }

    /// Relation from `head` to `tail`.
    pub fn between(head: &Entity, tail: &Entity, relation_type: RelationType) -> Self {
        Self::new(head.id.clone(), tail.id.clone(), relation_type)
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.set_confidence(confidence);
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn set_confidence(&mut self, confidence: f64) {
        self.confidence = clamp_confidence(confidence);
    }

    /// Both endpoints set and distinct.
    pub fn is_valid(&self) -> bool {
        !self.head_id.is_empty() && !self.tail_id.is_empty() && self.head_id != self.tail_id
    }

    pub fn is_self_loop(&self) -> bool {
        self.head_id == self.tail_id
    }

    pub fn touches(&self, entity_id: &str) -> bool {
        self.head_id == entity_id || self.tail_id == entity_id
    }

    /// The endpoint opposite `entity_id`, if the relation touches it.
    pub fn other_end(&self, entity_id: &str) -> Option<&str> {
        if self.head_id == entity_id {
            Some(&self.tail_id)
        } else if self.tail_id == entity_id {
            Some(&self.head_id)
        } else {
            None
        }
    }

    /// Same endpoints and type, regardless of id.
    pub fn same_edge(&self, other: &Relation) -> bool {
        self.head_id == other.head_id
            && self.tail_id == other.tail_id
            && self.relation_type == other.relation_type
    }

    /// A copy under a freshly generated id.
    pub fn with_new_id(&self) -> Relation {
        Relation {
            id: new_id(),
            ..self.clone()
        }
    }

    /// A fresh relation pointing the other way.
    pub fn reverse(&self) -> Relation {
        Relation {
            id: new_id(),
            head_id: self.tail_id.clone(),
            tail_id: self.head_id.clone(),
            relation_type: self.relation_type.reversed(),
            properties: self.properties.clone(),
            confidence: self.confidence,
            source: self.source.clone(),
            created_at: Utc::now(),
        }
    }
}

impl PartialEq for Relation {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Relation {}

impl Hash for Relation {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}
