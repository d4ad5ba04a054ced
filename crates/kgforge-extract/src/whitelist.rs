//! Accepted (head type, tail type, relation type) combinations.

use kgforge_model::{EntityType, RelationType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use kgforge_model::EntityType as E;
use kgforge_model::RelationType as R;

/// Types produced by text extraction; any two may be `related_to`.
const TEXT_TYPES: [EntityType; 6] = [
    E::Person,
    E::Organization,
    E::Location,
    E::Concept,
    E::Keyword,
    E::Document,
];

const BASE_TRIPLES: &[(EntityType, EntityType, RelationType)] = &[
    // schema structure
    (E::Database, E::Table, R::Contains),
    (E::Table, E::Column, R::Contains),
    (E::Database, E::Column, R::Contains),
    (E::Column, E::Column, R::ForeignKey),
    (E::Table, E::Table, R::SimilarTo),
    (E::Table, E::Table, R::Synonyms),
    // documents
    (E::Document, E::Concept, R::Mentions),
    (E::Document, E::Keyword, R::Mentions),
    (E::Document, E::Concept, R::Contains),
    (E::Document, E::Keyword, R::Contains),
    (E::Document, E::Concept, R::Describes),
    (E::Document, E::Keyword, R::Describes),
    // people and organisations
    (E::Person, E::Organization, R::BelongsTo),
    (E::Organization, E::Person, R::Contains),
    (E::Organization, E::Organization, R::BelongsTo),
    (E::Organization, E::Organization, R::Contains),
    // places
    (E::Location, E::Location, R::BelongsTo),
    (E::Location, E::Location, R::Contains),
    (E::Organization, E::Location, R::BelongsTo),
    // concepts
    (E::Concept, E::Concept, R::SimilarTo),
    (E::Concept, E::Concept, R::Synonyms),
    (E::Concept, E::Concept, R::BelongsTo),
    (E::Concept, E::Concept, R::Contains),
    (E::Concept, E::Concept, R::Describes),
    (E::Concept, E::Concept, R::DependsOn),
    (E::Keyword, E::Keyword, R::SimilarTo),
    (E::Keyword, E::Keyword, R::Synonyms),
];

/// A relation is accepted only if its typed triple is listed here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationWhitelist {
    triples: BTreeSet<(EntityType, EntityType, RelationType)>,
}

impl RelationWhitelist {
    pub fn empty() -> Self {
        Self {
            triples: BTreeSet::new(),
        }
    }

    pub fn allows(&self, head: EntityType, tail: EntityType, relation: RelationType) -> bool {
        self.triples.contains(&(head, tail, relation))
    }

    pub fn allow(&mut self, head: EntityType, tail: EntityType, relation: RelationType) -> &mut Self {
        self.triples.insert((head, tail, relation));
        self
    }

    pub fn deny(&mut self, head: EntityType, tail: EntityType, relation: RelationType) -> &mut Self {
        self.triples.remove(&(head, tail, relation));
        self
    }

    pub fn len(&self) -> usize {
        self.triples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triples.is_empty()
    }
}

impl Default for RelationWhitelist {
    fn default() -> Self {
        let mut triples: BTreeSet<_> = BASE_TRIPLES.iter().copied().collect();
        for head in TEXT_TYPES {
            for tail in TEXT_TYPES {
                triples.insert((head, tail, R::RelatedTo));
            }
        }
        Self { triples }
    }
}
