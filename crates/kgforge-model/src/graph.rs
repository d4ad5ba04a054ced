//! The [`KnowledgeGraph`] container.
//!
//! Entities and relations live in two id-keyed maps. Two derived indexes group
//! ids by entity type and by relation type; every mutator keeps them in step
//! with the primary maps. Relations only ever reference entities stored in the
//! same graph.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use crate::entity::{new_id, normalize_name, Entity, Relation};
use crate::types::{Direction, EntityType, RelationType};

// ============================================================================
// Persisted form
// ============================================================================

/// Structured record a graph is serialized through.
///
/// Relations carry endpoint ids, never entity copies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub entities: BTreeMap<String, Entity>,
    #[serde(default)]
    pub relations: BTreeMap<String, Relation>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Read-only structural view shared by graphs and raw records, so structural
/// checks can run on data that has not been loaded into a graph yet.
pub trait GraphView {
    fn entity_ids(&self) -> Vec<&str>;
    fn has_entity(&self, id: &str) -> bool;
    fn relation_list(&self) -> Vec<&Relation>;
}

impl GraphView for GraphRecord {
    fn entity_ids(&self) -> Vec<&str> {
        self.entities.keys().map(String::as_str).collect()
    }

    fn has_entity(&self, id: &str) -> bool {
        self.entities.contains_key(id)
    }

    fn relation_list(&self) -> Vec<&Relation> {
        self.relations.values().collect()
    }
}

/// Counts reported by [`KnowledgeGraph::get_statistics`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphStatistics {
    pub graph_id: String,
    pub graph_name: String,
    pub total_entities: usize,
    pub total_relations: usize,
    /// Only types with at least one member appear.
    pub entity_types: BTreeMap<EntityType, usize>,
    pub relation_types: BTreeMap<RelationType, usize>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ============================================================================
// KnowledgeGraph
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "GraphRecord", into = "GraphRecord")]
pub struct KnowledgeGraph {
    id: String,
    name: String,
    entities: BTreeMap<String, Entity>,
    relations: BTreeMap<String, Relation>,
    entity_type_index: BTreeMap<EntityType, BTreeSet<String>>,
    relation_type_index: BTreeMap<RelationType, BTreeSet<String>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl KnowledgeGraph {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_id(new_id(), name)
    }

    pub fn with_id(id: impl Into<String>, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: name.into(),
            entities: BTreeMap::new(),
            relations: BTreeMap::new(),
            entity_type_index: BTreeMap::new(),
            relation_type_index: BTreeMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
        self.touch();
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn relation_count(&self) -> usize {
        self.relations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    pub fn relations(&self) -> impl Iterator<Item = &Relation> {
        self.relations.values()
    }

    pub fn get_entity(&self, id: &str) -> Option<&Entity> {
        self.entities.get(id)
    }

    pub fn get_relation(&self, id: &str) -> Option<&Relation> {
        self.relations.get(id)
    }

    pub fn contains_entity(&self, id: &str) -> bool {
        self.entities.contains_key(id)
    }

    pub fn contains_relation(&self, id: &str) -> bool {
        self.relations.contains_key(id)
    }

    /// Advance `updated_at`, strictly, even when the clock has not moved.
    fn touch(&mut self) {
        let now = Utc::now();
        self.updated_at = if now > self.updated_at {
            now
        } else {
            self.updated_at + Duration::microseconds(1)
        };
    }

    // ------------------------------------------------------------------------
    // Entities
    // ------------------------------------------------------------------------

    /// Returns false if an entity with the same id is already stored.
    pub fn add_entity(&mut self, entity: Entity) -> bool {
        if self.entities.contains_key(&entity.id) {
            return false;
        }
        self.index_entity(&entity);
        self.entities.insert(entity.id.clone(), entity);
        self.touch();
        true
    }

    /// Insert or replace by id. Returns true when an existing entity was replaced.
    pub fn upsert_entity(&mut self, entity: Entity) -> bool {
        let replaced = match self.entities.remove(&entity.id) {
            Some(previous) => {
                self.unindex_entity(&previous);
                true
            }
            None => false,
        };
        self.index_entity(&entity);
        self.entities.insert(entity.id.clone(), entity);
        self.touch();
        replaced
    }

    /// Remove an entity together with every relation touching it.
    pub fn remove_entity(&mut self, id: &str) -> bool {
        if !self.entities.contains_key(id) {
            return false;
        }
        let touching: Vec<String> = self
            .relations
            .values()
            .filter(|r| r.touches(id))
            .map(|r| r.id.clone())
            .collect();
        for relation_id in touching {
            self.detach_relation(&relation_id);
        }
        self.detach_entity(id);
        self.touch();
        true
    }

    fn detach_entity(&mut self, id: &str) -> Option<Entity> {
        let entity = self.entities.remove(id)?;
        self.unindex_entity(&entity);
        Some(entity)
    }

    fn index_entity(&mut self, entity: &Entity) {
        self.entity_type_index
            .entry(entity.entity_type)
            .or_default()
            .insert(entity.id.clone());
    }

    fn unindex_entity(&mut self, entity: &Entity) {
        if let Some(ids) = self.entity_type_index.get_mut(&entity.entity_type) {
            ids.remove(&entity.id);
            if ids.is_empty() {
                self.entity_type_index.remove(&entity.entity_type);
            }
        }
    }

    pub fn get_entities_by_type(&self, entity_type: EntityType) -> Vec<&Entity> {
        self.entity_type_index
            .get(&entity_type)
            .map(|ids| ids.iter().filter_map(|id| self.entities.get(id)).collect())
            .unwrap_or_default()
    }

    /// Entities whose name or alias matches `name`, case-insensitively.
    pub fn find_entities_by_name(&self, name: &str) -> Vec<&Entity> {
        let key = normalize_name(name);
        self.entities
            .values()
            .filter(|e| e.normalized_name() == key || e.has_alias(name))
            .collect()
    }

    // ------------------------------------------------------------------------
    // Relations
    // ------------------------------------------------------------------------

    /// Returns false for a duplicate id, a malformed relation, or a relation
    /// whose endpoints are not both stored in this graph.
    pub fn add_relation(&mut self, relation: Relation) -> bool {
        if self.relations.contains_key(&relation.id) || !relation.is_valid() {
            return false;
        }
        if !self.contains_entity(&relation.head_id) || !self.contains_entity(&relation.tail_id) {
            return false;
        }
        self.attach_relation(relation);
        self.touch();
        true
    }

    /// Insert or replace by id. Returns false when the relation is malformed or
    /// its endpoints are missing; the graph is then unchanged.
    pub fn upsert_relation(&mut self, relation: Relation) -> bool {
        if !relation.is_valid()
            || !self.contains_entity(&relation.head_id)
            || !self.contains_entity(&relation.tail_id)
        {
            return false;
        }
        self.detach_relation(&relation.id);
        self.attach_relation(relation);
        self.touch();
        true
    }

    pub fn remove_relation(&mut self, id: &str) -> bool {
        if self.detach_relation(id).is_none() {
            return false;
        }
        self.touch();
        true
    }

    fn attach_relation(&mut self, relation: Relation) {
        self.relation_type_index
            .entry(relation.relation_type)
            .or_default()
            .insert(relation.id.clone());
        self.relations.insert(relation.id.clone(), relation);
    }

    fn detach_relation(&mut self, id: &str) -> Option<Relation> {
        let relation = self.relations.remove(id)?;
        if let Some(ids) = self.relation_type_index.get_mut(&relation.relation_type) {
            ids.remove(id);
            if ids.is_empty() {
                self.relation_type_index.remove(&relation.relation_type);
            }
        }
        Some(relation)
    }

    pub fn get_relations_by_type(&self, relation_type: RelationType) -> Vec<&Relation> {
        self.relation_type_index
            .get(&relation_type)
            .map(|ids| ids.iter().filter_map(|id| self.relations.get(id)).collect())
            .unwrap_or_default()
    }

    /// Relations touching `entity_id`, optionally restricted by type and by
    /// which endpoint the entity occupies.
    pub fn get_entity_relations(
        &self,
        entity_id: &str,
        relation_type: Option<RelationType>,
        direction: Direction,
    ) -> Vec<&Relation> {
        self.relations
            .values()
            .filter(|r| relation_type.map_or(true, |t| r.relation_type == t))
            .filter(|r| match direction {
                Direction::Out => r.head_id == entity_id,
                Direction::In => r.tail_id == entity_id,
                Direction::Both => r.touches(entity_id),
            })
            .collect()
    }

    /// The opposite endpoint of every matching relation.
    pub fn get_neighbors(
        &self,
        entity_id: &str,
        relation_type: Option<RelationType>,
        direction: Direction,
    ) -> Vec<&Entity> {
        self.get_entity_relations(entity_id, relation_type, direction)
            .into_iter()
            .filter_map(|r| {
                let other = if r.head_id == entity_id {
                    &r.tail_id
                } else {
                    &r.head_id
                };
                self.entities.get(other)
            })
            .collect()
    }

    /// All simple directed paths from `start` to `end` using at most
    /// `max_depth` relations, found by depth-first search.
    pub fn find_path(&self, start: &str, end: &str, max_depth: usize) -> Vec<Vec<&Relation>> {
        let mut paths = Vec::new();
        let (Some((start, _)), Some((end, _))) =
            (self.entities.get_key_value(start), self.entities.get_key_value(end))
        else {
            return paths;
        };

        let mut outgoing: HashMap<&str, Vec<&Relation>> = HashMap::new();
        for relation in self.relations.values() {
            outgoing.entry(relation.head_id.as_str()).or_default().push(relation);
        }

        let mut visited = HashSet::new();
        let mut path = Vec::new();
        collect_paths(
            &outgoing,
            start,
            end,
            0,
            max_depth,
            &mut visited,
            &mut path,
            &mut paths,
        );
        paths
    }

    // ------------------------------------------------------------------------
    // Merge & statistics
    // ------------------------------------------------------------------------

    /// Fold `source_id` into `target_id`: attributes are merged, every relation
    /// referencing the source is re-pointed at the target, then the source is
    /// removed. A relation between the two becomes a self loop.
    pub fn merge_entity(&mut self, target_id: &str, source_id: &str) -> bool {
        if target_id == source_id
            || !self.contains_entity(target_id)
            || !self.contains_entity(source_id)
        {
            return false;
        }
        let Some(source) = self.detach_entity(source_id) else {
            return false;
        };
        let Some(mut target) = self.detach_entity(target_id) else {
            return false;
        };
        target.merge_attributes(&source);
        self.index_entity(&target);
        self.entities.insert(target.id.clone(), target);

        for relation in self.relations.values_mut() {
            if relation.head_id == source_id {
                relation.head_id = target_id.to_string();
            }
            if relation.tail_id == source_id {
                relation.tail_id = target_id.to_string();
            }
        }
        self.touch();
        true
    }

    pub fn get_statistics(&self) -> GraphStatistics {
        GraphStatistics {
            graph_id: self.id.clone(),
            graph_name: self.name.clone(),
            total_entities: self.entities.len(),
            total_relations: self.relations.len(),
            entity_types: self
                .entity_type_index
                .iter()
                .filter(|(_, ids)| !ids.is_empty())
                .map(|(t, ids)| (*t, ids.len()))
                .collect(),
            relation_types: self
                .relation_type_index
                .iter()
                .filter(|(_, ids)| !ids.is_empty())
                .map(|(t, ids)| (*t, ids.len()))
                .collect(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    // ------------------------------------------------------------------------
    // Records
    // ------------------------------------------------------------------------

    pub fn to_record(&self) -> GraphRecord {
        GraphRecord {
            id: self.id.clone(),
            name: self.name.clone(),
            entities: self.entities.clone(),
            relations: self.relations.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    /// Rebuild a graph from its record. Relations whose endpoints are missing
    /// are dropped. Self loops left behind by merges are kept.
    pub fn from_record(record: GraphRecord) -> Self {
        let mut graph = Self::with_id(record.id, record.name);
        for (_, entity) in record.entities {
            graph.index_entity(&entity);
            graph.entities.insert(entity.id.clone(), entity);
        }

        let mut dropped = 0usize;
        for (_, relation) in record.relations {
            let endpoints_present =
                graph.contains_entity(&relation.head_id) && graph.contains_entity(&relation.tail_id);
            if !endpoints_present || graph.relations.contains_key(&relation.id) {
                dropped += 1;
                continue;
            }
            graph.attach_relation(relation);
        }
        if dropped > 0 {
            tracing::warn!(
                graph_id = %graph.id,
                dropped,
                "dropped relations with missing endpoints while loading graph"
            );
        }

        graph.created_at = record.created_at;
        graph.updated_at = record.updated_at;
        graph
    }
}

#[allow(clippy::too_many_arguments)]
fn collect_paths<'a>(
    outgoing: &HashMap<&'a str, Vec<&'a Relation>>,
    current: &'a str,
    target: &str,
    depth: usize,
    max_depth: usize,
    visited: &mut HashSet<&'a str>,
    path: &mut Vec<&'a Relation>,
    paths: &mut Vec<Vec<&'a Relation>>,
) {
    if depth > max_depth {
        return;
    }
    if current == target && !path.is_empty() {
        paths.push(path.clone());
        return;
    }

    visited.insert(current);
    if let Some(relations) = outgoing.get(current) {
        for relation in relations {
            let next = relation.tail_id.as_str();
            if visited.contains(next) {
                continue;
            }
            path.push(relation);
            collect_paths(outgoing, next, target, depth + 1, max_depth, visited, path, paths);
            path.pop();
        }
    }
    visited.remove(current);
}

impl GraphView for KnowledgeGraph {
    fn entity_ids(&self) -> Vec<&str> {
        self.entities.keys().map(String::as_str).collect()
    }

    fn has_entity(&self, id: &str) -> bool {
        self.contains_entity(id)
    }

    fn relation_list(&self) -> Vec<&Relation> {
        self.relations.values().collect()
    }
}

impl From<GraphRecord> for KnowledgeGraph {
    fn from(record: GraphRecord) -> Self {
        KnowledgeGraph::from_record(record)
    }
}

impl From<KnowledgeGraph> for GraphRecord {
    fn from(graph: KnowledgeGraph) -> Self {
        GraphRecord {
            id: graph.id,
            name: graph.name,
            entities: graph.entities,
            relations: graph.relations,
            created_at: graph.created_at,
            updated_at: graph.updated_at,
        }
    }
}
