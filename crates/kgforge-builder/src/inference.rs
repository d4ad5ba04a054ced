//! Implicit relation inference.
//!
//! Three independent rules run over a snapshot of the graph and their output
//! is unioned:
//!
//! - transitivity: `A contains B`, `B contains C` gives `A contains C`
//! - symmetry: `similar_to` / `synonyms` edges gain their reverse
//! - hierarchy: configured (parent, child) type pairs gain `contains` when the
//!   child's name embeds the parent's, or its `table` property names it
//!
//! A single pass is made; inferred edges are not fed back into the rules. An
//! inferred `contains` whose tail already reaches its head over `contains`
//! edges is dropped, so inference never closes a new cycle.

use kgforge_model::{Entity, KnowledgeGraph, Relation, RelationType};
use serde_json::json;
use std::collections::{HashMap, HashSet};

use crate::config::BuilderConfig;

pub const SOURCE_TRANSITIVE: &str = "transitive_inference";
pub const SOURCE_SYMMETRIC: &str = "symmetric_inference";
pub const SOURCE_HIERARCHICAL: &str = "hierarchical_inference";

pub fn transitive_relations(graph: &KnowledgeGraph, factor: f64) -> Vec<Relation> {
    let contains = graph.get_relations_by_type(RelationType::Contains);
    let mut inferred = Vec::new();
    for first in &contains {
        for second in contains.iter().filter(|r| r.head_id == first.tail_id) {
            if second.tail_id == first.head_id {
                continue;
            }
            let confidence = first.confidence.min(second.confidence) * factor;
            inferred.push(
                Relation::new(
                    first.head_id.clone(),
                    second.tail_id.clone(),
                    RelationType::Contains,
                )
                .with_confidence(confidence)
                .with_source(SOURCE_TRANSITIVE)
                .with_property("inferred_from", json!([first.id, second.id])),
            );
        }
    }
    inferred
}

pub fn symmetric_relations(graph: &KnowledgeGraph, factor: f64) -> Vec<Relation> {
    graph
        .relations()
        .filter(|r| r.relation_type.is_symmetric())
        .map(|r| {
            Relation::new(r.tail_id.clone(), r.head_id.clone(), r.relation_type)
                .with_confidence(r.confidence * factor)
                .with_source(SOURCE_SYMMETRIC)
                .with_property("inferred_from", json!([r.id]))
        })
        .collect()
}

fn is_parent_of(parent: &Entity, child: &Entity) -> bool {
    if parent.id == child.id {
        return false;
    }
    let parent_name = parent.normalized_name();
    if !parent_name.is_empty() && child.normalized_name().contains(&parent_name) {
        return true;
    }
    child
        .properties
        .get("table")
        .and_then(|v| v.as_str())
        .is_some_and(|table| table == parent.name)
}

pub fn hierarchical_relations(graph: &KnowledgeGraph, config: &BuilderConfig) -> Vec<Relation> {
    let mut inferred = Vec::new();
    for &(parent_type, child_type) in &config.hierarchy_pairs {
        let parents = graph.get_entities_by_type(parent_type);
        let children = graph.get_entities_by_type(child_type);
        for parent in &parents {
            for child in children.iter().filter(|c| is_parent_of(parent, c)) {
                inferred.push(
                    Relation::between(parent, child, RelationType::Contains)
                        .with_confidence(config.hierarchy_confidence)
                        .with_source(SOURCE_HIERARCHICAL)
                        .with_property("parent_type", parent_type.as_str())
                        .with_property("child_type", child_type.as_str()),
                );
            }
        }
    }
    inferred
}

/// Reachability over the graph's `contains` edges, memoized per start node.
struct ContainsReach<'g> {
    adjacency: HashMap<&'g str, Vec<&'g str>>,
    reachable: HashMap<&'g str, HashSet<&'g str>>,
}

impl<'g> ContainsReach<'g> {
    fn new(graph: &'g KnowledgeGraph) -> Self {
        let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
        for relation in graph.get_relations_by_type(RelationType::Contains) {
            adjacency
                .entry(relation.head_id.as_str())
                .or_default()
                .push(relation.tail_id.as_str());
        }
        Self {
            adjacency,
            reachable: HashMap::new(),
        }
    }

    fn reaches(&mut self, from: &'g str, to: &str) -> bool {
        if !self.reachable.contains_key(from) {
            let mut seen = HashSet::new();
            let mut stack = vec![from];
            while let Some(current) = stack.pop() {
                for &next in self.adjacency.get(current).into_iter().flatten() {
                    if seen.insert(next) {
                        stack.push(next);
                    }
                }
            }
            self.reachable.insert(from, seen);
        }
        self.reachable.get(from).is_some_and(|set| set.contains(to))
    }
}

/// All three rules, restricted to whitelisted triples that neither exist in
/// the graph nor repeat an earlier inference.
pub fn infer_relations(graph: &KnowledgeGraph, config: &BuilderConfig) -> Vec<Relation> {
    let mut candidates = transitive_relations(graph, config.transitive_factor);
    candidates.extend(symmetric_relations(graph, config.symmetric_factor));
    candidates.extend(hierarchical_relations(graph, config));

    let mut seen: HashSet<(String, String, RelationType)> = graph
        .relations()
        .map(|r| (r.head_id.clone(), r.tail_id.clone(), r.relation_type))
        .collect();

    let mut reach = ContainsReach::new(graph);
    let total = candidates.len();
    let accepted: Vec<Relation> = candidates
        .into_iter()
        .filter(|r| r.is_valid())
        .filter(|r| {
            r.relation_type != RelationType::Contains
                || !graph
                    .get_entity(&r.tail_id)
                    .is_some_and(|tail| reach.reaches(tail.id.as_str(), &r.head_id))
        })
        .filter(|r| {
            match (graph.get_entity(&r.head_id), graph.get_entity(&r.tail_id)) {
                (Some(head), Some(tail)) => {
                    config
                        .whitelist
                        .allows(head.entity_type, tail.entity_type, r.relation_type)
                }
                _ => false,
            }
        })
        .filter(|r| seen.insert((r.head_id.clone(), r.tail_id.clone(), r.relation_type)))
        .collect();
    tracing::debug!(candidates = total, accepted = accepted.len(), "relation inference finished");
    accepted
}
