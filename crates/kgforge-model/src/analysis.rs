//! Whole-graph analysis helpers built on the [`KnowledgeGraph`] API.
//!
//! - `shortest_path`: breadth-first search over outgoing relations
//! - `connected_components`: undirected components of any [`GraphView`]
//! - `graph_metrics`: degree statistics, density and centrality
//! - `consistency_issues`: duplicate edges and self loops
//! - `merge_similar_entities`: word-set Jaccard merging
//! - `export_node_link`: node/link JSON for visualisation front ends

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use crate::entity::Relation;
use crate::graph::{GraphView, KnowledgeGraph};
use crate::types::EntityType;

// ============================================================================
// Paths & components
// ============================================================================

/// Fewest-hop directed path from `start` to `end`, as the relations walked.
///
/// `None` when either endpoint is unknown or `end` is unreachable; an empty
/// path when `start == end`.
pub fn shortest_path<'a>(graph: &'a KnowledgeGraph, start: &str, end: &str) -> Option<Vec<&'a Relation>> {
    if !graph.contains_entity(start) || !graph.contains_entity(end) {
        return None;
    }
    if start == end {
        return Some(Vec::new());
    }

    let mut outgoing: HashMap<&str, Vec<&Relation>> = HashMap::new();
    for relation in graph.relations() {
        outgoing.entry(relation.head_id.as_str()).or_default().push(relation);
    }

    let mut visited: HashSet<&str> = HashSet::new();
    visited.insert(start);
    let mut queue: VecDeque<(&str, Vec<&Relation>)> = VecDeque::new();
    queue.push_back((start, Vec::new()));

    while let Some((current, path)) = queue.pop_front() {
        let Some(relations) = outgoing.get(current) else {
            continue;
        };
        for relation in relations {
            let next = relation.tail_id.as_str();
            if next == end {
                let mut found = path.clone();
                found.push(relation);
                return Some(found);
            }
            if visited.insert(next) {
                let mut extended = path.clone();
                extended.push(relation);
                queue.push_back((next, extended));
            }
        }
    }
    None
}

/// Connected components ignoring edge direction. Relations with an endpoint
/// outside the view are ignored.
pub fn connected_components<G: GraphView + ?Sized>(graph: &G) -> Vec<Vec<String>> {
    let ids = graph.entity_ids();
    let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
    for relation in graph.relation_list() {
        if !graph.has_entity(&relation.head_id) || !graph.has_entity(&relation.tail_id) {
            continue;
        }
        adjacency
            .entry(relation.head_id.as_str())
            .or_default()
            .push(relation.tail_id.as_str());
        adjacency
            .entry(relation.tail_id.as_str())
            .or_default()
            .push(relation.head_id.as_str());
    }

    let mut visited: HashSet<&str> = HashSet::new();
    let mut components = Vec::new();
    for id in ids {
        if !visited.insert(id) {
            continue;
        }
        let mut component = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            component.push(current.to_string());
            for &next in adjacency.get(current).into_iter().flatten() {
                if visited.insert(next) {
                    stack.push(next);
                }
            }
        }
        components.push(component);
    }
    components
}

// ============================================================================
// Metrics
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CentralEntity {
    pub entity_id: String,
    pub entity_name: String,
    pub degree: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphMetrics {
    pub node_count: usize,
    pub edge_count: usize,
    pub density: f64,
    pub avg_degree: f64,
    pub max_degree: usize,
    pub min_degree: usize,
    pub top_central: Vec<CentralEntity>,
    pub connected_components: usize,
    pub largest_component_size: usize,
    pub is_connected: bool,
}

const TOP_CENTRAL: usize = 5;

/// `None` for a graph without entities.
/// Undirected degree of every entity in one pass over the relations; a self
/// loop counts once.
fn degrees(graph: &KnowledgeGraph) -> HashMap<&str, usize> {
    let mut degree: HashMap<&str, usize> = graph.entities().map(|e| (e.id.as_str(), 0)).collect();
    for relation in graph.relations() {
        if let Some(d) = degree.get_mut(relation.head_id.as_str()) {
            *d += 1;
        }
        if relation.tail_id != relation.head_id {
            if let Some(d) = degree.get_mut(relation.tail_id.as_str()) {
                *d += 1;
            }
        }
    }
    degree
}

pub fn graph_metrics(graph: &KnowledgeGraph) -> Option<GraphMetrics> {
    if graph.is_empty() {
        return None;
    }
    let node_count = graph.entity_count();
    let edge_count = graph.relation_count();

    let degree = degrees(graph);

    let total: usize = degree.values().sum();
    let max_possible = node_count * node_count.saturating_sub(1);
    let density = if max_possible > 0 {
        (2 * edge_count) as f64 / max_possible as f64
    } else {
        0.0
    };

    // Entities iterate in id order, so ties keep a stable order.
    let mut ranked: Vec<(&str, usize)> = graph
        .entities()
        .map(|e| (e.id.as_str(), degree.get(e.id.as_str()).copied().unwrap_or(0)))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1));
    let top_central = ranked
        .into_iter()
        .take(TOP_CENTRAL)
        .filter_map(|(id, d)| {
            graph.get_entity(id).map(|e| CentralEntity {
                entity_id: e.id.clone(),
                entity_name: e.name.clone(),
                degree: d,
            })
        })
        .collect();

    let components = connected_components(graph);
    Some(GraphMetrics {
        node_count,
        edge_count,
        density,
        avg_degree: total as f64 / node_count as f64,
        max_degree: degree.values().copied().max().unwrap_or(0),
        min_degree: degree.values().copied().min().unwrap_or(0),
        top_central,
        connected_components: components.len(),
        largest_component_size: components.iter().map(Vec::len).max().unwrap_or(0),
        is_connected: components.len() <= 1,
    })
}

// ============================================================================
// Consistency
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConsistencyIssue {
    /// Two or more relations share head, tail and type.
    DuplicateRelation { relation_ids: Vec<String> },
    SelfLoop { relation_id: String, entity_id: String },
}

pub fn consistency_issues(graph: &KnowledgeGraph) -> Vec<ConsistencyIssue> {
    let mut issues = Vec::new();
    let mut groups: HashMap<(&str, &str, crate::RelationType), Vec<String>> = HashMap::new();
    let mut order = Vec::new();

    for relation in graph.relations() {
        if relation.is_self_loop() {
            issues.push(ConsistencyIssue::SelfLoop {
                relation_id: relation.id.clone(),
                entity_id: relation.head_id.clone(),
            });
        }
        let key = (
            relation.head_id.as_str(),
            relation.tail_id.as_str(),
            relation.relation_type,
        );
        let group = groups.entry(key).or_default();
        if group.is_empty() {
            order.push(key);
        }
        group.push(relation.id.clone());
    }

    for key in order {
        if let Some(ids) = groups.remove(&key) {
            if ids.len() > 1 {
                issues.push(ConsistencyIssue::DuplicateRelation { relation_ids: ids });
            }
        }
    }
    issues
}

// ============================================================================
// Similar-name merging
// ============================================================================

/// Jaccard similarity of the lower-cased whitespace word sets.
pub fn name_similarity(a: &str, b: &str) -> f64 {
    let left: BTreeSet<String> = a.to_lowercase().split_whitespace().map(str::to_string).collect();
    let right: BTreeSet<String> = b.to_lowercase().split_whitespace().map(str::to_string).collect();
    let union = left.union(&right).count();
    if union == 0 {
        return 0.0;
    }
    left.intersection(&right).count() as f64 / union as f64
}

pub const DEFAULT_MERGE_THRESHOLD: f64 = 0.8;

/// Merge every later entity into the first earlier one whose name is at
/// least `threshold` similar. Returns the number of merges performed.
pub fn merge_similar_entities(graph: &mut KnowledgeGraph, threshold: f64) -> usize {
    let snapshot: Vec<(String, String)> = graph
        .entities()
        .map(|e| (e.id.clone(), e.name.clone()))
        .collect();
    let mut removed: HashSet<&str> = HashSet::new();
    let mut merged = 0;

    for (i, (target_id, target_name)) in snapshot.iter().enumerate() {
        if removed.contains(target_id.as_str()) {
            continue;
        }
        for (source_id, source_name) in &snapshot[i + 1..] {
            if removed.contains(source_id.as_str()) {
                continue;
            }
            if name_similarity(target_name, source_name) >= threshold
                && graph.merge_entity(target_id, source_id)
            {
                tracing::info!(target = %target_name, source = %source_name, "merged similar entities");
                removed.insert(source_id.as_str());
                merged += 1;
            }
        }
    }
    merged
}

// ============================================================================
// Export
// ============================================================================

/// `{"nodes": [...], "links": [...]}` document.
pub fn export_node_link(graph: &KnowledgeGraph) -> serde_json::Value {
    let degree = degrees(graph);
    let nodes: Vec<serde_json::Value> = graph
        .entities()
        .map(|e| {
            json!({
                "id": e.id,
                "label": e.name,
                "type": e.entity_type,
                "confidence": e.confidence,
                "degree": degree.get(e.id.as_str()).copied().unwrap_or(0),
            })
        })
        .collect();
    let links: Vec<serde_json::Value> = graph
        .relations()
        .map(|r| {
            json!({
                "id": r.id,
                "source": r.head_id,
                "target": r.tail_id,
                "type": r.relation_type,
                "confidence": r.confidence,
            })
        })
        .collect();
    json!({
        "graph_id": graph.id(),
        "name": graph.name(),
        "nodes": nodes,
        "links": links,
    })
}

/// Per-type entity counts in fixed type order, zero counts included.
pub fn type_distribution(graph: &KnowledgeGraph) -> Vec<(EntityType, usize)> {
    EntityType::ALL
        .into_iter()
        .map(|t| (t, graph.get_entities_by_type(t).len()))
        .collect()
}
