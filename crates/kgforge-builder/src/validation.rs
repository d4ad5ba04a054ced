//! Structural validation of a built graph.
//!
//! Only dangling endpoint references are high severity and make a graph
//! invalid. Connectivity, isolation and cycles are advisories: they are
//! reported, never fixed.

use kgforge_model::analysis::connected_components;
use kgforge_model::GraphView;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidationIssue {
    MissingHead { relation_id: String, entity_id: String },
    MissingTail { relation_id: String, entity_id: String },
    DisconnectedComponents { count: usize, sizes: Vec<usize> },
    IsolatedNodes { entity_ids: Vec<String> },
    /// Each cycle lists its entity ids once, without repeating the start.
    Cycles { cycles: Vec<Vec<String>> },
}

impl ValidationIssue {
    pub fn severity(&self) -> Severity {
        match self {
            ValidationIssue::MissingHead { .. } | ValidationIssue::MissingTail { .. } => Severity::High,
            _ => Severity::Medium,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ValidationIssue::MissingHead { .. } => "missing_head",
            ValidationIssue::MissingTail { .. } => "missing_tail",
            ValidationIssue::DisconnectedComponents { .. } => "disconnected_components",
            ValidationIssue::IsolatedNodes { .. } => "isolated_nodes",
            ValidationIssue::Cycles { .. } => "cycles",
        }
    }

    pub fn message(&self) -> String {
        match self {
            ValidationIssue::MissingHead { relation_id, entity_id } => {
                format!("relation {relation_id} has missing head entity {entity_id}")
            }
            ValidationIssue::MissingTail { relation_id, entity_id } => {
                format!("relation {relation_id} has missing tail entity {entity_id}")
            }
            ValidationIssue::DisconnectedComponents { count, sizes } => {
                format!("graph has {count} disconnected components (sizes {sizes:?})")
            }
            ValidationIssue::IsolatedNodes { entity_ids } => {
                format!("{} entities have no relations", entity_ids.len())
            }
            ValidationIssue::Cycles { cycles } => format!("{} cycles detected", cycles.len()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationStatistics {
    pub entity_count: usize,
    pub relation_count: usize,
    /// Relations per entity.
    pub density: f64,
    pub component_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub issues: Vec<ValidationIssue>,
    pub recommendations: Vec<String>,
    pub statistics: ValidationStatistics,
}

impl ValidationReport {
    pub fn issues_with(&self, severity: Severity) -> impl Iterator<Item = &ValidationIssue> {
        self.issues.iter().filter(move |i| i.severity() == severity)
    }

    pub fn cycles(&self) -> &[Vec<String>] {
        self.issues
            .iter()
            .find_map(|i| match i {
                ValidationIssue::Cycles { cycles } => Some(cycles.as_slice()),
                _ => None,
            })
            .unwrap_or(&[])
    }
}

const SPARSE_DENSITY: f64 = 0.5;
const REDUNDANT_DENSITY: f64 = 5.0;

pub fn validate_graph<G: GraphView + ?Sized>(graph: &G) -> ValidationReport {
    let mut issues = Vec::new();
    let relations = graph.relation_list();
    let entity_ids = graph.entity_ids();

    // Referential integrity
    for relation in &relations {
        if !graph.has_entity(&relation.head_id) {
            issues.push(ValidationIssue::MissingHead {
                relation_id: relation.id.clone(),
                entity_id: relation.head_id.clone(),
            });
        }
        if !graph.has_entity(&relation.tail_id) {
            issues.push(ValidationIssue::MissingTail {
                relation_id: relation.id.clone(),
                entity_id: relation.tail_id.clone(),
            });
        }
    }

    // Connectivity
    let components = connected_components(graph);
    if components.len() > 1 {
        let mut sizes: Vec<usize> = components.iter().map(Vec::len).collect();
        sizes.sort_unstable_by(|a, b| b.cmp(a));
        issues.push(ValidationIssue::DisconnectedComponents {
            count: components.len(),
            sizes,
        });
    }

    // Isolation
    let touched: HashSet<&str> = relations
        .iter()
        .flat_map(|r| [r.head_id.as_str(), r.tail_id.as_str()])
        .collect();
    let isolated: Vec<String> = entity_ids
        .iter()
        .filter(|id| !touched.contains(*id))
        .map(|id| id.to_string())
        .collect();
    if !isolated.is_empty() {
        issues.push(ValidationIssue::IsolatedNodes { entity_ids: isolated });
    }

    // Cycles
    let cycles = find_cycles(graph);
    if !cycles.is_empty() {
        issues.push(ValidationIssue::Cycles { cycles });
    }

    let density = if entity_ids.is_empty() {
        0.0
    } else {
        relations.len() as f64 / entity_ids.len() as f64
    };
    let valid = !issues.iter().any(|i| i.severity() == Severity::High);
    let recommendations = recommendations(&issues, relations.len(), density);

    if !valid {
        tracing::warn!(
            issues = issues.len(),
            high = issues.iter().filter(|i| i.severity() == Severity::High).count(),
            "graph failed validation"
        );
    }

    ValidationReport {
        valid,
        issues,
        recommendations,
        statistics: ValidationStatistics {
            entity_count: entity_ids.len(),
            relation_count: relations.len(),
            density,
            component_count: components.len(),
        },
    }
}

fn recommendations(issues: &[ValidationIssue], relation_count: usize, density: f64) -> Vec<String> {
    let mut out = Vec::new();
    let mut categories = BTreeSet::new();
    for issue in issues {
        categories.insert(issue.code());
    }
    if categories.contains("missing_head") || categories.contains("missing_tail") {
        out.push("remove or repair relations whose endpoints are missing".to_string());
    }
    if categories.contains("disconnected_components") {
        out.push("link the disconnected components or split them into separate graphs".to_string());
    }
    if categories.contains("isolated_nodes") {
        out.push("relate or remove isolated entities".to_string());
    }
    if categories.contains("cycles") {
        out.push("review cycles in hierarchical relations".to_string());
    }
    if relation_count == 0 {
        out.push("graph has no relations; add sources or enable relation inference".to_string());
    } else if density < SPARSE_DENSITY {
        out.push(format!(
            "graph is too sparse ({density:.2} relations per entity); consider more sources or inference"
        ));
    } else if density > REDUNDANT_DENSITY {
        out.push(format!(
            "graph may hold redundant relations ({density:.2} relations per entity); consider consolidating"
        ));
    }
    out
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Temp,
    Perm,
}

/// Depth-first search from `root` with an explicit stack of
/// `(node, next neighbour index)` frames, so path length is bounded by memory
/// rather than the call stack. A `Temp` node is exactly a node on the stack.
fn visit<'a>(
    root: &'a str,
    adjacency: &HashMap<&'a str, Vec<&'a str>>,
    marks: &mut HashMap<&'a str, Mark>,
    cycles: &mut Vec<Vec<&'a str>>,
) {
    if marks.contains_key(root) {
        return;
    }
    marks.insert(root, Mark::Temp);
    let mut frames: Vec<(&'a str, usize)> = vec![(root, 0)];

    while let Some(&(node, next)) = frames.last() {
        let neighbours = adjacency.get(node).map(Vec::as_slice).unwrap_or(&[]);
        let Some(&child) = neighbours.get(next) else {
            marks.insert(node, Mark::Perm);
            frames.pop();
            continue;
        };
        if let Some(top) = frames.last_mut() {
            top.1 += 1;
        }
        match marks.get(child) {
            Some(Mark::Perm) => {}
            Some(Mark::Temp) => {
                // Back edge: the cycle is the stack slice from `child`.
                if let Some(pos) = frames.iter().position(|&(n, _)| n == child) {
                    cycles.push(frames[pos..].iter().map(|&(n, _)| n).collect());
                }
            }
            None => {
                marks.insert(child, Mark::Temp);
                frames.push((child, 0));
            }
        }
    }
}

/// Distinct directed cycles found by depth-first search, each rotated to start
/// at its smallest id.
pub fn find_cycles<G: GraphView + ?Sized>(graph: &G) -> Vec<Vec<String>> {
    let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
    for relation in graph.relation_list() {
        if graph.has_entity(&relation.head_id) && graph.has_entity(&relation.tail_id) {
            adjacency
                .entry(relation.head_id.as_str())
                .or_default()
                .push(relation.tail_id.as_str());
        }
    }

    let mut marks = HashMap::new();
    let mut raw = Vec::new();
    for id in graph.entity_ids() {
        visit(id, &adjacency, &mut marks, &mut raw);
    }

    let mut seen = HashSet::new();
    let mut cycles = Vec::new();
    for cycle in raw {
        let Some(start) = cycle
            .iter()
            .enumerate()
            .min_by_key(|(_, id)| **id)
            .map(|(i, _)| i)
        else {
            continue;
        };
        let canonical: Vec<String> = cycle[start..]
            .iter()
            .chain(&cycle[..start])
            .map(|id| id.to_string())
            .collect();
        if seen.insert(canonical.clone()) {
            cycles.push(canonical);
        }
    }
    cycles
}
