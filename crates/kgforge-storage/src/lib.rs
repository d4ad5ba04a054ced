//! KGForge storage: persistence backends behind one [`GraphStorage`] contract.
//!
//! - [`json`]: a directory with one JSON document per graph plus a summary
//!   index, replaced atomically on every write
//! - [`sqlite`]: entities as labeled nodes and relations as directed edges in
//!   SQLite, with versioned migrations and transactional saves
//!
//! Both backends satisfy the round-trip law: `load_graph(save_graph(g))`
//! reproduces every entity, relation and timestamp of `g`.

pub mod error;
pub mod json;
pub mod sqlite;

use chrono::{DateTime, Utc};
use kgforge_model::{Entity, EntityType, GraphStatistics, KnowledgeGraph, Relation, RelationType};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;
use std::str::FromStr;

pub use error::{ErrorKind, Result, StorageError};
pub use json::JsonStorage;
pub use sqlite::SqliteGraphStorage;

pub const DEFAULT_QUERY_LIMIT: usize = 100;

// ============================================================================
// Summaries & filters
// ============================================================================

/// One entry of the summary index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphSummary {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub entity_count: usize,
    pub relation_count: usize,
}

impl GraphSummary {
    pub fn of(graph: &KnowledgeGraph) -> Self {
        Self {
            id: graph.id().to_string(),
            name: graph.name().to_string(),
            created_at: graph.created_at(),
            updated_at: graph.updated_at(),
            entity_count: graph.entity_count(),
            relation_count: graph.relation_count(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntityFilter {
    pub graph_id: Option<String>,
    pub entity_type: Option<EntityType>,
    /// Case-insensitive substring of the entity name.
    pub name_contains: Option<String>,
    pub min_confidence: Option<f64>,
    pub limit: usize,
}

impl Default for EntityFilter {
    fn default() -> Self {
        Self {
            graph_id: None,
            entity_type: None,
            name_contains: None,
            min_confidence: None,
            limit: DEFAULT_QUERY_LIMIT,
        }
    }
}

impl EntityFilter {
    pub fn in_graph(graph_id: impl Into<String>) -> Self {
        Self {
            graph_id: Some(graph_id.into()),
            ..Self::default()
        }
    }

    pub fn matches(&self, entity: &Entity) -> bool {
        if self.entity_type.is_some_and(|t| t != entity.entity_type) {
            return false;
        }
        if let Some(needle) = &self.name_contains {
            if !entity.name.to_lowercase().contains(&needle.to_lowercase()) {
                return false;
            }
        }
        self.min_confidence.map_or(true, |min| entity.confidence >= min)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelationFilter {
    pub graph_id: Option<String>,
    pub head_id: Option<String>,
    pub tail_id: Option<String>,
    pub relation_type: Option<RelationType>,
    pub limit: usize,
}

impl Default for RelationFilter {
    fn default() -> Self {
        Self {
            graph_id: None,
            head_id: None,
            tail_id: None,
            relation_type: None,
            limit: DEFAULT_QUERY_LIMIT,
        }
    }
}

impl RelationFilter {
    pub fn in_graph(graph_id: impl Into<String>) -> Self {
        Self {
            graph_id: Some(graph_id.into()),
            ..Self::default()
        }
    }

    pub fn matches(&self, relation: &Relation) -> bool {
        self.head_id.as_ref().map_or(true, |h| *h == relation.head_id)
            && self.tail_id.as_ref().map_or(true, |t| *t == relation.tail_id)
            && self.relation_type.map_or(true, |t| t == relation.relation_type)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportFormat {
    /// The persisted record.
    Json,
    /// `{nodes, links}` for graph visualisation tools.
    NodeLink,
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "node_link" | "node-link" | "nodelink" => Ok(ExportFormat::NodeLink),
            other => Err(format!("unknown export format `{other}` (expected json or node_link)")),
        }
    }
}

/// Write `bytes` to `path` through a temporary file in the same directory,
/// so readers see either the old or the new content.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path)?;
    Ok(())
}

// ============================================================================
// Contract
// ============================================================================

/// A persistence backend.
///
/// Every operation except `connect` fails with [`StorageError::NotConnected`]
/// until the backend is connected. `save_graph` replaces the whole stored
/// state for the graph id.
pub trait GraphStorage {
    fn backend_name(&self) -> &'static str;

    fn connect(&mut self) -> Result<()>;

    fn disconnect(&mut self) -> Result<()>;

    fn is_connected(&self) -> bool;

    fn save_graph(&self, graph: &KnowledgeGraph) -> Result<()>;

    /// `Ok(None)` when no graph with `graph_id` is stored.
    fn load_graph(&self, graph_id: &str) -> Result<Option<KnowledgeGraph>>;

    /// Returns whether a graph was deleted.
    fn delete_graph(&self, graph_id: &str) -> Result<bool>;

    /// Summaries, most recently updated first. Never loads full graphs.
    fn list_graphs(&self) -> Result<Vec<GraphSummary>>;

    fn query_entities(&self, filter: &EntityFilter) -> Result<Vec<Entity>>;

    fn query_relations(&self, filter: &RelationFilter) -> Result<Vec<Relation>>;

    /// False when an entity with the same id already exists.
    fn add_entity(&self, graph_id: &str, entity: &Entity) -> Result<bool>;

    /// False when no entity with this id exists.
    fn update_entity(&self, graph_id: &str, entity: &Entity) -> Result<bool>;

    /// Removes the entity and every relation touching it.
    fn remove_entity(&self, graph_id: &str, entity_id: &str) -> Result<bool>;

    /// False for a duplicate id, a malformed relation or missing endpoints.
    fn add_relation(&self, graph_id: &str, relation: &Relation) -> Result<bool>;

    fn update_relation(&self, graph_id: &str, relation: &Relation) -> Result<bool>;

    fn remove_relation(&self, graph_id: &str, relation_id: &str) -> Result<bool>;

    fn graph_statistics(&self, graph_id: &str) -> Result<GraphStatistics> {
        self.load_graph(graph_id)?
            .map(|g| g.get_statistics())
            .ok_or_else(|| StorageError::not_found(graph_id))
    }

    /// Write the graph's persisted record to `path`.
    fn backup_graph(&self, graph_id: &str, path: &Path) -> Result<()> {
        let graph = self
            .load_graph(graph_id)?
            .ok_or_else(|| StorageError::not_found(graph_id))?;
        let bytes = serde_json::to_vec_pretty(&graph)?;
        write_atomic(path, &bytes)?;
        tracing::info!(graph_id, path = %path.display(), "backed up graph");
        Ok(())
    }

    /// Save the graph stored at `path` and return its id.
    fn restore_graph(&self, path: &Path) -> Result<String> {
        let text = std::fs::read_to_string(path)?;
        let graph: KnowledgeGraph = serde_json::from_str(&text)?;
        self.save_graph(&graph)?;
        tracing::info!(graph_id = %graph.id(), path = %path.display(), "restored graph");
        Ok(graph.id().to_string())
    }

    fn export_graph(&self, graph_id: &str, format: ExportFormat) -> Result<serde_json::Value> {
        let graph = self
            .load_graph(graph_id)?
            .ok_or_else(|| StorageError::not_found(graph_id))?;
        Ok(match format {
            ExportFormat::Json => serde_json::to_value(&graph)?,
            ExportFormat::NodeLink => kgforge_model::analysis::export_node_link(&graph),
        })
    }
}
