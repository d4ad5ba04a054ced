//! Document backend: one JSON file per graph under `<root>/graphs/`, plus a
//! summary index at `<root>/index.json`.
//!
//! Every write goes through a temporary file in the target directory and an
//! atomic rename, so a crash leaves either the previous or the new document.
//! Per-item mutators are load-mutate-save.

use kgforge_model::{Entity, KnowledgeGraph, Relation};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Result, StorageError};
use crate::{write_atomic, EntityFilter, GraphStorage, GraphSummary, RelationFilter};

const INDEX_FILE: &str = "index.json";
const GRAPHS_DIR: &str = "graphs";
const INDEX_VERSION: u32 = 1;

#[derive(Debug, Default, Serialize, Deserialize)]
struct SummaryIndex {
    version: u32,
    graphs: Vec<GraphSummary>,
}

impl SummaryIndex {
    fn new(mut graphs: Vec<GraphSummary>) -> Self {
        graphs.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then_with(|| a.id.cmp(&b.id)));
        Self {
            version: INDEX_VERSION,
            graphs,
        }
    }
}

/// Graph ids become file names.
fn validate_graph_id(graph_id: &str) -> Result<()> {
    let ok = !graph_id.is_empty()
        && graph_id.len() <= 128
        && graph_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if ok {
        Ok(())
    } else {
        Err(StorageError::InvalidGraphId(graph_id.to_string()))
    }
}

#[derive(Debug)]
pub struct JsonStorage {
    root: PathBuf,
    connected: bool,
    // Serializes index read-modify-write cycles.
    index_lock: Mutex<()>,
}

impl JsonStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            connected: false,
            index_lock: Mutex::new(()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn index_path(&self) -> PathBuf {
        self.root.join(INDEX_FILE)
    }

    fn graphs_dir(&self) -> PathBuf {
        self.root.join(GRAPHS_DIR)
    }

    fn graph_path(&self, graph_id: &str) -> PathBuf {
        self.graphs_dir().join(format!("{graph_id}.json"))
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.connected {
            Ok(())
        } else {
            Err(StorageError::NotConnected)
        }
    }

    fn read_graph_file(&self, path: &Path) -> Result<KnowledgeGraph> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    fn write_index(&self, index: &SummaryIndex) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(index)?;
        write_atomic(&self.index_path(), &bytes)
    }

    /// Current index; rebuilt from the graph files when missing or unreadable.
    fn read_index(&self) -> Result<SummaryIndex> {
        let path = self.index_path();
        if !path.exists() {
            return self.rebuild_index();
        }
        let parsed = std::fs::read_to_string(&path)
            .map_err(StorageError::from)
            .and_then(|text| serde_json::from_str::<SummaryIndex>(&text).map_err(StorageError::from));
        match parsed {
            Ok(index) => Ok(index),
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "summary index unreadable, rebuilding");
                self.rebuild_index()
            }
        }
    }

    fn rebuild_index(&self) -> Result<SummaryIndex> {
        let mut summaries = Vec::new();
        let dir = self.graphs_dir();
        if dir.exists() {
            for entry in std::fs::read_dir(&dir)? {
                let path = entry?.path();
                if path.extension().and_then(|e| e.to_str()) != Some("json") {
                    continue;
                }
                match self.read_graph_file(&path) {
                    Ok(graph) => summaries.push(GraphSummary::of(&graph)),
                    Err(err) => {
                        tracing::warn!(path = %path.display(), error = %err, "skipping unreadable graph file");
                    }
                }
            }
        }
        let index = SummaryIndex::new(summaries);
        self.write_index(&index)?;
        Ok(index)
    }

    /// Rewrite the summary index from the graph files on disk.
    pub fn compact(&self) -> Result<usize> {
        self.ensure_connected()?;
        let _guard = self.index_lock.lock();
        let index = self.rebuild_index()?;
        tracing::info!(root = %self.root.display(), graphs = index.graphs.len(), "compacted summary index");
        Ok(index.graphs.len())
    }

    fn update_index(&self, apply: impl FnOnce(&mut Vec<GraphSummary>)) -> Result<()> {
        let _guard = self.index_lock.lock();
        let mut graphs = self.read_index()?.graphs;
        apply(&mut graphs);
        self.write_index(&SummaryIndex::new(graphs))
    }

    fn require_graph(&self, graph_id: &str) -> Result<KnowledgeGraph> {
        self.load_graph(graph_id)?
            .ok_or_else(|| StorageError::not_found(graph_id))
    }

    /// Load, apply `mutate`, and save when it reports a change.
    fn mutate(&self, graph_id: &str, mutate: impl FnOnce(&mut KnowledgeGraph) -> bool) -> Result<bool> {
        let mut graph = self.require_graph(graph_id)?;
        let changed = mutate(&mut graph);
        if changed {
            self.save_graph(&graph)?;
        }
        Ok(changed)
    }

    fn target_graphs(&self, graph_id: Option<&String>) -> Result<Vec<KnowledgeGraph>> {
        match graph_id {
            Some(id) => Ok(self.load_graph(id)?.into_iter().collect()),
            None => {
                let mut ids: Vec<String> = self.list_graphs()?.into_iter().map(|s| s.id).collect();
                ids.sort();
                let mut graphs = Vec::with_capacity(ids.len());
                for id in ids {
                    if let Some(graph) = self.load_graph(&id)? {
                        graphs.push(graph);
                    }
                }
                Ok(graphs)
            }
        }
    }
}

impl GraphStorage for JsonStorage {
    fn backend_name(&self) -> &'static str {
        "json"
    }

    fn connect(&mut self) -> Result<()> {
        std::fs::create_dir_all(self.graphs_dir())?;
        self.connected = true;
        {
            let _guard = self.index_lock.lock();
            self.read_index()?;
        }
        tracing::debug!(root = %self.root.display(), "json storage connected");
        Ok(())
    }

    fn disconnect(&mut self) -> Result<()> {
        self.connected = false;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn save_graph(&self, graph: &KnowledgeGraph) -> Result<()> {
        self.ensure_connected()?;
        validate_graph_id(graph.id())?;
        let bytes = serde_json::to_vec_pretty(graph)?;
        write_atomic(&self.graph_path(graph.id()), &bytes)?;

        let summary = GraphSummary::of(graph);
        self.update_index(|graphs| {
            graphs.retain(|s| s.id != summary.id);
            graphs.push(summary);
        })?;
        tracing::debug!(
            graph_id = %graph.id(),
            entities = graph.entity_count(),
            relations = graph.relation_count(),
            "saved graph"
        );
        Ok(())
    }

    fn load_graph(&self, graph_id: &str) -> Result<Option<KnowledgeGraph>> {
        self.ensure_connected()?;
        validate_graph_id(graph_id)?;
        let path = self.graph_path(graph_id);
        if !path.exists() {
            return Ok(None);
        }
        self.read_graph_file(&path).map(Some)
    }

    fn delete_graph(&self, graph_id: &str) -> Result<bool> {
        self.ensure_connected()?;
        validate_graph_id(graph_id)?;
        let path = self.graph_path(graph_id);
        let existed = path.exists();
        if existed {
            std::fs::remove_file(&path)?;
        }
        let mut listed = false;
        self.update_index(|graphs| {
            let before = graphs.len();
            graphs.retain(|s| s.id != graph_id);
            listed = graphs.len() != before;
        })?;
        if existed || listed {
            tracing::debug!(graph_id, "deleted graph");
        }
        Ok(existed)
    }

    fn list_graphs(&self) -> Result<Vec<GraphSummary>> {
        self.ensure_connected()?;
        let _guard = self.index_lock.lock();
        Ok(self.read_index()?.graphs)
    }

    fn query_entities(&self, filter: &EntityFilter) -> Result<Vec<Entity>> {
        self.ensure_connected()?;
        let mut found = Vec::new();
        for graph in self.target_graphs(filter.graph_id.as_ref())? {
            for entity in graph.entities().filter(|e| filter.matches(e)) {
                if found.len() >= filter.limit {
                    return Ok(found);
                }
                found.push(entity.clone());
            }
        }
        Ok(found)
    }

    fn query_relations(&self, filter: &RelationFilter) -> Result<Vec<Relation>> {
        self.ensure_connected()?;
        let mut found = Vec::new();
        for graph in self.target_graphs(filter.graph_id.as_ref())? {
            for relation in graph.relations().filter(|r| filter.matches(r)) {
                if found.len() >= filter.limit {
                    return Ok(found);
                }
                found.push(relation.clone());
            }
        }
        Ok(found)
    }

    fn add_entity(&self, graph_id: &str, entity: &Entity) -> Result<bool> {
        self.mutate(graph_id, |g| g.add_entity(entity.clone()))
    }

    fn update_entity(&self, graph_id: &str, entity: &Entity) -> Result<bool> {
        self.mutate(graph_id, |g| {
            g.contains_entity(&entity.id) && g.upsert_entity(entity.clone())
        })
    }

    fn remove_entity(&self, graph_id: &str, entity_id: &str) -> Result<bool> {
        self.mutate(graph_id, |g| g.remove_entity(entity_id))
    }

    fn add_relation(&self, graph_id: &str, relation: &Relation) -> Result<bool> {
        self.mutate(graph_id, |g| g.add_relation(relation.clone()))
    }

    fn update_relation(&self, graph_id: &str, relation: &Relation) -> Result<bool> {
        self.mutate(graph_id, |g| {
            g.contains_relation(&relation.id) && g.upsert_relation(relation.clone())
        })
    }

    fn remove_relation(&self, graph_id: &str, relation_id: &str) -> Result<bool> {
        self.mutate(graph_id, |g| g.remove_relation(relation_id))
    }
}
