//! Graph-database backend on SQLite.
//!
//! Entities become rows of `nodes` labeled with their type; relations become
//! directed `edges` between two nodes of the same graph. The `graphs` table is
//! the summary index and is refreshed inside the same transaction as every
//! write. Per-item mutators are native upsert/delete statements.

pub mod schema;

use chrono::{DateTime, SecondsFormat, Utc};
use kgforge_model::{Entity, EntityType, GraphRecord, KnowledgeGraph, Relation, RelationType};
use parking_lot::Mutex;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::{debug, info};

use crate::error::{Result, StorageError};
use crate::{EntityFilter, GraphStorage, GraphSummary, RelationFilter};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Location {
    File(PathBuf),
    Memory,
}

pub struct SqliteGraphStorage {
    location: Location,
    conn: Option<Mutex<Connection>>,
}

impl std::fmt::Debug for SqliteGraphStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteGraphStorage")
            .field("location", &self.location)
            .field("connected", &self.conn.is_some())
            .finish()
    }
}

fn fmt_time(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_time(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|e| StorageError::Corrupt(format!("bad timestamp `{raw}`: {e}")))
}

const NODE_COLUMNS: &str = "id, label, name, description, properties, aliases, confidence, source, created_at";
const EDGE_COLUMNS: &str = "id, head_id, tail_id, relation_type, properties, confidence, source, created_at";

// ============================================================================
// Row mapping
// ============================================================================

struct NodeRow {
    id: String,
    label: String,
    name: String,
    description: String,
    properties: String,
    aliases: String,
    confidence: f64,
    source: String,
    created_at: String,
}

impl NodeRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            label: row.get(1)?,
            name: row.get(2)?,
            description: row.get(3)?,
            properties: row.get(4)?,
            aliases: row.get(5)?,
            confidence: row.get(6)?,
            source: row.get(7)?,
            created_at: row.get(8)?,
        })
    }

    fn into_entity(self) -> Result<Entity> {
        let entity_type =
            EntityType::from_str(&self.label).map_err(|e| StorageError::Corrupt(e.to_string()))?;
        Ok(Entity {
            id: self.id,
            name: self.name,
            entity_type,
            description: self.description,
            properties: serde_json::from_str(&self.properties)?,
            aliases: serde_json::from_str(&self.aliases)?,
            confidence: self.confidence,
            source: self.source,
            created_at: parse_time(&self.created_at)?,
        })
    }
}

struct EdgeRow {
    id: String,
    head_id: String,
    tail_id: String,
    relation_type: String,
    properties: String,
    confidence: f64,
    source: String,
    created_at: String,
}

impl EdgeRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            head_id: row.get(1)?,
            tail_id: row.get(2)?,
            relation_type: row.get(3)?,
            properties: row.get(4)?,
            confidence: row.get(5)?,
            source: row.get(6)?,
            created_at: row.get(7)?,
        })
    }

    fn into_relation(self) -> Result<Relation> {
        let relation_type = RelationType::from_str(&self.relation_type)
            .map_err(|e| StorageError::Corrupt(e.to_string()))?;
        Ok(Relation {
            id: self.id,
            head_id: self.head_id,
            tail_id: self.tail_id,
            relation_type,
            properties: serde_json::from_str(&self.properties)?,
            confidence: self.confidence,
            source: self.source,
            created_at: parse_time(&self.created_at)?,
        })
    }
}

fn read_summary(row: &Row<'_>) -> rusqlite::Result<(String, String, String, String, i64, i64)> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?, row.get(5)?))
}

fn into_summary(raw: (String, String, String, String, i64, i64)) -> Result<GraphSummary> {
    let (id, name, created_at, updated_at, entity_count, relation_count) = raw;
    Ok(GraphSummary {
        id,
        name,
        created_at: parse_time(&created_at)?,
        updated_at: parse_time(&updated_at)?,
        entity_count: usize::try_from(entity_count).unwrap_or(0),
        relation_count: usize::try_from(relation_count).unwrap_or(0),
    })
}

// ============================================================================
// Statements
// ============================================================================

fn insert_node(conn: &Connection, graph_id: &str, entity: &Entity) -> Result<usize> {
    let changed = conn.execute(
        "INSERT INTO nodes (graph_id, id, label, name, description, properties, aliases, confidence, source, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
         ON CONFLICT(graph_id, id) DO NOTHING",
        params![
            graph_id,
            entity.id,
            entity.entity_type.as_str(),
            entity.name,
            entity.description,
            serde_json::to_string(&entity.properties)?,
            serde_json::to_string(&entity.aliases)?,
            entity.confidence,
            entity.source,
            fmt_time(entity.created_at),
        ],
    )?;
    Ok(changed)
}

fn insert_edge(conn: &Connection, graph_id: &str, relation: &Relation) -> Result<usize> {
    let changed = conn.execute(
        "INSERT INTO edges (graph_id, id, head_id, tail_id, relation_type, properties, confidence, source, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
         ON CONFLICT(graph_id, id) DO NOTHING",
        params![
            graph_id,
            relation.id,
            relation.head_id,
            relation.tail_id,
            relation.relation_type.as_str(),
            serde_json::to_string(&relation.properties)?,
            relation.confidence,
            relation.source,
            fmt_time(relation.created_at),
        ],
    )?;
    Ok(changed)
}

fn graph_exists(conn: &Connection, graph_id: &str) -> Result<bool> {
    let found: Option<i64> = conn
        .query_row("SELECT 1 FROM graphs WHERE id = ?1", [graph_id], |row| row.get(0))
        .optional()?;
    Ok(found.is_some())
}

fn endpoints_exist(conn: &Connection, graph_id: &str, relation: &Relation) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM nodes WHERE graph_id = ?1 AND id IN (?2, ?3)",
        params![graph_id, relation.head_id, relation.tail_id],
        |row| row.get(0),
    )?;
    Ok(count == 2)
}

/// Recount the graph's rows and stamp `updated_at`.
fn refresh_summary(conn: &Connection, graph_id: &str) -> Result<()> {
    conn.execute(
        "UPDATE graphs SET
            entity_count = (SELECT COUNT(*) FROM nodes WHERE graph_id = ?1),
            relation_count = (SELECT COUNT(*) FROM edges WHERE graph_id = ?1),
            updated_at = ?2
         WHERE id = ?1",
        params![graph_id, fmt_time(Utc::now())],
    )?;
    Ok(())
}

// ============================================================================
// Backend
// ============================================================================

impl SqliteGraphStorage {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            location: Location::File(path.into()),
            conn: None,
        }
    }

    /// A private in-memory database. Its contents are dropped on disconnect.
    pub fn in_memory() -> Self {
        Self {
            location: Location::Memory,
            conn: None,
        }
    }

    fn with_connection<T>(&self, f: impl FnOnce(&mut Connection) -> Result<T>) -> Result<T> {
        let conn = self.conn.as_ref().ok_or(StorageError::NotConnected)?;
        let mut guard = conn.lock();
        f(&mut guard)
    }

    /// Run `f` in a transaction after checking the graph exists; the summary
    /// row is refreshed when `f` reports a change.
    fn mutate(&self, graph_id: &str, f: impl FnOnce(&Connection) -> Result<bool>) -> Result<bool> {
        self.with_connection(|conn| {
            let tx = conn.transaction()?;
            if !graph_exists(&tx, graph_id)? {
                return Err(StorageError::not_found(graph_id));
            }
            let changed = f(&tx)?;
            if changed {
                refresh_summary(&tx, graph_id)?;
            }
            tx.commit()?;
            Ok(changed)
        })
    }

    pub fn schema_version(&self) -> Result<i32> {
        self.with_connection(|conn| schema::current_version(conn))
    }
}

impl GraphStorage for SqliteGraphStorage {
    fn backend_name(&self) -> &'static str {
        "sqlite"
    }

    fn connect(&mut self) -> Result<()> {
        if self.conn.is_some() {
            return Ok(());
        }
        let conn = match &self.location {
            Location::Memory => Connection::open_in_memory()?,
            Location::File(path) => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent)?;
                }
                let conn = Connection::open(path)?;
                conn.execute_batch("PRAGMA journal_mode = WAL;")?;
                conn.execute_batch("PRAGMA synchronous = NORMAL;")?;
                conn
            }
        };
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        schema::apply_migrations(&conn)?;
        info!(location = ?self.location, "sqlite storage connected");
        self.conn = Some(Mutex::new(conn));
        Ok(())
    }

    fn disconnect(&mut self) -> Result<()> {
        if self.conn.take().is_some() {
            debug!(location = ?self.location, "sqlite storage disconnected");
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    fn save_graph(&self, graph: &KnowledgeGraph) -> Result<()> {
        self.with_connection(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO graphs (id, name, created_at, updated_at, entity_count, relation_count)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(id) DO UPDATE SET
                    name = excluded.name,
                    created_at = excluded.created_at,
                    updated_at = excluded.updated_at,
                    entity_count = excluded.entity_count,
                    relation_count = excluded.relation_count",
                params![
                    graph.id(),
                    graph.name(),
                    fmt_time(graph.created_at()),
                    fmt_time(graph.updated_at()),
                    graph.entity_count() as i64,
                    graph.relation_count() as i64,
                ],
            )?;
            tx.execute("DELETE FROM edges WHERE graph_id = ?1", [graph.id()])?;
            tx.execute("DELETE FROM nodes WHERE graph_id = ?1", [graph.id()])?;
            for entity in graph.entities() {
                insert_node(&tx, graph.id(), entity)?;
            }
            for relation in graph.relations() {
                insert_edge(&tx, graph.id(), relation)?;
            }
            tx.commit()?;
            debug!(
                graph_id = %graph.id(),
                entities = graph.entity_count(),
                relations = graph.relation_count(),
                "saved graph"
            );
            Ok(())
        })
    }

    fn load_graph(&self, graph_id: &str) -> Result<Option<KnowledgeGraph>> {
        self.with_connection(|conn| {
            let header = conn
                .query_row(
                    "SELECT id, name, created_at, updated_at, entity_count, relation_count
                     FROM graphs WHERE id = ?1",
                    [graph_id],
                    read_summary,
                )
                .optional()?;
            let Some(header) = header else {
                return Ok(None);
            };
            let summary = into_summary(header)?;

            let mut entities = BTreeMap::new();
            let mut stmt = conn.prepare(&format!("SELECT {NODE_COLUMNS} FROM nodes WHERE graph_id = ?1"))?;
            for row in stmt.query_map([graph_id], NodeRow::read)? {
                let entity = row?.into_entity()?;
                entities.insert(entity.id.clone(), entity);
            }

            let mut relations = BTreeMap::new();
            let mut stmt = conn.prepare(&format!("SELECT {EDGE_COLUMNS} FROM edges WHERE graph_id = ?1"))?;
            for row in stmt.query_map([graph_id], EdgeRow::read)? {
                let relation = row?.into_relation()?;
                relations.insert(relation.id.clone(), relation);
            }

            Ok(Some(KnowledgeGraph::from_record(GraphRecord {
                id: summary.id,
                name: summary.name,
                entities,
                relations,
                created_at: summary.created_at,
                updated_at: summary.updated_at,
            })))
        })
    }

    fn delete_graph(&self, graph_id: &str) -> Result<bool> {
        self.with_connection(|conn| {
            let deleted = conn.execute("DELETE FROM graphs WHERE id = ?1", [graph_id])? > 0;
            if deleted {
                debug!(graph_id, "deleted graph");
            }
            Ok(deleted)
        })
    }

    fn list_graphs(&self) -> Result<Vec<GraphSummary>> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, name, created_at, updated_at, entity_count, relation_count
                 FROM graphs ORDER BY updated_at DESC, id ASC",
            )?;
            let rows = stmt.query_map([], read_summary)?;
            let mut summaries = Vec::new();
            for row in rows {
                summaries.push(into_summary(row?)?);
            }
            Ok(summaries)
        })
    }

    fn query_entities(&self, filter: &EntityFilter) -> Result<Vec<Entity>> {
        self.with_connection(|conn| {
            let mut sql = format!("SELECT {NODE_COLUMNS} FROM nodes WHERE 1 = 1");
            let mut values: Vec<Value> = Vec::new();
            if let Some(graph_id) = &filter.graph_id {
                sql.push_str(" AND graph_id = ?");
                values.push(Value::Text(graph_id.clone()));
            }
            if let Some(entity_type) = filter.entity_type {
                sql.push_str(" AND label = ?");
                values.push(Value::Text(entity_type.as_str().to_string()));
            }
            if let Some(min) = filter.min_confidence {
                sql.push_str(" AND confidence >= ?");
                values.push(Value::Real(min));
            }
            sql.push_str(" ORDER BY graph_id, id");

            // Name matching stays in Rust: SQLite's LOWER only folds ASCII.
            let mut stmt = conn.prepare(&sql)?;
            let mut found = Vec::new();
            for row in stmt.query_map(params_from_iter(values.iter()), NodeRow::read)? {
                if found.len() >= filter.limit {
                    break;
                }
                let entity = row?.into_entity()?;
                if filter.matches(&entity) {
                    found.push(entity);
                }
            }
            Ok(found)
        })
    }

    fn query_relations(&self, filter: &RelationFilter) -> Result<Vec<Relation>> {
        self.with_connection(|conn| {
            let mut sql = format!("SELECT {EDGE_COLUMNS} FROM edges WHERE 1 = 1");
            let mut values: Vec<Value> = Vec::new();
            if let Some(graph_id) = &filter.graph_id {
                sql.push_str(" AND graph_id = ?");
                values.push(Value::Text(graph_id.clone()));
            }
            if let Some(head_id) = &filter.head_id {
                sql.push_str(" AND head_id = ?");
                values.push(Value::Text(head_id.clone()));
            }
            if let Some(tail_id) = &filter.tail_id {
                sql.push_str(" AND tail_id = ?");
                values.push(Value::Text(tail_id.clone()));
            }
            if let Some(relation_type) = filter.relation_type {
                sql.push_str(" AND relation_type = ?");
                values.push(Value::Text(relation_type.as_str().to_string()));
            }
            sql.push_str(" ORDER BY graph_id, id LIMIT ?");
            values.push(Value::Integer(i64::try_from(filter.limit).unwrap_or(i64::MAX)));

            let mut stmt = conn.prepare(&sql)?;
            let mut found = Vec::new();
            for row in stmt.query_map(params_from_iter(values.iter()), EdgeRow::read)? {
                found.push(row?.into_relation()?);
            }
            Ok(found)
        })
    }

    fn add_entity(&self, graph_id: &str, entity: &Entity) -> Result<bool> {
        self.mutate(graph_id, |conn| Ok(insert_node(conn, graph_id, entity)? > 0))
    }

    fn update_entity(&self, graph_id: &str, entity: &Entity) -> Result<bool> {
        self.mutate(graph_id, |conn| {
            let changed = conn.execute(
                "UPDATE nodes SET label = ?3, name = ?4, description = ?5, properties = ?6,
                    aliases = ?7, confidence = ?8, source = ?9, created_at = ?10
                 WHERE graph_id = ?1 AND id = ?2",
                params![
                    graph_id,
                    entity.id,
                    entity.entity_type.as_str(),
                    entity.name,
                    entity.description,
                    serde_json::to_string(&entity.properties)?,
                    serde_json::to_string(&entity.aliases)?,
                    entity.confidence,
                    entity.source,
                    fmt_time(entity.created_at),
                ],
            )?;
            Ok(changed > 0)
        })
    }

    fn remove_entity(&self, graph_id: &str, entity_id: &str) -> Result<bool> {
        // Touching edges go with the node through ON DELETE CASCADE.
        self.mutate(graph_id, |conn| {
            let changed = conn.execute(
                "DELETE FROM nodes WHERE graph_id = ?1 AND id = ?2",
                params![graph_id, entity_id],
            )?;
            Ok(changed > 0)
        })
    }

    fn add_relation(&self, graph_id: &str, relation: &Relation) -> Result<bool> {
        self.mutate(graph_id, |conn| {
            if !relation.is_valid() || !endpoints_exist(conn, graph_id, relation)? {
                return Ok(false);
            }
            Ok(insert_edge(conn, graph_id, relation)? > 0)
        })
    }

    fn update_relation(&self, graph_id: &str, relation: &Relation) -> Result<bool> {
        self.mutate(graph_id, |conn| {
            if !relation.is_valid() || !endpoints_exist(conn, graph_id, relation)? {
                return Ok(false);
            }
            let changed = conn.execute(
                "UPDATE edges SET head_id = ?3, tail_id = ?4, relation_type = ?5, properties = ?6,
                    confidence = ?7, source = ?8, created_at = ?9
                 WHERE graph_id = ?1 AND id = ?2",
                params![
                    graph_id,
                    relation.id,
                    relation.head_id,
                    relation.tail_id,
                    relation.relation_type.as_str(),
                    serde_json::to_string(&relation.properties)?,
                    relation.confidence,
                    relation.source,
                    fmt_time(relation.created_at),
                ],
            )?;
            Ok(changed > 0)
        })
    }

    fn remove_relation(&self, graph_id: &str, relation_id: &str) -> Result<bool> {
        self.mutate(graph_id, |conn| {
            let changed = conn.execute(
                "DELETE FROM edges WHERE graph_id = ?1 AND id = ?2",
                params![graph_id, relation_id],
            )?;
            Ok(changed > 0)
        })
    }
}
