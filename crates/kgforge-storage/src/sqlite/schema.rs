//! Schema management and migrations

use rusqlite::Connection;
use tracing::{debug, info};

use crate::error::{Result, StorageError};

/// Increment when making schema changes.
pub const SCHEMA_VERSION: i32 = 1;

pub fn apply_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )?;

    let current_version = current_version(conn)?;
    debug!(current_version, target_version = SCHEMA_VERSION, "checking migrations");

    if current_version < 1 {
        info!(from = current_version, to = SCHEMA_VERSION, "applying schema migrations");
        apply_migration_v1(conn)?;
    }
    Ok(())
}

pub fn current_version(conn: &Connection) -> Result<i32> {
    let version: Option<i32> =
        conn.query_row("SELECT MAX(version) FROM schema_migrations", [], |row| row.get(0))?;
    Ok(version.unwrap_or(0))
}

fn record_migration(conn: &Connection, version: i32) -> Result<()> {
    conn.execute("INSERT INTO schema_migrations (version) VALUES (?1)", [version])?;
    Ok(())
}

/// Migration v1: graphs, labeled nodes and directed edges.
fn apply_migration_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA_V1)
        .map_err(|e| StorageError::Schema(format!("failed to apply v1 schema: {e}")))?;
    record_migration(conn, 1)?;
    info!("migration v1 applied");
    Ok(())
}

const SCHEMA_V1: &str = r#"
-- ============================================================================
-- TABLE: graphs
-- ============================================================================
-- One row per stored graph; doubles as the summary index.

CREATE TABLE IF NOT EXISTS graphs (
    id TEXT PRIMARY KEY NOT NULL,
    name TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    entity_count INTEGER NOT NULL DEFAULT 0,
    relation_count INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_graphs_updated ON graphs(updated_at);

-- ============================================================================
-- TABLE: nodes
-- ============================================================================
-- Entities; `label` is the entity type.

CREATE TABLE IF NOT EXISTS nodes (
    graph_id TEXT NOT NULL REFERENCES graphs(id) ON DELETE CASCADE,
    id TEXT NOT NULL,
    label TEXT NOT NULL,
    name TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    properties TEXT NOT NULL DEFAULT '{}',  -- JSON object
    aliases TEXT NOT NULL DEFAULT '[]',     -- JSON array
    confidence REAL NOT NULL,
    source TEXT NOT NULL DEFAULT '',
    created_at TEXT NOT NULL,
    PRIMARY KEY (graph_id, id)
);

CREATE INDEX IF NOT EXISTS idx_nodes_id ON nodes(id);
CREATE INDEX IF NOT EXISTS idx_nodes_label ON nodes(graph_id, label);

-- ============================================================================
-- TABLE: edges
-- ============================================================================
-- Directed relations between two nodes of the same graph.

CREATE TABLE IF NOT EXISTS edges (
    graph_id TEXT NOT NULL,
    id TEXT NOT NULL,
    head_id TEXT NOT NULL,
    tail_id TEXT NOT NULL,
    relation_type TEXT NOT NULL,
    properties TEXT NOT NULL DEFAULT '{}',
    confidence REAL NOT NULL,
    source TEXT NOT NULL DEFAULT '',
    created_at TEXT NOT NULL,
    PRIMARY KEY (graph_id, id),
    FOREIGN KEY (graph_id, head_id) REFERENCES nodes(graph_id, id) ON DELETE CASCADE,
    FOREIGN KEY (graph_id, tail_id) REFERENCES nodes(graph_id, id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_edges_type ON edges(relation_type);
CREATE INDEX IF NOT EXISTS idx_edges_head ON edges(graph_id, head_id);
CREATE INDEX IF NOT EXISTS idx_edges_tail ON edges(graph_id, tail_id);
"#;
