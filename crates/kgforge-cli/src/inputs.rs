//! Turning command-line paths into builder sources.

use anyhow::{Context, Result};
use kgforge_builder::GraphSource;
use kgforge_extract::SchemaDescription;
use std::path::Path;
use walkdir::WalkDir;

const TEXT_EXTENSIONS: &[&str] = &["txt", "md", "markdown", "text"];

fn is_text_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| TEXT_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
}

/// One text source per file. Directories are walked recursively for text
/// files; unreadable files are logged and skipped.
pub fn text_sources(paths: &[impl AsRef<Path>]) -> Vec<GraphSource> {
    let mut sources = Vec::new();
    for root in paths {
        let root = root.as_ref();
        if root.is_file() {
            push_text(&mut sources, root, root);
            continue;
        }
        for entry in WalkDir::new(root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.'))
        {
            let entry = match entry {
                Ok(e) => e,
                Err(err) => {
                    tracing::warn!(root = %root.display(), error = %err, "skipping unreadable entry");
                    continue;
                }
            };
            if entry.file_type().is_file() && is_text_file(entry.path()) {
                push_text(&mut sources, root, entry.path());
            }
        }
    }
    sources
}

fn push_text(sources: &mut Vec<GraphSource>, root: &Path, path: &Path) {
    match std::fs::read_to_string(path) {
        Ok(text) => {
            let document_id = path
                .strip_prefix(root)
                .ok()
                .filter(|rel| !rel.as_os_str().is_empty())
                .unwrap_or(path)
                .to_string_lossy()
                .into_owned();
            sources.push(GraphSource::document(document_id, text));
        }
        Err(err) => tracing::warn!(path = %path.display(), error = %err, "skipping unreadable document"),
    }
}

/// A schema from `.sql` DDL or the JSON description. DDL schemas are named
/// `database_name` or, failing that, the file stem.
pub fn schema_source(path: &Path, database_name: Option<&str>) -> Result<GraphSource> {
    let text = std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let is_sql = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("sql"));
    let schema = if is_sql {
        let stem = path.file_stem().map(|s| s.to_string_lossy().into_owned());
        SchemaDescription::from_sql_ddl(database_name.or(stem.as_deref()), &text)
    } else {
        SchemaDescription::from_json(&text)
    }
    .with_context(|| format!("invalid schema {}", path.display()))?;
    Ok(GraphSource::Schema(schema))
}
