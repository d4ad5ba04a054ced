//! KGForge extraction: candidate entities and relations from raw inputs.
//!
//! Two extractor families share the [`EntityExtractor`] / [`RelationExtractor`]
//! contracts:
//!
//! - [`text`]: regular-expression entity patterns, keyword concepts, relation
//!   phrase templates and sentence co-occurrence
//! - [`database`]: deterministic mapping of a [`SchemaDescription`] to
//!   database/table/column entities plus heuristic business concepts
//!
//! [`dedup`] holds the name-based alignment shared with the builder, and
//! [`whitelist`] the accepted (head type, tail type, relation type) triples.

pub mod database;
pub mod dedup;
pub mod schema;
pub mod text;
pub mod whitelist;

use kgforge_model::{Entity, Relation};

pub use database::{DatabaseEntityExtractor, DatabaseRelationExtractor, SchemaExtractorConfig};
pub use dedup::{deduplicate_entities, remap_relations, Deduplicated};
pub use schema::{ColumnSchema, ForeignKeyRef, SchemaDescription, TableSchema};
pub use text::{
    EntityPattern, RelationPattern, TextEntityExtractor, TextExtractorConfig,
    TextRelationExtractor,
};
pub use whitelist::RelationWhitelist;

/// Errors raised while extracting from a single input.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("document is empty")]
    EmptyDocument,

    #[error("document of {len} bytes exceeds the {limit} byte limit")]
    DocumentTooLarge { len: usize, limit: usize },

    #[error("invalid pattern `{pattern}`: {source}")]
    InvalidPattern {
        pattern: String,
        source: regex::Error,
    },

    #[error("invalid schema: {0}")]
    Schema(String),

    #[error("schema JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("SQL DDL: {0}")]
    Sql(#[from] sqlparser::parser::ParserError),
}

pub type Result<T> = std::result::Result<T, ExtractError>;

/// Per-document information handed to text extraction.
#[derive(Debug, Clone, Default)]
pub struct ExtractionContext {
    /// Recorded as the `document_id` property on every produced entity.
    pub document_id: Option<String>,
}

impl ExtractionContext {
    pub fn for_document(document_id: impl Into<String>) -> Self {
        Self {
            document_id: Some(document_id.into()),
        }
    }
}

pub trait EntityExtractor: Send + Sync {
    fn extract_from_text(&self, text: &str, context: Option<&ExtractionContext>) -> Result<Vec<Entity>>;

    fn extract_from_database(&self, schema: &SchemaDescription) -> Result<Vec<Entity>>;
}

pub trait RelationExtractor: Send + Sync {
    fn extract_from_text(&self, text: &str, entities: &[Entity]) -> Result<Vec<Relation>>;

    fn extract_from_database(
        &self,
        schema: &SchemaDescription,
        entities: &[Entity],
    ) -> Result<Vec<Relation>>;
}

#[cfg(test)]
mod tests;
