//! Builder configuration.

use kgforge_extract::{RelationWhitelist, SchemaExtractorConfig, TextExtractorConfig};
use kgforge_model::EntityType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const WEIGHT_DATABASE_SCHEMA: &str = "database_schema";
pub const WEIGHT_TEXT: &str = "text_extraction";
pub const WEIGHT_KEYWORD: &str = "keyword_extraction";
pub const WEIGHT_INFERENCE: &str = "inference";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuilderConfig {
    /// Multiplier on `min(c1, c2)` for transitive `contains`.
    pub transitive_factor: f64,
    /// Multiplier on the original confidence for reversed symmetric edges.
    pub symmetric_factor: f64,
    pub hierarchy_confidence: f64,
    /// (parent type, child type) pairs considered by hierarchy inference.
    pub hierarchy_pairs: Vec<(EntityType, EntityType)>,
    pub infer_relations: bool,
    pub whitelist: RelationWhitelist,
    /// Confidence multipliers keyed by source tag, used by multi-source builds.
    pub source_weights: BTreeMap<String, f64>,
    /// Extract documents on the rayon pool; output order is unchanged.
    pub parallel_extraction: bool,
    pub text: TextExtractorConfig,
    pub schema: SchemaExtractorConfig,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        use EntityType::*;
        Self {
            transitive_factor: 0.8,
            symmetric_factor: 0.9,
            hierarchy_confidence: 0.6,
            hierarchy_pairs: vec![
                (Database, Table),
                (Table, Column),
                (Organization, Person),
                (Document, Concept),
                (Document, Keyword),
            ],
            infer_relations: true,
            whitelist: RelationWhitelist::default(),
            source_weights: [
                (WEIGHT_DATABASE_SCHEMA, 1.0),
                (WEIGHT_TEXT, 0.8),
                (WEIGHT_KEYWORD, 0.6),
                (WEIGHT_INFERENCE, 0.4),
            ]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect(),
            parallel_extraction: false,
            text: TextExtractorConfig::default(),
            schema: SchemaExtractorConfig::default(),
        }
    }
}

impl BuilderConfig {
    /// Weight for a source tag; unknown tags weigh 1.0.
    pub fn source_weight(&self, tag: &str) -> f64 {
        self.source_weights.get(tag).copied().unwrap_or(1.0)
    }
}
