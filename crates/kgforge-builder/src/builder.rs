//! The build pipeline.
//!
//! One build moves through fixed phases:
//!
//! 1. collect: run the extractors over every source
//! 2. deduplicate: align entities by normalized name
//! 3. populate: add the surviving entities
//! 4. filter: re-point relations onto survivors, drop the rest and anything
//!    outside the whitelist
//! 5. infer: add transitive, symmetric and hierarchical relations
//! 6. index: the graph maintains its own indexes; the phase only reports
//!
//! A source that fails to extract is logged and skipped.

use anyhow::{Context, Result};
use kgforge_extract::{
    deduplicate_entities, remap_relations, DatabaseEntityExtractor, DatabaseRelationExtractor,
    EntityExtractor, ExtractionContext, RelationExtractor, SchemaDescription, TextEntityExtractor,
    TextRelationExtractor,
};
use kgforge_model::{Entity, KnowledgeGraph, Relation, RelationType};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::time::Instant;

use crate::config::{BuilderConfig, WEIGHT_DATABASE_SCHEMA, WEIGHT_INFERENCE, WEIGHT_KEYWORD, WEIGHT_TEXT};
use crate::inference::infer_relations;
use crate::merge::merge_graphs;
use crate::validation::{validate_graph, ValidationReport};

// ============================================================================
// Sources
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GraphSource {
    Text {
        #[serde(default)]
        document_id: Option<String>,
        text: String,
    },
    Schema(SchemaDescription),
}

impl GraphSource {
    pub fn text(text: impl Into<String>) -> Self {
        GraphSource::Text {
            document_id: None,
            text: text.into(),
        }
    }

    pub fn document(document_id: impl Into<String>, text: impl Into<String>) -> Self {
        GraphSource::Text {
            document_id: Some(document_id.into()),
            text: text.into(),
        }
    }

    /// Tag looked up in [`BuilderConfig::source_weights`].
    pub fn weight_tag(&self) -> &'static str {
        match self {
            GraphSource::Text { .. } => WEIGHT_TEXT,
            GraphSource::Schema(_) => WEIGHT_DATABASE_SCHEMA,
        }
    }

    fn label(&self) -> String {
        match self {
            GraphSource::Text {
                document_id: Some(id),
                ..
            } => format!("document {id}"),
            GraphSource::Text { .. } => "text".to_string(),
            GraphSource::Schema(schema) => format!(
                "schema {}",
                schema.database_name.as_deref().unwrap_or("<unnamed>")
            ),
        }
    }
}

/// A source with an optional explicit weight overriding its tag weight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightedSource {
    pub source: GraphSource,
    #[serde(default)]
    pub weight: Option<f64>,
}

impl From<GraphSource> for WeightedSource {
    fn from(source: GraphSource) -> Self {
        Self { source, weight: None }
    }
}

#[derive(Debug, Clone, Default)]
struct Extraction {
    entities: Vec<Entity>,
    relations: Vec<Relation>,
}

/// Counts reported by [`KnowledgeGraphBuilder::update_graph`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateSummary {
    pub entities_added: usize,
    pub entities_merged: usize,
    pub relations_added: usize,
    pub relations_dropped: usize,
    pub relations_inferred: usize,
}

// ============================================================================
// Builder
// ============================================================================

pub struct KnowledgeGraphBuilder {
    config: BuilderConfig,
    text_entities: TextEntityExtractor,
    text_relations: TextRelationExtractor,
    schema_entities: DatabaseEntityExtractor,
    schema_relations: DatabaseRelationExtractor,
}

impl KnowledgeGraphBuilder {
    pub fn new(config: BuilderConfig) -> Result<Self> {
        let mut text_config = config.text.clone();
        text_config.whitelist = config.whitelist.clone();
        let text_entities =
            TextEntityExtractor::new(text_config.clone()).context("compiling entity patterns")?;
        let text_relations =
            TextRelationExtractor::new(text_config).context("compiling relation patterns")?;
        Ok(Self {
            schema_entities: DatabaseEntityExtractor::new(config.schema.clone()),
            schema_relations: DatabaseRelationExtractor::new(config.schema.clone()),
            text_entities,
            text_relations,
            config,
        })
    }

    pub fn config(&self) -> &BuilderConfig {
        &self.config
    }

    fn extract(&self, source: &GraphSource) -> Result<Extraction> {
        match source {
            GraphSource::Text { document_id, text } => {
                let context = document_id.as_deref().map(ExtractionContext::for_document);
                let entities = self.text_entities.extract_from_text(text, context.as_ref())?;
                let relations = self.text_relations.extract_from_text(text, &entities)?;
                Ok(Extraction { entities, relations })
            }
            GraphSource::Schema(schema) => {
                let entities = self.schema_entities.extract_from_database(schema)?;
                let relations = self.schema_relations.extract_from_database(schema, &entities)?;
                Ok(Extraction { entities, relations })
            }
        }
    }

    fn collect(&self, sources: &[GraphSource]) -> Extraction {
        let run = |source: &GraphSource| match self.extract(source) {
            Ok(extraction) => Some(extraction),
            Err(err) => {
                tracing::warn!(source = %source.label(), error = %err, "skipping source");
                None
            }
        };
        let results: Vec<Option<Extraction>> = if self.config.parallel_extraction {
            sources.par_iter().map(run).collect()
        } else {
            sources.iter().map(run).collect()
        };

        let mut collected = Extraction::default();
        for extraction in results.into_iter().flatten() {
            collected.entities.extend(extraction.entities);
            collected.relations.extend(extraction.relations);
        }
        collected
    }

    /// Run every phase over `sources` and return the populated graph.
    pub fn build_graph(&self, name: &str, sources: &[GraphSource]) -> Result<KnowledgeGraph> {
        let started = Instant::now();
        let collected = self.collect(sources);
        tracing::info!(
            sources = sources.len(),
            entities = collected.entities.len(),
            relations = collected.relations.len(),
            "collected candidates"
        );

        let aligned = deduplicate_entities(collected.entities);
        tracing::info!(
            survivors = aligned.entities.len(),
            merged = aligned.merged_count(),
            "deduplicated entities"
        );

        let mut graph = KnowledgeGraph::new(name);
        for entity in aligned.entities {
            graph.add_entity(entity);
        }

        let (remapped, dropped) = remap_relations(collected.relations, &aligned.id_map);
        let mut dropped_count = dropped.len();
        let mut seen: HashSet<(String, String, RelationType)> = HashSet::new();
        for relation in remapped {
            if !self.allowed(&graph, &relation) {
                dropped_count += 1;
                continue;
            }
            if !seen.insert((relation.head_id.clone(), relation.tail_id.clone(), relation.relation_type)) {
                continue;
            }
            if !graph.add_relation(relation) {
                dropped_count += 1;
            }
        }
        if dropped_count > 0 {
            tracing::warn!(graph_id = %graph.id(), dropped = dropped_count, "dropped relations");
        }

        let inferred = self.infer(&mut graph);
        tracing::info!(
            graph_id = %graph.id(),
            entities = graph.entity_count(),
            relations = graph.relation_count(),
            inferred,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "built graph"
        );
        Ok(graph)
    }

    fn allowed(&self, graph: &KnowledgeGraph, relation: &Relation) -> bool {
        match (graph.get_entity(&relation.head_id), graph.get_entity(&relation.tail_id)) {
            (Some(head), Some(tail)) => {
                self.config
                    .whitelist
                    .allows(head.entity_type, tail.entity_type, relation.relation_type)
            }
            _ => false,
        }
    }

    fn infer(&self, graph: &mut KnowledgeGraph) -> usize {
        if !self.config.infer_relations {
            return 0;
        }
        let mut added = 0;
        for relation in infer_relations(graph, &self.config) {
            if graph.add_relation(relation) {
                added += 1;
            }
        }
        added
    }

    /// Fold new entities and relations into an existing graph.
    ///
    /// An entity with a known id, or the same normalized name as an existing
    /// entity, is merged into it; relations follow that mapping and are kept
    /// when both endpoints exist and the edge is new and whitelisted.
    pub fn update_graph(
        &self,
        graph: &mut KnowledgeGraph,
        entities: Vec<Entity>,
        relations: Vec<Relation>,
    ) -> UpdateSummary {
        let mut summary = UpdateSummary::default();
        let mut id_map: HashMap<String, String> = HashMap::new();

        for entity in entities {
            let target = if graph.contains_entity(&entity.id) {
                Some(entity.id.clone())
            } else {
                let key = entity.normalized_name();
                graph
                    .entities()
                    .find(|e| e.normalized_name() == key)
                    .map(|e| e.id.clone())
            };

            match target.and_then(|id| graph.get_entity(&id).cloned()) {
                Some(mut existing) => {
                    existing.merge_attributes(&entity);
                    id_map.insert(entity.id, existing.id.clone());
                    graph.upsert_entity(existing);
                    summary.entities_merged += 1;
                }
                None => {
                    id_map.insert(entity.id.clone(), entity.id.clone());
                    if graph.add_entity(entity) {
                        summary.entities_added += 1;
                    }
                }
            }
        }

        let mut seen: HashSet<(String, String, RelationType)> = graph
            .relations()
            .map(|r| (r.head_id.clone(), r.tail_id.clone(), r.relation_type))
            .collect();
        for mut relation in relations {
            if let Some(head) = id_map.get(&relation.head_id) {
                relation.head_id = head.clone();
            }
            if let Some(tail) = id_map.get(&relation.tail_id) {
                relation.tail_id = tail.clone();
            }
            let fresh = seen.insert((relation.head_id.clone(), relation.tail_id.clone(), relation.relation_type));
            if fresh && self.allowed(graph, &relation) && graph.add_relation(relation) {
                summary.relations_added += 1;
            } else {
                summary.relations_dropped += 1;
            }
        }

        summary.relations_inferred = self.infer(graph);
        tracing::info!(
            graph_id = %graph.id(),
            added = summary.entities_added,
            merged = summary.entities_merged,
            relations = summary.relations_added,
            dropped = summary.relations_dropped,
            "updated graph"
        );
        summary
    }

    /// Build one graph per source, scale confidences by source weight, and
    /// merge the results.
    ///
    /// Keyword concepts and inferred relations take their own tag weights;
    /// everything else takes the explicit weight or the source's tag weight.
    pub fn build_from_sources(&self, name: &str, sources: &[WeightedSource]) -> Result<KnowledgeGraph> {
        let mut graphs = Vec::with_capacity(sources.len());
        for (index, weighted) in sources.iter().enumerate() {
            let part_name = format!("{name}#{index}");
            let mut graph = self
                .build_graph(&part_name, std::slice::from_ref(&weighted.source))
                .with_context(|| format!("building source {index}"))?;
            let base = weighted
                .weight
                .unwrap_or_else(|| self.config.source_weight(weighted.source.weight_tag()));
            self.apply_weights(&mut graph, base);
            graphs.push(graph);
        }
        Ok(merge_graphs(name, &graphs))
    }

    fn item_weight(&self, source_tag: &str, base: f64) -> f64 {
        if source_tag == kgforge_extract::text::SOURCE_KEYWORD {
            base.min(self.config.source_weight(WEIGHT_KEYWORD))
        } else if source_tag.ends_with("_inference") {
            base.min(self.config.source_weight(WEIGHT_INFERENCE))
        } else {
            base
        }
    }

    fn apply_weights(&self, graph: &mut KnowledgeGraph, base: f64) {
        let entities: Vec<Entity> = graph
            .entities()
            .map(|e| {
                let mut e = e.clone();
                e.set_confidence(e.confidence * self.item_weight(&e.source, base));
                e
            })
            .collect();
        let relations: Vec<Relation> = graph
            .relations()
            .map(|r| {
                let mut r = r.clone();
                r.set_confidence(r.confidence * self.item_weight(&r.source, base));
                r
            })
            .collect();
        for entity in entities {
            graph.upsert_entity(entity);
        }
        for relation in relations {
            graph.upsert_relation(relation);
        }
    }

    pub fn validate_graph(&self, graph: &KnowledgeGraph) -> ValidationReport {
        validate_graph(graph)
    }

    pub fn merge_graphs(&self, name: &str, graphs: &[KnowledgeGraph]) -> KnowledgeGraph {
        merge_graphs(name, graphs)
    }
}
