//! Schema-driven extraction.
//!
//! The mapping is deterministic: one `database` entity, one `table` entity per
//! table and one `column` entity per non-common column, all at confidence 1.0.
//! Business concepts inferred from table names are heuristic and carry 0.7.

use kgforge_model::{Entity, EntityType, Relation, RelationType};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::schema::{ColumnSchema, SchemaDescription, TableSchema};
use crate::{EntityExtractor, ExtractionContext, RelationExtractor, Result};

pub const SOURCE_DATABASE: &str = "database_extraction";
pub const SOURCE_BUSINESS: &str = "business_inference";
pub const SOURCE_SCHEMA: &str = "database_schema";
pub const SOURCE_NAME_SIMILARITY: &str = "name_similarity";

const DEFAULT_DATABASE_NAME: &str = "database";
const DEFAULT_REFERENTIAL_ACTION: &str = "RESTRICT";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaExtractorConfig {
    /// Audit columns never turned into entities. Matched case-insensitively.
    pub common_columns: Vec<String>,
    /// Stripped from table names to form the clean name; first match wins.
    pub table_prefixes: Vec<String>,
    /// Keyword found in a clean table name -> business concept name.
    pub business_keywords: BTreeMap<String, String>,
    pub business_confidence: f64,
    /// Tables whose name-token Jaccard similarity is strictly above this are
    /// linked `similar_to`.
    pub table_similarity_threshold: f64,
}

impl Default for SchemaExtractorConfig {
    fn default() -> Self {
        let business_keywords = [
            ("user", "User Management"),
            ("customer", "Customer Management"),
            ("order", "Order Management"),
            ("product", "Product Management"),
            ("inventory", "Inventory Management"),
            ("payment", "Payment Processing"),
            ("shipment", "Shipping Management"),
            ("category", "Category Management"),
            ("review", "Review System"),
            ("cart", "Shopping Cart"),
            ("wishlist", "Wishlist Management"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        Self {
            common_columns: ["id", "created_at", "updated_at", "deleted_at"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            table_prefixes: ["tbl_", "tb_", "t_"].iter().map(|s| s.to_string()).collect(),
            business_keywords,
            business_confidence: 0.7,
            table_similarity_threshold: 0.6,
        }
    }
}

impl SchemaExtractorConfig {
    pub fn is_common_column(&self, column: &str) -> bool {
        self.common_columns.iter().any(|c| c.eq_ignore_ascii_case(column))
    }

    /// Lower-cased table name with the first matching prefix removed.
    pub fn clean_table_name(&self, table: &str) -> String {
        let lowered = table.to_lowercase();
        self.table_prefixes
            .iter()
            .find_map(|p| lowered.strip_prefix(p.to_lowercase().as_str()).map(str::to_string))
            .filter(|rest| !rest.is_empty())
            .unwrap_or(lowered)
    }
}

fn database_name(schema: &SchemaDescription) -> &str {
    schema
        .database_name
        .as_deref()
        .filter(|n| !n.trim().is_empty())
        .unwrap_or(DEFAULT_DATABASE_NAME)
}

pub fn column_entity_name(table: &str, column: &str) -> String {
    format!("{table}.{column}")
}

/// Jaccard similarity of the lower-cased `_`-separated tokens of two names.
pub fn table_name_similarity(a: &str, b: &str) -> f64 {
    let tokens = |s: &str| -> BTreeSet<String> {
        s.to_lowercase()
            .split('_')
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect()
    };
    let (a, b) = (tokens(a), tokens(b));
    let union = a.union(&b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(&b).count() as f64 / union as f64
}

// ============================================================================
// Entities
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct DatabaseEntityExtractor {
    config: SchemaExtractorConfig,
}

impl DatabaseEntityExtractor {
    pub fn new(config: SchemaExtractorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SchemaExtractorConfig {
        &self.config
    }

    fn database_entity(&self, schema: &SchemaDescription) -> Entity {
        let name = database_name(schema);
        let description = schema.description.as_deref().unwrap_or(name);
        Entity::new(name, EntityType::Database)
            .with_description(format!("Database: {description}"))
            .with_confidence(1.0)
            .with_source(SOURCE_DATABASE)
    }

    fn table_entity(&self, table: &TableSchema) -> Entity {
        let description = table
            .comment
            .clone()
            .filter(|c| !c.trim().is_empty())
            .unwrap_or_else(|| format!("Table: {}", table.name));
        let mut entity = Entity::new(table.name.as_str(), EntityType::Table)
            .with_description(description)
            .with_confidence(1.0)
            .with_source(SOURCE_DATABASE)
            .with_property("schema", json!(table.schema))
            .with_property("row_count", table.row_count.unwrap_or(0))
            .with_property("size_mb", json!(table.size_mb))
            .with_property("engine", json!(table.engine))
            .with_property("created_at", json!(table.created_at))
            .with_property("column_count", table.columns.len());

        let clean = self.config.clean_table_name(&table.name);
        if clean != table.name {
            entity.add_alias(clean);
        }
        entity
    }

    fn column_entity(&self, table: &TableSchema, column: &ColumnSchema) -> Entity {
        let foreign_key = column
            .foreign_key
            .as_ref()
            .map_or(Value::Null, |fk| json!({ "table": fk.table, "column": fk.column }));
        let description = column
            .comment
            .clone()
            .filter(|c| !c.trim().is_empty())
            .unwrap_or_else(|| format!("Column: {}.{}", table.name, column.name));

        Entity::new(column_entity_name(&table.name, &column.name), EntityType::Column)
            .with_description(description)
            .with_confidence(1.0)
            .with_source(SOURCE_DATABASE)
            .with_alias(column.name.as_str())
            .with_property("table", table.name.as_str())
            .with_property("column", column.name.as_str())
            .with_property("data_type", json!(column.data_type))
            .with_property("max_length", json!(column.max_length))
            .with_property("nullable", column.nullable)
            .with_property("default_value", column.default.clone().unwrap_or(Value::Null))
            .with_property("primary_key", column.primary_key)
            .with_property("foreign_key", foreign_key)
            .with_property("unique", column.unique)
            .with_property("indexed", column.indexed)
    }

    /// Concept names whose keyword occurs in some clean table name, each once.
    pub fn business_concepts(&self, schema: &SchemaDescription) -> Vec<String> {
        let mut concepts = BTreeSet::new();
        for table in &schema.tables {
            let clean = self.config.clean_table_name(&table.name);
            for (keyword, concept) in &self.config.business_keywords {
                if clean.contains(keyword.as_str()) {
                    concepts.insert(concept.clone());
                }
            }
        }
        concepts.into_iter().collect()
    }
}

impl EntityExtractor for DatabaseEntityExtractor {
    fn extract_from_text(&self, _text: &str, _context: Option<&ExtractionContext>) -> Result<Vec<Entity>> {
        Ok(Vec::new())
    }

    fn extract_from_database(&self, schema: &SchemaDescription) -> Result<Vec<Entity>> {
        let mut entities = vec![self.database_entity(schema)];
        let mut skipped = 0usize;

        for table in &schema.tables {
            entities.push(self.table_entity(table));
            for column in &table.columns {
                if self.config.is_common_column(&column.name) {
                    skipped += 1;
                    continue;
                }
                entities.push(self.column_entity(table, column));
            }
        }

        for concept in self.business_concepts(schema) {
            entities.push(
                Entity::new(concept.as_str(), EntityType::Concept)
                    .with_description(format!("Business concept: {concept}"))
                    .with_confidence(self.config.business_confidence)
                    .with_source(SOURCE_BUSINESS),
            );
        }

        tracing::debug!(
            database = database_name(schema),
            tables = schema.tables.len(),
            entities = entities.len(),
            skipped_columns = skipped,
            "schema entity extraction finished"
        );
        Ok(entities)
    }
}

// ============================================================================
// Relations
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct DatabaseRelationExtractor {
    config: SchemaExtractorConfig,
}

/// `(type, exact name) -> entity` lookup over the extracted entities.
struct EntityLookup<'a> {
    by_key: HashMap<(EntityType, &'a str), &'a Entity>,
}

impl<'a> EntityLookup<'a> {
    fn new(entities: &'a [Entity]) -> Self {
        let mut by_key = HashMap::new();
        for entity in entities {
            by_key
                .entry((entity.entity_type, entity.name.as_str()))
                .or_insert(entity);
        }
        Self { by_key }
    }

    fn get(&self, entity_type: EntityType, name: &str) -> Option<&'a Entity> {
        self.by_key.get(&(entity_type, name)).copied()
    }
}

impl DatabaseRelationExtractor {
    pub fn new(config: SchemaExtractorConfig) -> Self {
        Self { config }
    }

    fn structure_relations(
        &self,
        schema: &SchemaDescription,
        lookup: &EntityLookup<'_>,
        out: &mut Vec<Relation>,
    ) {
        let database = lookup.get(EntityType::Database, database_name(schema));

        for table in &schema.tables {
            let Some(table_entity) = lookup.get(EntityType::Table, &table.name) else {
                continue;
            };
            if let Some(db) = database {
                out.push(
                    Relation::between(db, table_entity, RelationType::Contains)
                        .with_confidence(1.0)
                        .with_source(SOURCE_SCHEMA)
                        .with_property("schema_name", json!(table.schema))
                        .with_property("table_type", table.table_type.as_deref().unwrap_or("table")),
                );
            }

            for (index, column) in table.columns.iter().enumerate() {
                let name = column_entity_name(&table.name, &column.name);
                let Some(column_entity) = lookup.get(EntityType::Column, &name) else {
                    continue;
                };
                let position = column.position.unwrap_or(index as u64 + 1);
                out.push(
                    Relation::between(table_entity, column_entity, RelationType::Contains)
                        .with_confidence(1.0)
                        .with_source(SOURCE_SCHEMA)
                        .with_property("column_position", position)
                        .with_property("is_primary_key", column.primary_key)
                        .with_property("is_nullable", column.nullable),
                );
            }
        }
    }

    fn foreign_key_relations(
        &self,
        schema: &SchemaDescription,
        lookup: &EntityLookup<'_>,
        out: &mut Vec<Relation>,
    ) {
        for table in &schema.tables {
            for column in &table.columns {
                let Some(fk) = &column.foreign_key else {
                    continue;
                };
                let source = lookup.get(EntityType::Column, &column_entity_name(&table.name, &column.name));
                let target = lookup.get(EntityType::Column, &column_entity_name(&fk.table, &fk.column));
                let (Some(source), Some(target)) = (source, target) else {
                    tracing::trace!(
                        table = %table.name,
                        column = %column.name,
                        references = %column_entity_name(&fk.table, &fk.column),
                        "foreign key endpoint not extracted"
                    );
                    continue;
                };
                out.push(
                    Relation::between(source, target, RelationType::ForeignKey)
                        .with_confidence(1.0)
                        .with_source(SOURCE_SCHEMA)
                        .with_property("constraint_name", json!(fk.constraint_name))
                        .with_property(
                            "on_delete",
                            fk.on_delete.as_deref().unwrap_or(DEFAULT_REFERENTIAL_ACTION),
                        )
                        .with_property(
                            "on_update",
                            fk.on_update.as_deref().unwrap_or(DEFAULT_REFERENTIAL_ACTION),
                        ),
                );
            }
        }
    }

    fn similarity_relations(
        &self,
        schema: &SchemaDescription,
        lookup: &EntityLookup<'_>,
        out: &mut Vec<Relation>,
    ) {
        for (i, first) in schema.tables.iter().enumerate() {
            for second in &schema.tables[i + 1..] {
                let score = table_name_similarity(&first.name, &second.name);
                if score <= self.config.table_similarity_threshold {
                    continue;
                }
                let (Some(a), Some(b)) = (
                    lookup.get(EntityType::Table, &first.name),
                    lookup.get(EntityType::Table, &second.name),
                ) else {
                    continue;
                };
                if a.id == b.id {
                    continue;
                }
                out.push(
                    Relation::between(a, b, RelationType::SimilarTo)
                        .with_confidence(score)
                        .with_source(SOURCE_NAME_SIMILARITY)
                        .with_property("similarity_score", score),
                );
            }
        }
    }
}

impl RelationExtractor for DatabaseRelationExtractor {
    fn extract_from_text(&self, _text: &str, _entities: &[Entity]) -> Result<Vec<Relation>> {
        Ok(Vec::new())
    }

    fn extract_from_database(
        &self,
        schema: &SchemaDescription,
        entities: &[Entity],
    ) -> Result<Vec<Relation>> {
        let lookup = EntityLookup::new(entities);
        let mut relations = Vec::new();
        self.structure_relations(schema, &lookup, &mut relations);
        self.foreign_key_relations(schema, &lookup, &mut relations);
        self.similarity_relations(schema, &lookup, &mut relations);
        tracing::debug!(relations = relations.len(), "schema relation extraction finished");
        Ok(relations)
    }
}
