use super::*;
use kgforge_model::{EntityType, RelationType};
use serde_json::json;

fn text_entities() -> TextEntityExtractor {
    TextEntityExtractor::new(TextExtractorConfig::default()).unwrap()
}

fn text_relations() -> TextRelationExtractor {
    TextRelationExtractor::new(TextExtractorConfig::default()).unwrap()
}

fn shop_schema() -> SchemaDescription {
    SchemaDescription::from_value(json!({
        "database_name": "shop",
        "tables": [{
            "name": "orders",
            "columns": [{"name": "id"}, {"name": "user_id"}, {"name": "amount"}]
        }]
    }))
    .unwrap()
}

fn count_type(entities: &[kgforge_model::Entity], t: EntityType) -> usize {
    entities.iter().filter(|e| e.entity_type == t).count()
}

// ============================================================================
// Text entities
// ============================================================================

#[test]
fn test_text_entities_carry_evidence() {
    let text = "Dr. Smith works for Acme Corp in London.";
    let entities = text_entities().extract_from_text(text, None).unwrap();

    let london = entities
        .iter()
        .find(|e| e.name == "London")
        .expect("location from preposition pattern");
    assert_eq!(london.entity_type, EntityType::Location);
    assert_eq!(london.source, "text_extraction");
    assert_eq!(london.properties["pattern"], json!("location_preposition"));
    assert_eq!(london.properties["position"], json!([33, 39]));
    assert!(london.properties["context"].as_str().unwrap().contains("in London"));

    let smith = entities.iter().find(|e| e.name == "Dr. Smith").unwrap();
    assert_eq!(smith.entity_type, EntityType::Person);
    assert!(smith.confidence >= 0.5);
}

#[test]
fn test_keywords_become_concepts() {
    let text = "graph databases store graph data; graph queries traverse data";
    let extractor = text_entities();
    assert_eq!(
        extractor.keywords(text),
        vec![("graph".to_string(), 3), ("data".to_string(), 2)]
    );

    let entities = extractor.extract_from_text(text, None).unwrap();
    assert_eq!(entities.len(), 2);
    assert!(entities.iter().all(|e| e.entity_type == EntityType::Concept));
    assert!(entities.iter().all(|e| e.source == "keyword_extraction"));
    assert_eq!(entities[0].properties["frequency"], json!(3));
    assert_eq!(entities[0].properties["pattern"], json!("keyword_frequency"));
}

#[test]
fn test_keywords_skip_stopwords_and_cap() {
    let mut config = TextExtractorConfig::default();
    config.max_keywords = 1;
    let extractor = TextEntityExtractor::new(config).unwrap();
    let keywords = extractor.keywords("the the and and zeta zeta alpha alpha");
    assert_eq!(keywords, vec![("zeta".to_string(), 2)]);
}

#[test]
fn test_name_confidence_heuristic() {
    let extractor = text_entities();
    assert!((extractor.name_confidence("London") - 0.8).abs() < 1e-9);
    assert!((extractor.name_confidence("ab") - 0.6).abs() < 1e-9);
    assert!((extractor.name_confidence("The") - 0.4).abs() < 1e-9);
}

#[test]
fn test_duplicate_mentions_are_merged() {
    let text = "We met in Paris. Later we flew from Paris.";
    let entities = text_entities().extract_from_text(text, None).unwrap();
    let paris: Vec<_> = entities.iter().filter(|e| e.name == "Paris").collect();
    assert_eq!(paris.len(), 1);
}

#[test]
fn test_single_word_proper_nouns_need_a_custom_pattern() {
    let text = "Paris is the capital of France.";
    let is_place = |entities: &[kgforge_model::Entity], name: &str| {
        entities
            .iter()
            .any(|e| e.name == name && e.entity_type == EntityType::Location)
    };

    let defaults = text_entities().extract_from_text(text, None).unwrap();
    assert!(!is_place(&defaults[..], "Paris"));
    assert!(!is_place(&defaults[..], "France"));

    let mut config = TextExtractorConfig::default();
    config.entity_patterns.push(EntityPattern::new(
        "proper_noun",
        EntityType::Location,
        r"\b[A-Z][a-z]+\b",
    ));
    let custom = TextEntityExtractor::new(config)
        .unwrap()
        .extract_from_text(text, None)
        .unwrap();
    assert!(is_place(&custom[..], "Paris"));
    assert!(is_place(&custom[..], "France"));
}

#[test]
fn test_document_id_recorded_from_context() {
    let context = ExtractionContext::for_document("doc-7");
    let entities = text_entities()
        .extract_from_text("graph graph", Some(&context))
        .unwrap();
    assert_eq!(entities.len(), 1);
    assert_eq!(entities[0].properties["document_id"], json!("doc-7"));
}

#[test]
fn test_context_is_char_boundary_safe() {
    let text = "Ça été très très très très très très très très très bien in Paris, près de là où ça s'éveille";
    let entities = text_entities().extract_from_text(text, None).unwrap();
    let paris = entities.iter().find(|e| e.name == "Paris").unwrap();
    let context = paris.properties["context"].as_str().unwrap();
    assert!(context.contains("in Paris, près"));
    assert!(context.chars().count() <= 50 + "Paris".len() + 50);
}

#[test]
fn test_empty_and_oversized_documents_rejected() {
    assert!(matches!(
        text_entities().extract_from_text("   ", None),
        Err(ExtractError::EmptyDocument)
    ));

    let mut config = TextExtractorConfig::default();
    config.max_document_bytes = 10;
    let extractor = TextEntityExtractor::new(config).unwrap();
    assert!(matches!(
        extractor.extract_from_text("this is far too long", None),
        Err(ExtractError::DocumentTooLarge { len: 20, limit: 10 })
    ));
}

#[test]
fn test_invalid_pattern_is_reported() {
    let mut config = TextExtractorConfig::default();
    config
        .entity_patterns
        .push(EntityPattern::new("broken", EntityType::Concept, "(unclosed"));
    match TextEntityExtractor::new(config) {
        Err(ExtractError::InvalidPattern { pattern, .. }) => assert_eq!(pattern, "(unclosed"),
        other => panic!("expected invalid pattern, got {:?}", other.err()),
    }
}

// ============================================================================
// Text relations
// ============================================================================

#[test]
fn test_cooccurrence_in_one_sentence() {
    let paris = kgforge_model::Entity::new("Paris", EntityType::Location);
    let france = kgforge_model::Entity::new("France", EntityType::Location);
    let entities = vec![paris.clone(), france.clone()];

    let relations = text_relations()
        .extract_from_text("Paris is in France.", &entities)
        .unwrap();
    assert_eq!(relations.len(), 1);
    let rel = &relations[0];
    assert_eq!(rel.relation_type, RelationType::RelatedTo);
    assert_eq!(rel.head_id, paris.id);
    assert_eq!(rel.tail_id, france.id);
    assert_eq!(rel.source, "cooccurrence");
    assert_eq!(rel.confidence, 0.5);
    assert_eq!(rel.properties["sentence"], json!("paris is in france"));
}

#[test]
fn test_repeated_pair_kept_once() {
    let entities = vec![
        kgforge_model::Entity::new("Paris", EntityType::Location),
        kgforge_model::Entity::new("France", EntityType::Location),
    ];
    let relations = text_relations()
        .extract_from_text("Paris is in France. Paris is in France!", &entities)
        .unwrap();
    assert_eq!(relations.len(), 1);
}

#[test]
fn test_phrase_template_relation() {
    let alice = kgforge_model::Entity::new("Alice", EntityType::Person);
    let acme = kgforge_model::Entity::new("Acme", EntityType::Organization);
    let relations = text_relations()
        .extract_from_text("Alice works for Acme.", &[alice.clone(), acme.clone()])
        .unwrap();

    let belongs = relations
        .iter()
        .find(|r| r.relation_type == RelationType::BelongsTo)
        .unwrap();
    assert_eq!((belongs.head_id.as_str(), belongs.tail_id.as_str()), (alice.id.as_str(), acme.id.as_str()));
    assert_eq!(belongs.confidence, 0.7);
    assert_eq!(belongs.source, "text_pattern_matching");
    assert!(relations.iter().any(|r| r.relation_type == RelationType::RelatedTo));
}

#[test]
fn test_described_by_is_reversed() {
    let orders = kgforge_model::Entity::new("Orders", EntityType::Concept);
    let manual = kgforge_model::Entity::new("Manual", EntityType::Document);
    let relations = text_relations()
        .extract_from_text("Orders is described by Manual", &[orders.clone(), manual.clone()])
        .unwrap();
    let describes = relations
        .iter()
        .find(|r| r.relation_type == RelationType::Describes)
        .unwrap();
    assert_eq!(describes.head_id, manual.id);
    assert_eq!(describes.tail_id, orders.id);
}

#[test]
fn test_template_resolves_by_containment() {
    let alice = kgforge_model::Entity::new("Alice", EntityType::Person);
    let acme = kgforge_model::Entity::new("Acme Corporation", EntityType::Organization);
    let relations = text_relations()
        .extract_from_text("Alice works for Acme", &[alice, acme.clone()])
        .unwrap();
    assert!(relations
        .iter()
        .any(|r| r.relation_type == RelationType::BelongsTo && r.tail_id == acme.id));
}

#[test]
fn test_non_whitelisted_triples_rejected() {
    let orders = kgforge_model::Entity::new("orders", EntityType::Table);
    let users = kgforge_model::Entity::new("users", EntityType::Table);
    let relations = text_relations()
        .extract_from_text("orders is related to users", &[orders, users])
        .unwrap();
    assert!(relations.is_empty());
}

#[test]
fn test_whitelist_edits() {
    let mut whitelist = RelationWhitelist::default();
    assert!(whitelist.allows(EntityType::Column, EntityType::Column, RelationType::ForeignKey));
    assert!(whitelist.allows(EntityType::Keyword, EntityType::Person, RelationType::RelatedTo));
    whitelist.deny(EntityType::Column, EntityType::Column, RelationType::ForeignKey);
    assert!(!whitelist.allows(EntityType::Column, EntityType::Column, RelationType::ForeignKey));
    assert!(RelationWhitelist::empty().is_empty());
}

// ============================================================================
// Schema
// ============================================================================

#[test]
fn test_shop_schema_entities_and_relations() {
    let schema = shop_schema();
    let entities = DatabaseEntityExtractor::default()
        .extract_from_database(&schema)
        .unwrap();

    assert_eq!(count_type(&entities, EntityType::Database), 1);
    assert_eq!(count_type(&entities, EntityType::Table), 1);
    let mut columns: Vec<_> = entities
        .iter()
        .filter(|e| e.entity_type == EntityType::Column)
        .map(|e| e.name.as_str())
        .collect();
    columns.sort_unstable();
    assert_eq!(columns, vec!["orders.amount", "orders.user_id"]);

    let concept = entities
        .iter()
        .find(|e| e.entity_type == EntityType::Concept)
        .unwrap();
    assert_eq!(concept.name, "Order Management");
    assert_eq!(concept.confidence, 0.7);

    let relations = DatabaseRelationExtractor::default()
        .extract_from_database(&schema, &entities)
        .unwrap();
    assert_eq!(relations.len(), 3);
    assert!(relations.iter().all(|r| r.relation_type == RelationType::Contains));
    assert!(relations.iter().all(|r| r.confidence == 1.0));

    let db = entities.iter().find(|e| e.entity_type == EntityType::Database).unwrap();
    assert_eq!(db.name, "shop");
    assert_eq!(db.description, "Database: shop");
    assert_eq!(relations.iter().filter(|r| r.head_id == db.id).count(), 1);
}

#[test]
fn test_table_and_column_properties() {
    let schema = SchemaDescription::from_value(json!({
        "database_name": "crm",
        "tables": [{
            "name": "tbl_users",
            "row_count": 12,
            "columns": [
                {"name": "ID", "type": "int", "primary_key": true, "nullable": false},
                {"name": "email", "type": "varchar", "max_length": 255, "unique": true, "foreign_key": false}
            ]
        }]
    }))
    .unwrap();
    let entities = DatabaseEntityExtractor::default()
        .extract_from_database(&schema)
        .unwrap();

    let table = entities.iter().find(|e| e.entity_type == EntityType::Table).unwrap();
    assert_eq!(table.aliases, vec!["users".to_string()]);
    assert_eq!(table.description, "Table: tbl_users");
    assert_eq!(table.properties["row_count"], json!(12));
    assert_eq!(table.properties["column_count"], json!(2));

    let columns: Vec<_> = entities
        .iter()
        .filter(|e| e.entity_type == EntityType::Column)
        .collect();
    assert_eq!(columns.len(), 1, "ID is a common column regardless of case");
    let email = columns[0];
    assert_eq!(email.name, "tbl_users.email");
    assert!(email.has_alias("email"));
    assert_eq!(email.properties["data_type"], json!("varchar"));
    assert_eq!(email.properties["max_length"], json!(255));
    assert_eq!(email.properties["unique"], json!(true));
    assert_eq!(email.properties["foreign_key"], json!(null));

    assert!(entities.iter().any(|e| e.name == "User Management"));
}

#[test]
fn test_foreign_key_and_similar_tables() {
    let schema = SchemaDescription::from_value(json!({
        "database_name": "shop",
        "tables": [
            {"name": "users", "columns": [{"name": "email"}]},
            {"name": "order_items", "columns": [
                {"name": "buyer_email", "foreign_key": {"table": "users", "column": "email"}}
            ]},
            {"name": "order_items_archive", "columns": []}
        ]
    }))
    .unwrap();
    let entities = DatabaseEntityExtractor::default()
        .extract_from_database(&schema)
        .unwrap();
    let relations = DatabaseRelationExtractor::default()
        .extract_from_database(&schema, &entities)
        .unwrap();

    let fk = relations
        .iter()
        .find(|r| r.relation_type == RelationType::ForeignKey)
        .unwrap();
    assert_eq!(fk.properties["on_delete"], json!("RESTRICT"));
    let head = entities.iter().find(|e| e.id == fk.head_id).unwrap();
    let tail = entities.iter().find(|e| e.id == fk.tail_id).unwrap();
    assert_eq!(head.name, "order_items.buyer_email");
    assert_eq!(tail.name, "users.email");

    let similar: Vec<_> = relations
        .iter()
        .filter(|r| r.relation_type == RelationType::SimilarTo)
        .collect();
    assert_eq!(similar.len(), 1);
    assert!((similar[0].confidence - 2.0 / 3.0).abs() < 1e-9);
    assert_eq!(similar[0].source, "name_similarity");
}

#[test]
fn test_table_name_similarity() {
    use crate::database::table_name_similarity;
    assert_eq!(table_name_similarity("user_profile", "USER_PROFILE"), 1.0);
    assert_eq!(table_name_similarity("orders", "users"), 0.0);
    assert_eq!(table_name_similarity("", ""), 0.0);
}

#[test]
fn test_schema_from_sql_ddl() {
    let sql = "
        CREATE TABLE users (
            id INTEGER PRIMARY KEY,
            email VARCHAR(255) NOT NULL UNIQUE
        );
        CREATE TABLE orders (
            id INTEGER PRIMARY KEY,
            user_id INTEGER,
            total DECIMAL(10, 2),
            FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
        );
        CREATE INDEX idx_orders_total ON orders (total);
    ";
    let schema = SchemaDescription::from_sql_ddl(Some("shop"), sql).unwrap();
    assert_eq!(schema.database_name.as_deref(), Some("shop"));
    assert_eq!(schema.tables.len(), 2);

    let users = schema.table("users").unwrap();
    let email = users.columns.iter().find(|c| c.name == "email").unwrap();
    assert!(!email.nullable);
    assert!(email.unique);
    assert_eq!(email.max_length, Some(255));
    assert!(users.columns[0].primary_key);

    let orders = schema.table("orders").unwrap();
    let user_id = orders.columns.iter().find(|c| c.name == "user_id").unwrap();
    let fk = user_id.foreign_key.as_ref().unwrap();
    assert_eq!((fk.table.as_str(), fk.column.as_str()), ("users", "id"));
    assert_eq!(fk.on_delete.as_deref(), Some("CASCADE"));
    assert!(orders.columns.iter().find(|c| c.name == "total").unwrap().indexed);
}

#[test]
fn test_ddl_without_tables_is_an_error() {
    assert!(matches!(
        SchemaDescription::from_sql_ddl(None, "SELECT 1;"),
        Err(ExtractError::Schema(_))
    ));
    assert!(matches!(
        SchemaDescription::from_sql_ddl(None, "CREATE TABLE ("),
        Err(ExtractError::Sql(_))
    ));
}

// ============================================================================
// Dedup
// ============================================================================

#[test]
fn test_dedup_merges_by_normalized_name() {
    let a = kgforge_model::Entity::new("Orders", EntityType::Table).with_confidence(0.6);
    let b = kgforge_model::Entity::new(" orders ", EntityType::Table).with_confidence(0.9);
    let c = kgforge_model::Entity::new("users", EntityType::Table);
    let (a_id, b_id) = (a.id.clone(), b.id.clone());

    let result = deduplicate_entities(vec![a, b, c]);
    assert_eq!(result.entities.len(), 2);
    assert_eq!(result.merged_count(), 1);
    assert_eq!(result.id_map[&b_id], a_id);
    assert_eq!(result.entities[0].confidence, 0.9);
}

#[test]
fn test_remap_drops_collapsed_and_unknown() {
    let a = kgforge_model::Entity::new("a", EntityType::Concept);
    let a2 = kgforge_model::Entity::new("A", EntityType::Concept);
    let b = kgforge_model::Entity::new("b", EntityType::Concept);
    let stranger = kgforge_model::Entity::new("z", EntityType::Concept);
    let relations = vec![
        kgforge_model::Relation::between(&a2, &b, RelationType::RelatedTo),
        kgforge_model::Relation::between(&a, &a2, RelationType::SimilarTo),
        kgforge_model::Relation::between(&b, &stranger, RelationType::RelatedTo),
    ];
    let dedup = deduplicate_entities(vec![a.clone(), a2, b.clone()]);
    let (kept, dropped) = remap_relations(relations, &dedup.id_map);
    assert_eq!(kept.len(), 1);
    assert_eq!(kept[0].head_id, a.id);
    assert_eq!(kept[0].tail_id, b.id);
    assert_eq!(dropped.len(), 2);
}
