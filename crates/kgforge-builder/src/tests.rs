use super::*;
use approx::assert_relative_eq;
use kgforge_extract::SchemaDescription;
use kgforge_model::{Entity, EntityType, KnowledgeGraph, Relation, RelationType};
use serde_json::json;
use std::cell::Cell;

fn builder() -> KnowledgeGraphBuilder {
    KnowledgeGraphBuilder::new(BuilderConfig::default()).unwrap()
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

fn catalog_schema() -> SchemaDescription {
    SchemaDescription::from_value(json!({
        "database_name": "catalog",
        "tables": [
            {"name": "products", "columns": [{"name": "sku"}, {"name": "title"}]},
            {"name": "orders", "columns": [{"name": "total"}]}
        ]
    }))
    .unwrap()
}

fn triangle() -> (KnowledgeGraph, [Entity; 3]) {
    let mut graph = KnowledgeGraph::new("triangle");
    let a = Entity::new("A", EntityType::Concept);
    let b = Entity::new("B", EntityType::Concept);
    let c = Entity::new("C", EntityType::Concept);
    for e in [&a, &b, &c] {
        graph.add_entity(e.clone());
    }
    graph.add_relation(Relation::between(&a, &b, RelationType::Contains));
    graph.add_relation(Relation::between(&b, &c, RelationType::Contains));
    graph.add_relation(Relation::between(&c, &a, RelationType::Contains));
    (graph, [a, b, c])
}

fn type_counts(graph: &KnowledgeGraph) -> (Vec<(EntityType, usize)>, Vec<(RelationType, usize)>) {
    let stats = graph.get_statistics();
    (
        stats.entity_types.into_iter().collect(),
        stats.relation_types.into_iter().collect(),
    )
}

// ============================================================================
// Validation
// ============================================================================

#[test]
fn test_three_cycle_is_reported_but_valid() {
    let (graph, [a, b, c]) = triangle();
    let report = validate_graph(&graph);

    assert!(report.valid);
    assert_eq!(report.cycles().len(), 1);
    let cycle = &report.cycles()[0];
    assert_eq!(cycle.len(), 3);
    for id in [&a.id, &b.id, &c.id] {
        assert!(cycle.contains(id));
    }
    assert!(report
        .issues
        .iter()
        .all(|i| i.severity() == Severity::Medium));
}

#[test]
fn test_missing_endpoints_invalidate_record() {
    let (graph, [a, _, _]) = triangle();
    let mut record = graph.to_record();
    let ghost = Entity::new("ghost", EntityType::Concept);
    let dangling = Relation::between(&a, &ghost, RelationType::RelatedTo);
    record.relations.insert(dangling.id.clone(), dangling.clone());

    let report = validate_graph(&record);
    assert!(!report.valid);
    assert!(report.issues.contains(&ValidationIssue::MissingTail {
        relation_id: dangling.id.clone(),
        entity_id: ghost.id.clone(),
    }));
    assert_eq!(report.issues_with(Severity::High).count(), 1);
    assert!(report.recommendations.iter().any(|r| r.contains("missing")));
}

#[test]
fn test_isolated_and_disconnected_are_advisories() {
    let (mut graph, _) = triangle();
    let loner = Entity::new("loner", EntityType::Keyword);
    graph.add_entity(loner.clone());

    let report = validate_graph(&graph);
    assert!(report.valid);
    assert!(report.issues.contains(&ValidationIssue::IsolatedNodes {
        entity_ids: vec![loner.id.clone()],
    }));
    assert!(report.issues.contains(&ValidationIssue::DisconnectedComponents {
        count: 2,
        sizes: vec![3, 1],
    }));
    assert_eq!(report.statistics.component_count, 2);
    assert_relative_eq!(report.statistics.density, 0.75, epsilon = 1e-12);
}

#[test]
fn test_density_recommendations() {
    let mut graph = KnowledgeGraph::new("sparse");
    let a = Entity::new("a", EntityType::Concept);
    let b = Entity::new("b", EntityType::Concept);
    let c = Entity::new("c", EntityType::Concept);
    for e in [&a, &b, &c] {
        graph.add_entity(e.clone());
    }
    let empty = validate_graph(&graph);
    assert!(empty.recommendations.iter().any(|r| r.contains("no relations")));

    graph.add_relation(Relation::between(&a, &b, RelationType::RelatedTo));
    let sparse = validate_graph(&graph);
    assert!(sparse.recommendations.iter().any(|r| r.contains("too sparse")));

    let mut dense = KnowledgeGraph::new("dense");
    dense.add_entity(a.clone());
    dense.add_entity(b.clone());
    for _ in 0..11 {
        dense.add_relation(Relation::between(&a, &b, RelationType::RelatedTo));
    }
    let report = validate_graph(&dense);
    assert!(report.recommendations.iter().any(|r| r.contains("redundant")));
}

#[test]
fn test_disjoint_cycles_are_all_found() {
    let mut graph = KnowledgeGraph::new("cycles");
    let nodes: Vec<Entity> = ["a", "b", "c", "d", "e"]
        .iter()
        .map(|n| Entity::new(*n, EntityType::Concept))
        .collect();
    for e in &nodes {
        graph.add_entity(e.clone());
    }
    for (h, t) in [(0, 1), (1, 0), (2, 3), (3, 4), (4, 2)] {
        graph.add_relation(Relation::between(&nodes[h], &nodes[t], RelationType::DependsOn));
    }

    let cycles = find_cycles(&graph);
    let mut lengths: Vec<usize> = cycles.iter().map(Vec::len).collect();
    lengths.sort_unstable();
    assert_eq!(lengths, vec![2, 3]);
    for cycle in &cycles {
        assert_eq!(cycle.iter().min(), cycle.first());
    }
}

#[test]
fn test_long_chain_validates_without_recursion() {
    let mut graph = KnowledgeGraph::new("chain");
    let nodes: Vec<Entity> = (0..50_000)
        .map(|i| Entity::new(format!("node {i}"), EntityType::Concept))
        .collect();
    for e in &nodes {
        graph.add_entity(e.clone());
    }
    for pair in nodes.windows(2) {
        graph.add_relation(Relation::between(&pair[0], &pair[1], RelationType::DependsOn));
    }

    assert!(find_cycles(&graph).is_empty());
    let report = validate_graph(&graph);
    assert!(report.valid);
    assert!(report.cycles().is_empty());
    assert_eq!(report.statistics.component_count, 1);

    // Closing the chain turns it into one cycle through every node.
    graph.add_relation(Relation::between(&nodes[49_999], &nodes[0], RelationType::DependsOn));
    let cycles = find_cycles(&graph);
    assert_eq!(cycles.len(), 1);
    assert_eq!(cycles[0].len(), 50_000);
}

// ============================================================================
// Inference
// ============================================================================

#[test]
fn test_transitive_and_symmetric_inference() {
    let mut graph = KnowledgeGraph::new("infer");
    let a = Entity::new("alpha", EntityType::Concept);
    let b = Entity::new("beta", EntityType::Concept);
    let c = Entity::new("gamma", EntityType::Concept);
    for e in [&a, &b, &c] {
        graph.add_entity(e.clone());
    }
    let ab = Relation::between(&a, &b, RelationType::Contains).with_confidence(0.9);
    let bc = Relation::between(&b, &c, RelationType::Contains).with_confidence(0.5);
    let sim = Relation::between(&a, &c, RelationType::SimilarTo).with_confidence(0.8);
    for r in [&ab, &bc, &sim] {
        graph.add_relation(r.clone());
    }

    let inferred = infer_relations(&graph, &BuilderConfig::default());
    assert_eq!(inferred.len(), 2);

    let transitive = inferred
        .iter()
        .find(|r| r.source == "transitive_inference")
        .unwrap();
    assert_eq!((transitive.head_id.as_str(), transitive.tail_id.as_str()), (a.id.as_str(), c.id.as_str()));
    assert_relative_eq!(transitive.confidence, 0.4, epsilon = 1e-12);
    assert_eq!(transitive.properties["inferred_from"], json!([ab.id, bc.id]));

    let reverse = inferred
        .iter()
        .find(|r| r.source == "symmetric_inference")
        .unwrap();
    assert_eq!(reverse.head_id, c.id);
    assert_eq!(reverse.relation_type, RelationType::SimilarTo);
    assert_relative_eq!(reverse.confidence, 0.72, epsilon = 1e-12);
}

#[test]
fn test_inference_skips_existing_and_unlisted() {
    let mut graph = KnowledgeGraph::new("infer");
    let a = Entity::new("a", EntityType::Column);
    let b = Entity::new("b", EntityType::Column);
    graph.add_entity(a.clone());
    graph.add_entity(b.clone());
    graph.add_relation(Relation::between(&a, &b, RelationType::SimilarTo));
    // column similar_to column is not whitelisted
    assert!(infer_relations(&graph, &BuilderConfig::default()).is_empty());

    let (triangle, _) = triangle();
    // every two-step path would close a reverse edge over the cycle
    assert!(infer_relations(&triangle, &BuilderConfig::default()).is_empty());
}

#[test]
fn test_update_graph_keeps_contains_cycle_at_three() {
    let builder = builder();
    let mut graph = KnowledgeGraph::new("cycle");
    let [a, b, c] = ["A", "B", "C"].map(|n| Entity::new(n, EntityType::Organization));
    let relations = vec![
        Relation::between(&a, &b, RelationType::Contains),
        Relation::between(&b, &c, RelationType::Contains),
        Relation::between(&c, &a, RelationType::Contains),
    ];

    let summary = builder.update_graph(&mut graph, vec![a, b, c], relations);
    assert_eq!(summary.relations_added, 3);
    assert_eq!(summary.relations_inferred, 0);
    assert_eq!(graph.relation_count(), 3);

    let report = builder.validate_graph(&graph);
    assert!(report.valid);
    assert_eq!(report.cycles().len(), 1);
    assert_eq!(report.cycles()[0].len(), 3);
}

#[test]
fn test_contains_inference_never_closes_a_cycle() {
    let mut graph = KnowledgeGraph::new("diamond");
    let nodes: Vec<Entity> = ["root", "left", "right", "leaf"]
        .iter()
        .map(|n| Entity::new(*n, EntityType::Location))
        .collect();
    for e in &nodes {
        graph.add_entity(e.clone());
    }
    // root -> left -> leaf, root -> right -> leaf, leaf -> root
    for (h, t) in [(0, 1), (1, 3), (0, 2), (2, 3), (3, 0)] {
        graph.add_relation(Relation::between(&nodes[h], &nodes[t], RelationType::Contains));
    }
    assert!(infer_relations(&graph, &BuilderConfig::default()).is_empty());

    // Without the back edge both chains fold into one root -> leaf inference.
    let mut acyclic = KnowledgeGraph::new("diamond");
    for e in &nodes {
        acyclic.add_entity(e.clone());
    }
    for (h, t) in [(0, 1), (1, 3), (0, 2), (2, 3)] {
        acyclic.add_relation(Relation::between(&nodes[h], &nodes[t], RelationType::Contains));
    }
    let inferred = infer_relations(&acyclic, &BuilderConfig::default());
    assert_eq!(inferred.len(), 1);
    assert_eq!((inferred[0].head_id.as_str(), inferred[0].tail_id.as_str()), (nodes[0].id.as_str(), nodes[3].id.as_str()));
}

#[test]
fn test_hierarchical_inference() {
    let mut graph = KnowledgeGraph::new("hierarchy");
    let acme = Entity::new("Acme", EntityType::Organization);
    let employee = Entity::new("Acme Smith", EntityType::Person);
    let table = Entity::new("ledger", EntityType::Table);
    let column = Entity::new("balance", EntityType::Column).with_property("table", "ledger");
    for e in [&acme, &employee, &table, &column] {
        graph.add_entity(e.clone());
    }

    let inferred = inference::hierarchical_relations(&graph, &BuilderConfig::default());
    assert_eq!(inferred.len(), 2);
    assert!(inferred.iter().all(|r| r.relation_type == RelationType::Contains));
    assert!(inferred.iter().all(|r| r.confidence == 0.6));
    assert!(inferred
        .iter()
        .any(|r| r.head_id == acme.id && r.tail_id == employee.id));
    assert!(inferred
        .iter()
        .any(|r| r.head_id == table.id && r.tail_id == column.id));
}

// ============================================================================
// Build
// ============================================================================

#[test]
fn test_build_shop_schema() {
    let graph = builder()
        .build_graph("shop", &[GraphSource::Schema(shop_schema())])
        .unwrap();

    assert_eq!(graph.get_entities_by_type(EntityType::Database).len(), 1);
    assert_eq!(graph.get_entities_by_type(EntityType::Table).len(), 1);
    assert_eq!(graph.get_entities_by_type(EntityType::Column).len(), 2);

    let contains = graph.get_relations_by_type(RelationType::Contains);
    assert_eq!(contains.len(), 5);
    let transitive: Vec<_> = contains
        .iter()
        .filter(|r| r.source == "transitive_inference")
        .collect();
    assert_eq!(transitive.len(), 2);
    for r in transitive {
        assert_relative_eq!(r.confidence, 0.8, epsilon = 1e-12);
        assert_eq!(graph.get_entity(&r.head_id).unwrap().entity_type, EntityType::Database);
    }
    assert!(builder().validate_graph(&graph).valid);
}

#[test]
fn test_build_without_inference() {
    let config = BuilderConfig {
        infer_relations: false,
        ..BuilderConfig::default()
    };
    let graph = KnowledgeGraphBuilder::new(config)
        .unwrap()
        .build_graph("shop", &[GraphSource::Schema(shop_schema())])
        .unwrap();
    assert_eq!(graph.relation_count(), 3);
}

#[test]
fn test_failed_source_is_skipped() {
    let sources = vec![
        GraphSource::document("empty", "   "),
        GraphSource::Schema(shop_schema()),
        GraphSource::document(
            "bio",
            "Alice Smith works for Acme Corp in London. Alice Smith lives in London.",
        ),
    ];
    let graph = builder().build_graph("mixed", &sources).unwrap();

    let london = graph.find_entities_by_name("London");
    assert_eq!(london.len(), 1);
    assert_eq!(london[0].entity_type, EntityType::Location);
    assert_eq!(london[0].properties["document_id"], json!("bio"));
    assert!(!graph.get_relations_by_type(RelationType::RelatedTo).is_empty());
    assert_eq!(graph.get_entities_by_type(EntityType::Database).len(), 1);
}

#[test]
fn test_parallel_extraction_matches_sequential() {
    let sources = vec![
        GraphSource::Schema(shop_schema()),
        GraphSource::Schema(catalog_schema()),
        GraphSource::text("Dr. Smith met Prof. Jones in Berlin. Dr. Smith stayed in Berlin."),
    ];
    let sequential = builder().build_graph("seq", &sources).unwrap();
    let parallel = KnowledgeGraphBuilder::new(BuilderConfig {
        parallel_extraction: true,
        ..BuilderConfig::default()
    })
    .unwrap()
    .build_graph("par", &sources)
    .unwrap();

    assert_eq!(type_counts(&sequential), type_counts(&parallel));
    let names = |g: &KnowledgeGraph| {
        let mut names: Vec<String> = g.entities().map(|e| e.name.clone()).collect();
        names.sort();
        names
    };
    assert_eq!(names(&sequential), names(&parallel));
}

#[test]
fn test_update_graph_merges_by_name() {
    let builder = builder();
    let mut graph = builder
        .build_graph("shop", &[GraphSource::Schema(shop_schema())])
        .unwrap();
    let before = graph.entity_count();
    let db = graph.get_entities_by_type(EntityType::Database)[0].clone();

    let orders = Entity::new("Orders", EntityType::Table).with_alias("purchases");
    let invoices = Entity::new("invoices", EntityType::Table).with_confidence(1.0);
    let link = Relation::between(&db, &invoices, RelationType::Contains);
    let bogus = Relation::between(&invoices, &orders, RelationType::ForeignKey);

    let summary = builder.update_graph(&mut graph, vec![orders, invoices], vec![link, bogus]);
    assert_eq!(summary.entities_merged, 1);
    assert_eq!(summary.entities_added, 1);
    assert_eq!(summary.relations_added, 1);
    assert_eq!(summary.relations_dropped, 1);
    assert_eq!(graph.entity_count(), before + 1);

    let table = graph.find_entities_by_name("purchases");
    assert_eq!(table.len(), 1);
    assert_eq!(table[0].name, "orders");
}

#[test]
fn test_source_weights_scale_confidence() {
    let sources = vec![WeightedSource {
        source: GraphSource::Schema(shop_schema()),
        weight: Some(0.5),
    }];
    let graph = builder().build_from_sources("weighted", &sources).unwrap();

    let table = &graph.get_entities_by_type(EntityType::Table)[0];
    assert_relative_eq!(table.confidence, 0.5, epsilon = 1e-12);
    // business concepts are inferred, so the inference weight caps them
    let concept = &graph.get_entities_by_type(EntityType::Concept)[0];
    assert_relative_eq!(concept.confidence, 0.28, epsilon = 1e-12);
    let transitive: Vec<_> = graph
        .relations()
        .filter(|r| r.source == "transitive_inference")
        .collect();
    assert_eq!(transitive.len(), 2);
    for r in transitive {
        assert_relative_eq!(r.confidence, 0.32, epsilon = 1e-12);
    }
}

#[test]
fn test_default_source_weights() {
    let config = BuilderConfig::default();
    assert_eq!(config.source_weight("database_schema"), 1.0);
    assert_eq!(config.source_weight("text_extraction"), 0.8);
    assert_eq!(config.source_weight("keyword_extraction"), 0.6);
    assert_eq!(config.source_weight("inference"), 0.4);
    assert_eq!(config.source_weight("anything"), 1.0);
}

// ============================================================================
// Merge
// ============================================================================

#[test]
fn test_merge_is_commutative_in_counts() {
    let builder = builder();
    let a = builder
        .build_graph("a", &[GraphSource::Schema(shop_schema())])
        .unwrap();
    let b = builder
        .build_graph("b", &[GraphSource::Schema(catalog_schema())])
        .unwrap();

    let ab = merge_graphs("ab", &[a.clone(), b.clone()]);
    let ba = merge_graphs("ba", &[b, a]);
    assert_eq!(ab.entity_count(), ba.entity_count());
    assert_eq!(ab.relation_count(), ba.relation_count());
    assert_eq!(type_counts(&ab), type_counts(&ba));
}

#[test]
fn test_merge_assigns_new_ids_and_aligns_names() {
    let graph = builder()
        .build_graph("shop", &[GraphSource::Schema(shop_schema())])
        .unwrap();
    let merged = merge_graphs("twice", &[graph.clone(), graph.clone()]);

    assert_eq!(merged.entity_count(), graph.entity_count());
    assert_eq!(merged.relation_count(), graph.relation_count());
    for entity in graph.entities() {
        assert!(!merged.contains_entity(&entity.id));
    }
    assert!(validate_graph(&merged).valid);
}

// ============================================================================
// Cache
// ============================================================================

#[test]
fn test_cache_builds_once_until_invalidated() {
    let cache = GraphBuilderCache::new();
    let builds = Cell::new(0);
    let build = || -> anyhow::Result<KnowledgeGraph> {
        builds.set(builds.get() + 1);
        Ok(KnowledgeGraph::new("kb"))
    };

    let first = cache.get_or_build("kb-1", build).unwrap();
    let second = cache.get_or_build("kb-1", build).unwrap();
    assert_eq!(builds.get(), 1);
    assert_eq!(first.id(), second.id());

    assert!(cache.invalidate("kb-1"));
    assert!(!cache.invalidate("kb-1"));
    cache.get_or_build("kb-1", build).unwrap();
    assert_eq!(builds.get(), 2);

    cache.insert("kb-2", KnowledgeGraph::new("other"));
    assert_eq!(cache.len(), 2);
    cache.clear();
    assert!(cache.is_empty());
}

#[test]
fn test_cache_propagates_build_errors() {
    let cache = GraphBuilderCache::new();
    let result = cache.get_or_build("kb", || Err(anyhow::anyhow!("source unavailable")));
    assert!(result.is_err());
    assert!(cache.get("kb").is_none());
}
