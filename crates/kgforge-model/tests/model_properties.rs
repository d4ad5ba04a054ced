//! Property tests for graph invariants.
//!
//! Run with: cargo test -p kgforge-model --test model_properties

use kgforge_model::{Entity, EntityType, KnowledgeGraph, Relation, RelationType};
use proptest::prelude::*;

// ============================================================================
// Strategies
// ============================================================================

fn arb_entity_type() -> impl Strategy<Value = EntityType> {
    prop::sample::select(EntityType::ALL.to_vec())
}

fn arb_relation_type() -> impl Strategy<Value = RelationType> {
    prop::sample::select(RelationType::ALL.to_vec())
}

fn arb_entity() -> impl Strategy<Value = Entity> {
    ("[a-z]{1,8}( [a-z]{1,8})?", arb_entity_type(), 0.0f64..=1.0).prop_map(|(name, t, c)| {
        Entity::new(name, t)
            .with_confidence(c)
            .with_source("proptest")
    })
}

/// A graph plus the edge list used to build it (indices into the entity list).
fn arb_graph() -> impl Strategy<Value = KnowledgeGraph> {
    prop::collection::vec(arb_entity(), 1..12).prop_flat_map(|entities| {
        let n = entities.len();
        let edges = prop::collection::vec((0..n, 0..n, arb_relation_type(), 0.0f64..=1.0), 0..20);
        (Just(entities), edges).prop_map(|(entities, edges)| {
            let mut graph = KnowledgeGraph::new("arb");
            for entity in &entities {
                graph.add_entity(entity.clone());
            }
            for (h, t, rt, c) in edges {
                graph.add_relation(
                    Relation::between(&entities[h], &entities[t], rt).with_confidence(c),
                );
            }
            graph
        })
    })
}

fn counts(graph: &KnowledgeGraph) -> (usize, usize, Vec<(EntityType, usize)>, Vec<(RelationType, usize)>) {
    let stats = graph.get_statistics();
    (
        stats.total_entities,
        stats.total_relations,
        stats.entity_types.into_iter().collect(),
        stats.relation_types.into_iter().collect(),
    )
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_add_then_remove_restores_statistics(graph in arb_graph(), entity in arb_entity()) {
        let mut graph = graph;
        let before = counts(&graph);
        prop_assert!(graph.add_entity(entity.clone()));
        prop_assert!(graph.remove_entity(&entity.id));
        prop_assert_eq!(counts(&graph), before);
    }

    #[test]
    fn prop_add_then_remove_with_relations_restores_statistics(
        graph in arb_graph(),
        entity in arb_entity(),
        rt in arb_relation_type(),
    ) {
        let mut graph = graph;
        let before = counts(&graph);
        let anchor = graph.entities().next().cloned();
        prop_assert!(graph.add_entity(entity.clone()));
        if let Some(anchor) = anchor {
            prop_assert!(graph.add_relation(Relation::between(&entity, &anchor, rt)));
            prop_assert!(graph.add_relation(Relation::between(&anchor, &entity, rt)));
        }
        prop_assert!(graph.remove_entity(&entity.id));
        prop_assert_eq!(counts(&graph), before);
    }

    #[test]
    fn prop_relation_with_missing_endpoint_is_rejected(
        graph in arb_graph(),
        outsider in arb_entity(),
        rt in arb_relation_type(),
        outgoing in any::<bool>(),
    ) {
        let mut graph = graph;
        let before = serde_json::to_value(graph.to_record()).unwrap();
        let inside = graph.entities().next().cloned().unwrap();
        let relation = if outgoing {
            Relation::between(&inside, &outsider, rt)
        } else {
            Relation::between(&outsider, &inside, rt)
        };
        prop_assert!(!graph.add_relation(relation));
        prop_assert_eq!(serde_json::to_value(graph.to_record()).unwrap(), before);
    }

    #[test]
    fn prop_indexes_match_primary_maps(graph in arb_graph()) {
        for t in EntityType::ALL {
            let indexed = graph.get_entities_by_type(t).len();
            let scanned = graph.entities().filter(|e| e.entity_type == t).count();
            prop_assert_eq!(indexed, scanned);
        }
        for t in RelationType::ALL {
            let indexed = graph.get_relations_by_type(t).len();
            let scanned = graph.relations().filter(|r| r.relation_type == t).count();
            prop_assert_eq!(indexed, scanned);
        }
        for r in graph.relations() {
            prop_assert!(graph.contains_entity(&r.head_id));
            prop_assert!(graph.contains_entity(&r.tail_id));
        }
    }

    #[test]
    fn prop_json_round_trip(graph in arb_graph()) {
        let text = serde_json::to_string(&graph).unwrap();
        let restored: KnowledgeGraph = serde_json::from_str(&text).unwrap();
        prop_assert_eq!(
            serde_json::to_value(restored.to_record()).unwrap(),
            serde_json::to_value(graph.to_record()).unwrap()
        );
        prop_assert_eq!(restored.updated_at(), graph.updated_at());
    }
}
