//! Property tests for embedding similarity.
//!
//! Run with: cargo test -p kgforge-embed --test similarity_properties

use kgforge_embed::{remapped_cosine, GraphEmbedding, TransE, TransEConfig};
use kgforge_model::{Entity, EntityType, KnowledgeGraph, Relation, RelationType};
use ndarray::Array1;
use proptest::prelude::*;

fn arb_vector() -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(-10.0f64..10.0, 4)
}

fn arb_graph() -> impl Strategy<Value = KnowledgeGraph> {
    (2usize..8).prop_flat_map(|n| {
        let edge = (0..n, 0..n, prop::sample::select(RelationType::ALL.to_vec()));
        prop::collection::vec(edge, 1..12).prop_map(move |edges| {
            let entities: Vec<Entity> = (0..n)
                .map(|i| Entity::new(format!("e{i}"), EntityType::Concept))
                .collect();
            let mut graph = KnowledgeGraph::new("arb");
            for entity in &entities {
                graph.add_entity(entity.clone());
            }
            for (h, t, rt) in edges {
                graph.add_relation(Relation::between(&entities[h], &entities[t], rt));
            }
            graph
        })
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn similarity_is_bounded_and_symmetric(a in arb_vector(), b in arb_vector()) {
        let (a, b) = (Array1::from(a), Array1::from(b));
        let ab = remapped_cosine(a.view(), b.view());
        let ba = remapped_cosine(b.view(), a.view());
        prop_assert!((0.0..=1.0).contains(&ab));
        prop_assert!((ab - ba).abs() < 1e-12);
    }

    #[test]
    fn trained_entities_are_self_similar(graph in arb_graph(), seed in any::<u64>()) {
        prop_assume!(graph.relation_count() > 0);
        let mut model = TransE::new(TransEConfig { dimension: 6, epochs: 3, seed, ..TransEConfig::default() }).unwrap();
        model.train(&graph).unwrap();
        for id in model.store().entity_ids() {
            prop_assert_eq!(model.compute_entity_similarity(id, id), 1.0);
            prop_assert!(model.recommend_entities(id, 3).iter().all(|(other, _)| other != id));
        }
    }
}
