use super::*;
use approx::assert_relative_eq;
use kgforge_model::{Entity, EntityType, KnowledgeGraph, Relation, RelationType};
use ndarray::{arr1, Array2};
use std::collections::BTreeMap;

/// Two triangles joined by a bridge, plus one isolated entity.
fn two_communities() -> (KnowledgeGraph, Vec<Entity>) {
    let mut graph = KnowledgeGraph::new("communities");
    let entities: Vec<Entity> = ["a1", "a2", "a3", "b1", "b2", "b3", "loner"]
        .into_iter()
        .map(|n| Entity::new(n, EntityType::Concept))
        .collect();
    for e in &entities {
        graph.add_entity(e.clone());
    }
    for (h, t, rt) in [
        (0, 1, RelationType::RelatedTo),
        (1, 2, RelationType::RelatedTo),
        (2, 0, RelationType::Contains),
        (3, 4, RelationType::RelatedTo),
        (4, 5, RelationType::RelatedTo),
        (5, 3, RelationType::Contains),
        (2, 3, RelationType::References),
    ] {
        graph.add_relation(Relation::between(&entities[h], &entities[t], rt));
    }
    (graph, entities)
}

fn small_node2vec(seed: u64) -> Node2Vec {
    Node2Vec::new(Node2VecConfig {
        dimension: 8,
        walk_length: 6,
        num_walks: 3,
        epochs: 5,
        seed,
        ..Node2VecConfig::default()
    })
    .unwrap()
}

fn small_transe(seed: u64) -> TransE {
    TransE::new(TransEConfig {
        dimension: 8,
        epochs: 20,
        seed,
        ..TransEConfig::default()
    })
    .unwrap()
}

fn rows(model: &dyn GraphEmbedding) -> Vec<(String, Vec<f64>)> {
    model
        .store()
        .entity_ids()
        .iter()
        .map(|id| (id.clone(), model.get_entity_embedding(id).unwrap().to_vec()))
        .collect()
}

// ============================================================================
// Node2Vec
// ============================================================================

#[test]
fn test_node2vec_is_deterministic_for_a_seed() {
    let (graph, _) = two_communities();
    let mut first = small_node2vec(7);
    let mut second = small_node2vec(7);
    let a = first.train(&graph).unwrap();
    let b = second.train(&graph).unwrap();
    assert_eq!(a, b);
    assert_eq!(rows(&first), rows(&second));

    let mut other = small_node2vec(8);
    other.train(&graph).unwrap();
    assert_ne!(rows(&first), rows(&other));
}

#[test]
fn test_node2vec_embeds_only_walked_entities() {
    let (graph, entities) = two_communities();
    let mut model = small_node2vec(1);
    let summary = model.train(&graph).unwrap();
    assert_eq!(summary.entity_count, 6);
    assert_eq!(summary.epochs, 5);
    assert!(summary.final_loss > 0.0);
    assert!(model.get_entity_embedding(&entities[6].id).is_none());
    assert_eq!(model.get_entity_embedding(&entities[0].id).unwrap().len(), 8);
    assert_eq!(model.compute_entity_similarity(&entities[0].id, &entities[6].id), 0.0);
}

#[test]
fn test_node2vec_rejects_bad_hyperparameters() {
    let err = Node2Vec::new(Node2VecConfig {
        q: 0.0,
        ..Node2VecConfig::default()
    })
    .unwrap_err();
    assert!(matches!(err, EmbeddingError::InvalidHyperparameter { name: "q", .. }));
    assert!(Node2Vec::new(Node2VecConfig {
        dimension: 0,
        ..Node2VecConfig::default()
    })
    .is_err());
}

#[test]
fn test_training_needs_relations() {
    let mut graph = KnowledgeGraph::new("flat");
    graph.add_entity(Entity::new("alone", EntityType::Concept));
    assert!(matches!(small_node2vec(1).train(&graph), Err(EmbeddingError::EmptyGraph)));
    assert!(matches!(small_transe(1).train(&graph), Err(EmbeddingError::EmptyGraph)));
}

// ============================================================================
// TransE
// ============================================================================

#[test]
fn test_transe_is_deterministic_and_normalized() {
    let (graph, _) = two_communities();
    let mut first = small_transe(3);
    let mut second = small_transe(3);
    assert_eq!(first.train(&graph).unwrap(), second.train(&graph).unwrap());
    assert_eq!(rows(&first), rows(&second));

    // Every entity gets a vector, isolated ones included.
    assert_eq!(first.store().len(), 7);
    for (_, vector) in rows(&first) {
        let norm: f64 = vector.iter().map(|x| x * x).sum::<f64>().sqrt();
        assert_relative_eq!(norm, 1.0, epsilon = 1e-9);
    }
}

#[test]
fn test_transe_relation_embeddings() {
    let (graph, _) = two_communities();
    let mut model = small_transe(5);
    model.train(&graph).unwrap();
    for relation_type in [RelationType::RelatedTo, RelationType::Contains, RelationType::References] {
        let vector = model.get_relation_embedding(relation_type).unwrap();
        assert_relative_eq!(vector.dot(&vector).sqrt(), 1.0, epsilon = 1e-9);
    }
    assert!(model.get_relation_embedding(RelationType::Synonyms).is_none());
}

#[test]
fn test_transe_skips_triples_without_unobserved_corruption() {
    // One draw per corruption: draws landing on the observed triple skip it.
    let mut graph = KnowledgeGraph::new("pair");
    let a = Entity::new("a", EntityType::Concept);
    let b = Entity::new("b", EntityType::Concept);
    graph.add_entity(a.clone());
    graph.add_entity(b.clone());
    graph.add_relation(Relation::between(&a, &b, RelationType::RelatedTo));
    let mut model = TransE::new(TransEConfig {
        dimension: 4,
        epochs: 3,
        max_negative_attempts: 1,
        ..TransEConfig::default()
    })
    .unwrap();
    let summary = model.train(&graph).unwrap();
    assert_eq!(summary.entity_count, 2);
}

// ============================================================================
// Similarity & persistence
// ============================================================================

#[test]
fn test_self_similarity_is_one() {
    let (graph, _) = two_communities();
    let mut node2vec = small_node2vec(11);
    node2vec.train(&graph).unwrap();
    let mut transe = small_transe(11);
    transe.train(&graph).unwrap();
    for model in [&node2vec as &dyn GraphEmbedding, &transe] {
        for id in model.store().entity_ids() {
            assert_eq!(model.compute_entity_similarity(id, id), 1.0);
        }
    }
}

#[test]
fn test_recommend_excludes_self_and_orders_by_similarity() {
    let (graph, entities) = two_communities();
    let mut model = small_transe(2);
    model.train(&graph).unwrap();

    let recommended = model.recommend_entities(&entities[0].id, 3);
    assert_eq!(recommended.len(), 3);
    assert!(recommended.iter().all(|(id, _)| *id != entities[0].id));
    assert!(recommended.windows(2).all(|w| w[0].1 >= w[1].1));
    assert!(model.recommend_entities("unknown", 3).is_empty());
    assert_eq!(model.recommend_entities(&entities[0].id, 100).len(), 6);
}

#[test]
fn test_recommend_ties_follow_row_order() {
    let ids = vec!["q".to_string(), "x".to_string(), "y".to_string(), "z".to_string()];
    let matrix = Array2::from_shape_vec(
        (4, 2),
        vec![1.0, 0.0, 0.0, 1.0, 0.0, 1.0, 1.0, 0.0],
    )
    .unwrap();
    let store = EmbeddingStore::new("fixed", ids, matrix, BTreeMap::new()).unwrap();
    let recommended = store.recommend("q", 3);
    let order: Vec<&str> = recommended.iter().map(|(id, _)| id.as_str()).collect();
    assert_eq!(order, vec!["z", "x", "y"]);
    assert_relative_eq!(recommended[0].1, 1.0);
    assert_relative_eq!(recommended[1].1, 0.5);
}

#[test]
fn test_remapped_cosine() {
    let a = arr1(&[1.0, 0.0]);
    let b = arr1(&[-1.0, 0.0]);
    let zero = arr1(&[0.0, 0.0]);
    assert_relative_eq!(remapped_cosine(a.view(), b.view()), 0.0);
    assert_relative_eq!(remapped_cosine(a.view(), arr1(&[0.0, 2.0]).view()), 0.5);
    assert_eq!(remapped_cosine(a.view(), zero.view()), 0.0);
}

#[test]
fn test_store_save_and_load() {
    let (graph, entities) = two_communities();
    let mut model = small_transe(9);
    model.train(&graph).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("transe.cbor");
    model.store().save(&path).unwrap();
    let loaded = EmbeddingStore::load(&path).unwrap();

    assert_eq!(loaded.model(), "transe");
    assert_eq!(loaded.dimension(), 8);
    assert_eq!(loaded.entity_ids(), model.store().entity_ids());
    assert_eq!(
        loaded.entity(&entities[1].id).unwrap().to_vec(),
        model.get_entity_embedding(&entities[1].id).unwrap().to_vec()
    );
    assert_eq!(
        loaded.relation(RelationType::Contains).unwrap().to_vec(),
        model.get_relation_embedding(RelationType::Contains).unwrap().to_vec()
    );
    assert_eq!(
        loaded.recommend(&entities[1].id, 4),
        model.recommend_entities(&entities[1].id, 4)
    );
}

#[test]
fn test_decode_rejects_garbage_and_bad_shapes() {
    assert!(matches!(EmbeddingStore::decode(b"not cbor"), Err(EmbeddingError::Decode(_))));

    let err = EmbeddingStore::new(
        "bad",
        vec!["a".into()],
        Array2::zeros((2, 3)),
        BTreeMap::new(),
    )
    .unwrap_err();
    assert!(matches!(err, EmbeddingError::DimensionMismatch { expected: 1, found: 2 }));

    let mut relations = BTreeMap::new();
    relations.insert(RelationType::Contains, arr1(&[1.0]));
    let err = EmbeddingStore::new("bad", vec!["a".into()], Array2::zeros((1, 3)), relations).unwrap_err();
    assert!(matches!(err, EmbeddingError::DimensionMismatch { expected: 3, found: 1 }));
}
