//! Merging several graphs into one.
//!
//! Entities are aligned by name exactly as in deduplication. Every survivor is
//! re-added under a new id; relations are re-pointed through the alignment
//! and kept when both endpoints survived and they do not collapse into a
//! self loop. Parallel edges with the same (head, tail, type) keep the highest
//! confidence.

use kgforge_extract::deduplicate_entities;
use kgforge_model::{KnowledgeGraph, Relation, RelationType};
use std::collections::HashMap;

pub fn merge_graphs(name: &str, graphs: &[KnowledgeGraph]) -> KnowledgeGraph {
    let entities: Vec<_> = graphs.iter().flat_map(|g| g.entities().cloned()).collect();
    let relations: Vec<&Relation> = graphs.iter().flat_map(|g| g.relations()).collect();
    let input_entities = entities.len();

    let aligned = deduplicate_entities(entities);

    let mut merged = KnowledgeGraph::new(name);
    let mut renamed: HashMap<String, String> = HashMap::new();
    for survivor in aligned.entities {
        let fresh = survivor.with_new_id();
        renamed.insert(survivor.id, fresh.id.clone());
        merged.add_entity(fresh);
    }

    let mut by_edge: HashMap<(String, String, RelationType), usize> = HashMap::new();
    let mut kept: Vec<Relation> = Vec::new();
    let mut dropped = 0usize;
    for relation in relations {
        let head = aligned.id_map.get(&relation.head_id).and_then(|id| renamed.get(id));
        let tail = aligned.id_map.get(&relation.tail_id).and_then(|id| renamed.get(id));
        let (Some(head), Some(tail)) = (head, tail) else {
            dropped += 1;
            continue;
        };
        if head == tail {
            dropped += 1;
            continue;
        }

        let key = (head.clone(), tail.clone(), relation.relation_type);
        if let Some(&slot) = by_edge.get(&key) {
            let existing = &mut kept[slot];
            if relation.confidence > existing.confidence {
                existing.confidence = relation.confidence;
            }
            continue;
        }

        let mut fresh = relation.with_new_id();
        fresh.head_id = head.clone();
        fresh.tail_id = tail.clone();
        by_edge.insert(key, kept.len());
        kept.push(fresh);
    }

    for relation in kept {
        if !merged.add_relation(relation) {
            dropped += 1;
        }
    }

    if dropped > 0 {
        tracing::warn!(dropped, "relations dropped while merging graphs");
    }
    tracing::info!(
        graphs = graphs.len(),
        input_entities,
        entities = merged.entity_count(),
        relations = merged.relation_count(),
        "merged graphs"
    );
    merged
}
