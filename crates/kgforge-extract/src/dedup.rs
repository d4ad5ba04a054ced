//! Name-based entity alignment.
//!
//! Two entities align when their lower-cased, trimmed names are equal. The
//! first entity seen for a name survives and absorbs the others through
//! [`Entity::merge_attributes`].

use kgforge_model::{Entity, Relation};
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct Deduplicated {
    /// Survivors, in first-seen order.
    pub entities: Vec<Entity>,
    /// Every input id mapped to the id of its survivor.
    pub id_map: HashMap<String, String>,
}

impl Deduplicated {
    /// Number of inputs folded into another entity.
    pub fn merged_count(&self) -> usize {
        self.id_map.iter().filter(|(from, to)| from != to).count()
    }
}

pub fn deduplicate_entities(entities: Vec<Entity>) -> Deduplicated {
    let mut survivors: Vec<Entity> = Vec::new();
    let mut by_name: HashMap<String, usize> = HashMap::new();
    let mut id_map = HashMap::new();

    for entity in entities {
        let key = entity.normalized_name();
        if let Some(slot) = by_name.get(&key).copied() {
            let survivor = &mut survivors[slot];
            tracing::trace!(survivor = %survivor.name, merged = %entity.name, "deduplicated entity");
            survivor.merge_attributes(&entity);
            id_map.insert(entity.id, survivor.id.clone());
        } else {
            by_name.insert(key, survivors.len());
            id_map.insert(entity.id.clone(), entity.id.clone());
            survivors.push(entity);
        }
    }

    Deduplicated {
        entities: survivors,
        id_map,
    }
}

/// Re-point relation endpoints through `id_map`.
///
/// Relations with an endpoint missing from the map, or that collapse into a
/// self loop, are returned separately as dropped.
pub fn remap_relations(
    relations: Vec<Relation>,
    id_map: &HashMap<String, String>,
) -> (Vec<Relation>, Vec<Relation>) {
    let mut kept = Vec::with_capacity(relations.len());
    let mut dropped = Vec::new();
    for mut relation in relations {
        match (id_map.get(&relation.head_id), id_map.get(&relation.tail_id)) {
            (Some(head), Some(tail)) if head != tail => {
                relation.head_id = head.clone();
                relation.tail_id = tail.clone();
                kept.push(relation);
            }
            _ => dropped.push(relation),
        }
    }
    (kept, dropped)
}
