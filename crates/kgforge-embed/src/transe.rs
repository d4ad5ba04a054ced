//! TransE: entities and relation types share one vector space in which a
//! relation translates its head onto its tail.
//!
//! Per observed triple, one corrupted triple replaces the head or the tail
//! (even odds) with a uniformly drawn entity, redrawing while the corruption
//! is itself observed. With `d(h, r, t) = ‖h + r − t‖` the loss is
//! `max(0, margin + d(pos) − d(neg))`; a positive loss moves all involved
//! vectors one unit-gradient step and every touched vector is re-normalized.

use kgforge_model::{KnowledgeGraph, RelationType};
use ndarray::{Array1, Array2, ArrayView1};
use rand::distributions::{Distribution, Uniform};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use crate::error::{require_nonzero, require_positive, EmbeddingError, Result};
use crate::{EmbeddingStore, GraphEmbedding, TrainingSummary};

pub const MODEL_NAME: &str = "transe";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransEConfig {
    pub dimension: usize,
    pub margin: f64,
    pub epochs: usize,
    pub learning_rate: f64,
    pub batch_size: usize,
    /// Draws per corruption before the triple is skipped for the epoch.
    pub max_negative_attempts: usize,
    pub seed: u64,
}

impl Default for TransEConfig {
    fn default() -> Self {
        Self {
            dimension: 128,
            margin: 1.0,
            epochs: 100,
            learning_rate: 0.01,
            batch_size: 100,
            max_negative_attempts: 100,
            seed: 42,
        }
    }
}

impl TransEConfig {
    pub fn validate(&self) -> Result<()> {
        require_nonzero("dimension", self.dimension)?;
        require_nonzero("batch_size", self.batch_size)?;
        require_nonzero("max_negative_attempts", self.max_negative_attempts)?;
        require_positive("margin", self.margin)?;
        require_positive("learning_rate", self.learning_rate)
    }
}

/// (head, relation, tail) as row indices.
type Triple = (usize, usize, usize);

fn normalize_row(matrix: &mut Array2<f64>, row: usize) {
    let mut view = matrix.row_mut(row);
    let norm = view.dot(&view).sqrt();
    if norm > 0.0 {
        view /= norm;
    }
}

fn distance(h: ArrayView1<'_, f64>, r: ArrayView1<'_, f64>, t: ArrayView1<'_, f64>) -> Array1<f64> {
    &h + &r - &t
}

fn unit(v: &Array1<f64>) -> Array1<f64> {
    let norm = v.dot(v).sqrt();
    if norm > 0.0 {
        v / norm
    } else {
        Array1::zeros(v.len())
    }
}

#[derive(Debug, Clone)]
pub struct TransE {
    config: TransEConfig,
    store: EmbeddingStore,
}

impl TransE {
    pub fn new(config: TransEConfig) -> Result<Self> {
        config.validate()?;
        let store = EmbeddingStore::empty(MODEL_NAME, config.dimension);
        Ok(Self { config, store })
    }

    pub fn config(&self) -> &TransEConfig {
        &self.config
    }

    pub fn get_relation_embedding(&self, relation_type: RelationType) -> Option<ArrayView1<'_, f64>> {
        self.store.relation(relation_type)
    }

    fn init_matrix(&self, rows: usize, rng: &mut StdRng) -> Array2<f64> {
        let dim = self.config.dimension;
        let bound = 6.0 / (dim as f64).sqrt();
        let init = Uniform::new_inclusive(-bound, bound);
        let mut matrix = Array2::from_shape_fn((rows, dim), |_| init.sample(rng));
        for row in 0..rows {
            normalize_row(&mut matrix, row);
        }
        matrix
    }

    /// A corruption of `triple` that is not observed, or `None` once
    /// `max_negative_attempts` draws all hit observed triples.
    fn corrupt(
        &self,
        triple: Triple,
        entity_count: usize,
        observed: &HashSet<Triple>,
        rng: &mut StdRng,
    ) -> Option<Triple> {
        let (head, relation, tail) = triple;
        let replace_head = rng.gen::<f64>() < 0.5;
        for _ in 0..self.config.max_negative_attempts {
            let drawn = rng.gen_range(0..entity_count);
            let candidate = if replace_head {
                (drawn, relation, tail)
            } else {
                (head, relation, drawn)
            };
            if !observed.contains(&candidate) {
                return Some(candidate);
            }
        }
        None
    }

    fn step(&self, entities: &mut Array2<f64>, relations: &mut Array2<f64>, pos: Triple, neg: Triple) -> f64 {
        let (h, r, t) = pos;
        let (nh, nr, nt) = neg;
        let pos_diff = distance(entities.row(h), relations.row(r), entities.row(t));
        let neg_diff = distance(entities.row(nh), relations.row(nr), entities.row(nt));
        let pos_score = pos_diff.dot(&pos_diff).sqrt();
        let neg_score = neg_diff.dot(&neg_diff).sqrt();
        let loss = (self.config.margin + pos_score - neg_score).max(0.0);
        if loss <= 0.0 {
            return 0.0;
        }

        let lr = self.config.learning_rate;
        let pos_grad = unit(&pos_diff);
        let neg_grad = unit(&neg_diff);
        entities.row_mut(h).scaled_add(-lr, &pos_grad);
        relations.row_mut(r).scaled_add(-lr, &pos_grad);
        entities.row_mut(t).scaled_add(lr, &pos_grad);
        entities.row_mut(nh).scaled_add(lr, &neg_grad);
        relations.row_mut(nr).scaled_add(lr, &neg_grad);
        entities.row_mut(nt).scaled_add(-lr, &neg_grad);

        for row in [h, t, nh, nt] {
            normalize_row(entities, row);
        }
        for row in [r, nr] {
            normalize_row(relations, row);
        }
        loss
    }
}

impl GraphEmbedding for TransE {
    fn model_name(&self) -> &'static str {
        MODEL_NAME
    }

    fn train(&mut self, graph: &KnowledgeGraph) -> Result<TrainingSummary> {
        if graph.relation_count() == 0 {
            return Err(EmbeddingError::EmptyGraph);
        }
        let entity_ids: Vec<String> = graph.entities().map(|e| e.id.clone()).collect();
        let positions: HashMap<&str, usize> = entity_ids
            .iter()
            .enumerate()
            .map(|(i, id)| (id.as_str(), i))
            .collect();
        let relation_types: Vec<RelationType> = graph
            .relations()
            .map(|r| r.relation_type)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let relation_index: HashMap<RelationType, usize> =
            relation_types.iter().enumerate().map(|(i, t)| (*t, i)).collect();

        let mut triples: Vec<Triple> = graph
            .relations()
            .filter_map(|r| {
                Some((
                    *positions.get(r.head_id.as_str())?,
                    *relation_index.get(&r.relation_type)?,
                    *positions.get(r.tail_id.as_str())?,
                ))
            })
            .collect();
        let observed: HashSet<Triple> = triples.iter().copied().collect();

        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let mut entities = self.init_matrix(entity_ids.len(), &mut rng);
        let mut relations = self.init_matrix(relation_types.len(), &mut rng);

        let mut epoch_loss = 0.0;
        let mut skipped = 0usize;
        for epoch in 0..self.config.epochs {
            epoch_loss = 0.0;
            triples.shuffle(&mut rng);
            for batch in triples.chunks(self.config.batch_size) {
                let mut batch_loss = 0.0;
                for &triple in batch {
                    let Some(negative) = self.corrupt(triple, entity_ids.len(), &observed, &mut rng) else {
                        skipped += 1;
                        continue;
                    };
                    batch_loss += self.step(&mut entities, &mut relations, triple, negative);
                }
                epoch_loss += batch_loss;
            }
            if epoch % 10 == 0 {
                tracing::info!(model = MODEL_NAME, epoch, loss = epoch_loss, "training epoch");
            }
        }
        if skipped > 0 {
            tracing::warn!(model = MODEL_NAME, skipped, "no unobserved corruption found for some triples");
        }

        let relation_vectors: BTreeMap<RelationType, Array1<f64>> = relation_types
            .iter()
            .enumerate()
            .map(|(i, t)| (*t, relations.row(i).to_owned()))
            .collect();
        self.store = EmbeddingStore::new(MODEL_NAME, entity_ids, entities, relation_vectors)?;
        tracing::info!(model = MODEL_NAME, entities = self.store.len(), "training completed");

        Ok(TrainingSummary {
            epochs: self.config.epochs,
            final_loss: epoch_loss,
            entity_count: self.store.len(),
        })
    }

    fn store(&self) -> &EmbeddingStore {
        &self.store
    }
}
