//! Node2Vec: biased random walks over the undirected relation graph, then a
//! skip-gram model trained with plain SGD and a full softmax.
//!
//! Transition weights from `current`, having arrived from `prev`:
//! - back to `prev`: `1 / p`
//! - to a node also adjacent to `prev`: `1`
//! - anywhere else: `1 / q`

use kgforge_model::KnowledgeGraph;
use ndarray::{Array1, Array2, Axis};
use rand::distributions::{Distribution, Uniform, WeightedIndex};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::error::{require_nonzero, require_positive, EmbeddingError, Result};
use crate::{EmbeddingStore, GraphEmbedding, TrainingSummary};

pub const MODEL_NAME: &str = "node2vec";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Node2VecConfig {
    pub dimension: usize,
    pub walk_length: usize,
    pub num_walks: usize,
    /// Return parameter.
    pub p: f64,
    /// In-out parameter.
    pub q: f64,
    pub window_size: usize,
    pub epochs: usize,
    pub learning_rate: f64,
    pub seed: u64,
}

impl Default for Node2VecConfig {
    fn default() -> Self {
        Self {
            dimension: 128,
            walk_length: 80,
            num_walks: 10,
            p: 1.0,
            q: 1.0,
            window_size: 5,
            epochs: 100,
            learning_rate: 0.025,
            seed: 42,
        }
    }
}

impl Node2VecConfig {
    pub fn validate(&self) -> Result<()> {
        require_nonzero("dimension", self.dimension)?;
        require_nonzero("walk_length", self.walk_length)?;
        require_nonzero("num_walks", self.num_walks)?;
        require_nonzero("window_size", self.window_size)?;
        require_positive("p", self.p)?;
        require_positive("q", self.q)?;
        require_positive("learning_rate", self.learning_rate)
    }
}

/// Undirected adjacency over entity positions.
struct Adjacency {
    neighbors: Vec<Vec<usize>>,
    neighbor_sets: Vec<HashSet<usize>>,
}

impl Adjacency {
    fn build(graph: &KnowledgeGraph, positions: &HashMap<&str, usize>) -> Self {
        let n = positions.len();
        let mut neighbors = vec![Vec::new(); n];
        for relation in graph.relations() {
            let (Some(&h), Some(&t)) = (
                positions.get(relation.head_id.as_str()),
                positions.get(relation.tail_id.as_str()),
            ) else {
                continue;
            };
            neighbors[h].push(t);
            neighbors[t].push(h);
        }
        let neighbor_sets = neighbors.iter().map(|ns| ns.iter().copied().collect()).collect();
        Self {
            neighbors,
            neighbor_sets,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Node2Vec {
    config: Node2VecConfig,
    store: EmbeddingStore,
}

impl Node2Vec {
    pub fn new(config: Node2VecConfig) -> Result<Self> {
        config.validate()?;
        let store = EmbeddingStore::empty(MODEL_NAME, config.dimension);
        Ok(Self { config, store })
    }

    pub fn config(&self) -> &Node2VecConfig {
        &self.config
    }

    fn next_step(&self, adjacency: &Adjacency, prev: usize, current: usize, rng: &mut StdRng) -> usize {
        let candidates = &adjacency.neighbors[current];
        let weights: Vec<f64> = candidates
            .iter()
            .map(|&next| {
                if next == prev {
                    1.0 / self.config.p
                } else if adjacency.neighbor_sets[prev].contains(&next) {
                    1.0
                } else {
                    1.0 / self.config.q
                }
            })
            .collect();
        match WeightedIndex::new(&weights) {
            Ok(dist) => candidates[dist.sample(rng)],
            Err(_) => candidates[rng.gen_range(0..candidates.len())],
        }
    }

    fn walk(&self, adjacency: &Adjacency, start: usize, rng: &mut StdRng) -> Vec<usize> {
        let mut walk = vec![start];
        while walk.len() < self.config.walk_length {
            let current = walk[walk.len() - 1];
            let candidates = &adjacency.neighbors[current];
            if candidates.is_empty() {
                break;
            }
            let next = if walk.len() == 1 {
                candidates[rng.gen_range(0..candidates.len())]
            } else {
                self.next_step(adjacency, walk[walk.len() - 2], current, rng)
            };
            walk.push(next);
        }
        walk
    }

    /// `num_walks` rounds; each round visits every connected node once, in
    /// shuffled order.
    fn generate_walks(&self, adjacency: &Adjacency, rng: &mut StdRng) -> Vec<Vec<usize>> {
        let mut starts: Vec<usize> = (0..adjacency.neighbors.len())
            .filter(|&i| !adjacency.neighbors[i].is_empty())
            .collect();
        let mut walks = Vec::with_capacity(starts.len() * self.config.num_walks);
        for _ in 0..self.config.num_walks {
            starts.shuffle(rng);
            for &start in &starts {
                let walk = self.walk(adjacency, start, rng);
                if walk.len() > 1 {
                    walks.push(walk);
                }
            }
        }
        walks
    }

    /// Skip-gram over `walks`. Returns the input matrix and the last epoch's
    /// loss. `walks` holds vocabulary indices.
    fn train_skipgram(&self, walks: &[Vec<usize>], vocab_size: usize, rng: &mut StdRng) -> (Array2<f64>, f64) {
        let dim = self.config.dimension;
        let bound = 0.5 / dim as f64;
        let init = Uniform::new_inclusive(-bound, bound);
        let mut w_in = Array2::from_shape_fn((vocab_size, dim), |_| init.sample(rng));
        let mut w_out = Array2::from_shape_fn((dim, vocab_size), |_| init.sample(rng));
        let lr = self.config.learning_rate;
        let window = self.config.window_size;

        let mut epoch_loss = 0.0;
        for epoch in 0..self.config.epochs {
            epoch_loss = 0.0;
            for walk in walks {
                for (i, &center) in walk.iter().enumerate() {
                    let lo = i.saturating_sub(window);
                    let hi = (i + window + 1).min(walk.len());
                    for (j, &context) in walk.iter().enumerate().take(hi).skip(lo) {
                        if i == j {
                            continue;
                        }
                        let h: Array1<f64> = w_in.row(center).to_owned();
                        let mut error = softmax(&h.dot(&w_out));
                        epoch_loss += -(error[context] + 1e-10).ln();
                        error[context] -= 1.0;

                        let outer = h
                            .view()
                            .insert_axis(Axis(1))
                            .dot(&error.view().insert_axis(Axis(0)));
                        w_out.scaled_add(-lr, &outer);
                        let grad = w_out.dot(&error);
                        w_in.row_mut(center).scaled_add(-lr, &grad);
                    }
                }
            }
            if epoch % 10 == 0 {
                tracing::info!(model = MODEL_NAME, epoch, loss = epoch_loss, "training epoch");
            }
        }
        (w_in, epoch_loss)
    }
}

fn softmax(x: &Array1<f64>) -> Array1<f64> {
    let max = x.fold(f64::NEG_INFINITY, |m, &v| m.max(v));
    let exp = x.mapv(|v| (v - max).exp());
    let sum = exp.sum();
    exp / sum
}

impl GraphEmbedding for Node2Vec {
    fn model_name(&self) -> &'static str {
        MODEL_NAME
    }

    fn train(&mut self, graph: &KnowledgeGraph) -> Result<TrainingSummary> {
        if graph.relation_count() == 0 {
            return Err(EmbeddingError::EmptyGraph);
        }
        let ids: Vec<&str> = graph.entities().map(|e| e.id.as_str()).collect();
        let positions: HashMap<&str, usize> = ids.iter().enumerate().map(|(i, id)| (*id, i)).collect();
        let adjacency = Adjacency::build(graph, &positions);

        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let walks = self.generate_walks(&adjacency, &mut rng);

        // Vocabulary: nodes that occur in some walk, in entity-map order.
        let mut seen = vec![false; ids.len()];
        for &node in walks.iter().flatten() {
            seen[node] = true;
        }
        let mut vocab_index = vec![usize::MAX; ids.len()];
        let mut vocab_ids = Vec::new();
        for (node, _) in seen.iter().enumerate().filter(|(_, s)| **s) {
            vocab_index[node] = vocab_ids.len();
            vocab_ids.push(ids[node].to_string());
        }
        let corpus: Vec<Vec<usize>> = walks
            .iter()
            .map(|walk| walk.iter().map(|&node| vocab_index[node]).collect())
            .collect();

        tracing::info!(
            model = MODEL_NAME,
            walks = corpus.len(),
            vocabulary = vocab_ids.len(),
            "generated random walks"
        );
        let (matrix, final_loss) = self.train_skipgram(&corpus, vocab_ids.len(), &mut rng);
        self.store = EmbeddingStore::new(MODEL_NAME, vocab_ids, matrix, BTreeMap::new())?;
        tracing::info!(model = MODEL_NAME, entities = self.store.len(), "training completed");

        Ok(TrainingSummary {
            epochs: self.config.epochs,
            final_loss,
            entity_count: self.store.len(),
        })
    }

    fn store(&self) -> &EmbeddingStore {
        &self.store
    }
}
