//! KGForge embeddings: vector representations of graph entities.
//!
//! - [`Node2Vec`]: biased second-order random walks, then skip-gram with a
//!   full softmax over the walk vocabulary
//! - [`TransE`]: relations as translations, `h + r ≈ t`, trained with a
//!   margin ranking loss against corrupted triples
//! - [`EmbeddingStore`]: the trained vectors, similarity queries and the
//!   versioned CBOR file both models save to
//!
//! Training draws from a seeded `StdRng`, so a fixed seed and fixed
//! hyperparameters reproduce the same vectors.

pub mod error;
pub mod node2vec;
pub mod store;
pub mod transe;

use kgforge_model::KnowledgeGraph;
use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};

pub use error::{EmbeddingError, Result};
pub use node2vec::{Node2Vec, Node2VecConfig};
pub use store::{remapped_cosine, EmbeddingStore, EMBEDDINGS_FILE_VERSION_V1};
pub use transe::{TransE, TransEConfig};

/// What a finished training run reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingSummary {
    pub epochs: usize,
    /// Summed loss of the last epoch.
    pub final_loss: f64,
    /// Entities that received a vector.
    pub entity_count: usize,
}

/// A trainable embedding model.
pub trait GraphEmbedding {
    fn model_name(&self) -> &'static str;

    /// Train from scratch on `graph`, replacing any previous vectors.
    fn train(&mut self, graph: &KnowledgeGraph) -> Result<TrainingSummary>;

    fn store(&self) -> &EmbeddingStore;

    fn get_entity_embedding(&self, entity_id: &str) -> Option<ArrayView1<'_, f64>> {
        self.store().entity(entity_id)
    }

    fn compute_entity_similarity(&self, a: &str, b: &str) -> f64 {
        self.store().similarity(a, b)
    }

    /// Up to `k` other entities, most similar first. Empty for unknown ids.
    fn recommend_entities(&self, entity_id: &str, k: usize) -> Vec<(String, f64)> {
        self.store().recommend(entity_id, k)
    }
}

#[cfg(test)]
mod tests;
