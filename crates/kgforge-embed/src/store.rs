//! Trained vectors shared by every model, and their on-disk form.
//!
//! Entity rows keep the order the trainer produced them in, which is the
//! order of the source graph's entity map. Recommendation ties fall back to
//! that order.

use kgforge_model::RelationType;
use ndarray::{Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::io::{BufReader, BufWriter};
use std::path::Path;

use crate::error::{EmbeddingError, Result};

pub const EMBEDDINGS_FILE_VERSION_V1: &str = "kgforge_embeddings_v1";

#[derive(Debug, Clone)]
pub struct EmbeddingStore {
    model: String,
    dimension: usize,
    entity_ids: Vec<String>,
    positions: HashMap<String, usize>,
    entities: Array2<f64>,
    relations: BTreeMap<RelationType, Array1<f64>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct EmbeddingsFileV1 {
    version: String,
    model: String,
    dimension: usize,
    entity_ids: Vec<String>,
    entity_vectors: Vec<Vec<f64>>,
    #[serde(default)]
    relation_vectors: BTreeMap<RelationType, Vec<f64>>,
}

impl EmbeddingStore {
    pub fn empty(model: impl Into<String>, dimension: usize) -> Self {
        Self {
            model: model.into(),
            dimension,
            entity_ids: Vec::new(),
            positions: HashMap::new(),
            entities: Array2::zeros((0, dimension)),
            relations: BTreeMap::new(),
        }
    }

    /// `entities` holds one row per id, in the same order.
    pub fn new(
        model: impl Into<String>,
        entity_ids: Vec<String>,
        entities: Array2<f64>,
        relations: BTreeMap<RelationType, Array1<f64>>,
    ) -> Result<Self> {
        let dimension = entities.ncols();
        if entities.nrows() != entity_ids.len() {
            return Err(EmbeddingError::DimensionMismatch {
                expected: entity_ids.len(),
                found: entities.nrows(),
            });
        }
        if let Some(bad) = relations.values().find(|v| v.len() != dimension) {
            return Err(EmbeddingError::DimensionMismatch {
                expected: dimension,
                found: bad.len(),
            });
        }
        let positions = entity_ids
            .iter()
            .enumerate()
            .map(|(i, id)| (id.clone(), i))
            .collect();
        Ok(Self {
            model: model.into(),
            dimension,
            entity_ids,
            positions,
            entities,
            relations,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.entity_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entity_ids.is_empty()
    }

    pub fn entity_ids(&self) -> &[String] {
        &self.entity_ids
    }

    pub fn entity(&self, entity_id: &str) -> Option<ArrayView1<'_, f64>> {
        self.positions.get(entity_id).map(|&i| self.entities.row(i))
    }

    pub fn relation(&self, relation_type: RelationType) -> Option<ArrayView1<'_, f64>> {
        self.relations.get(&relation_type).map(|v| v.view())
    }

    /// Cosine similarity remapped to `[0, 1]`; 0.0 when either side is
    /// missing or has zero norm.
    pub fn similarity(&self, a: &str, b: &str) -> f64 {
        match (self.entity(a), self.entity(b)) {
            (Some(x), Some(y)) => remapped_cosine(x, y),
            _ => 0.0,
        }
    }

    /// Top `k` other entities by similarity, stable on row order.
    pub fn recommend(&self, entity_id: &str, k: usize) -> Vec<(String, f64)> {
        let Some(query) = self.entity(entity_id) else {
            return Vec::new();
        };
        let mut scored: Vec<(String, f64)> = self
            .entity_ids
            .iter()
            .enumerate()
            .filter(|(_, id)| id.as_str() != entity_id)
            .map(|(i, id)| (id.clone(), remapped_cosine(query, self.entities.row(i))))
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(k);
        scored
    }

    // ------------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------------

    pub fn encode(&self) -> Result<Vec<u8>> {
        let file = EmbeddingsFileV1 {
            version: EMBEDDINGS_FILE_VERSION_V1.to_string(),
            model: self.model.clone(),
            dimension: self.dimension,
            entity_ids: self.entity_ids.clone(),
            entity_vectors: self.entities.outer_iter().map(|row| row.to_vec()).collect(),
            relation_vectors: self
                .relations
                .iter()
                .map(|(t, v)| (*t, v.to_vec()))
                .collect(),
        };
        let mut out = Vec::new();
        ciborium::ser::into_writer(&file, &mut out).map_err(|e| EmbeddingError::Encode(e.to_string()))?;
        Ok(out)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let file: EmbeddingsFileV1 =
            ciborium::de::from_reader(bytes).map_err(|e| EmbeddingError::Decode(e.to_string()))?;
        Self::from_file(file)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let bytes = self.encode()?;
        let mut writer = BufWriter::new(std::fs::File::create(path)?);
        std::io::Write::write_all(&mut writer, &bytes)?;
        std::io::Write::flush(&mut writer)?;
        tracing::info!(path = %path.display(), entities = self.len(), model = %self.model, "saved embeddings");
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let reader = BufReader::new(std::fs::File::open(path)?);
        let file: EmbeddingsFileV1 =
            ciborium::de::from_reader(reader).map_err(|e| EmbeddingError::Decode(e.to_string()))?;
        let store = Self::from_file(file)?;
        tracing::info!(path = %path.display(), entities = store.len(), model = %store.model, "loaded embeddings");
        Ok(store)
    }

    fn from_file(file: EmbeddingsFileV1) -> Result<Self> {
        if file.version != EMBEDDINGS_FILE_VERSION_V1 {
            return Err(EmbeddingError::Decode(format!(
                "unsupported embeddings file version: {} (expected {EMBEDDINGS_FILE_VERSION_V1})",
                file.version
            )));
        }
        if file.entity_vectors.len() != file.entity_ids.len() {
            return Err(EmbeddingError::DimensionMismatch {
                expected: file.entity_ids.len(),
                found: file.entity_vectors.len(),
            });
        }
        let mut flat = Vec::with_capacity(file.entity_ids.len() * file.dimension);
        for row in &file.entity_vectors {
            if row.len() != file.dimension {
                return Err(EmbeddingError::DimensionMismatch {
                    expected: file.dimension,
                    found: row.len(),
                });
            }
            flat.extend_from_slice(row);
        }
        let entities = Array2::from_shape_vec((file.entity_ids.len(), file.dimension), flat)
            .map_err(|e| EmbeddingError::Decode(e.to_string()))?;
        let relations = file
            .relation_vectors
            .into_iter()
            .map(|(t, v)| (t, Array1::from(v)))
            .collect();
        let mut store = Self::new(file.model, file.entity_ids, entities, relations)?;
        store.dimension = file.dimension;
        Ok(store)
    }
}

/// `(cos + 1) / 2`, clamped to `[0, 1]`.
pub fn remapped_cosine(a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> f64 {
    let n1 = a.dot(&a);
    let n2 = b.dot(&b);
    if n1 == 0.0 || n2 == 0.0 {
        return 0.0;
    }
    let cosine = a.dot(&b) / (n1 * n2).sqrt();
    ((cosine + 1.0) / 2.0).clamp(0.0, 1.0)
}
