//! KGForge model: typed entities, relations and the knowledge graph container.
//!
//! - [`Entity`] / [`Relation`]: identified records; equality is by id
//! - [`KnowledgeGraph`]: id-keyed maps plus type indexes, with referential
//!   integrity enforced on every insert
//! - [`GraphRecord`]: the lossless persisted form
//! - [`analysis`]: shortest paths, components, metrics, consistency checks
//!
//! The graph is not internally synchronized. Callers sharing one across
//! threads must serialize mutation themselves.

pub mod analysis;
pub mod entity;
pub mod graph;
pub mod types;

pub use entity::{normalize_name, Entity, Properties, Relation};
pub use graph::{GraphRecord, GraphStatistics, GraphView, KnowledgeGraph};
pub use types::{Direction, EntityType, ParseTypeError, RelationType};
