//! KGForge builder: turns extracted candidates into a knowledge graph.
//!
//! - [`builder`]: the collect, deduplicate, populate, filter, infer pipeline,
//!   incremental updates and weighted multi-source builds
//! - [`inference`]: transitive, symmetric and hierarchical relation rules
//! - [`validation`]: integrity, connectivity, isolation and cycle checks
//! - [`merge`]: name-aligned merging of several graphs
//! - [`cache`]: an explicit cache of built graphs

pub mod builder;
pub mod cache;
pub mod config;
pub mod inference;
pub mod merge;
pub mod validation;

pub use builder::{GraphSource, KnowledgeGraphBuilder, UpdateSummary, WeightedSource};
pub use cache::GraphBuilderCache;
pub use config::BuilderConfig;
pub use inference::infer_relations;
pub use merge::merge_graphs;
pub use validation::{find_cycles, validate_graph, Severity, ValidationIssue, ValidationReport};

#[cfg(test)]
mod tests;
