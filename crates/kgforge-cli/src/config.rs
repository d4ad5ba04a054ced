//! `ForgeConfig`: every tunable the CLI hands to the library crates.

use anyhow::{Context, Result};
use kgforge_builder::BuilderConfig;
use kgforge_embed::{Node2VecConfig, TransEConfig};
use kgforge_storage::{GraphStorage, JsonStorage, SqliteGraphStorage};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const SQLITE_FILE: &str = "kgforge.db";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    #[default]
    Json,
    Sqlite,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForgeConfig {
    /// Store directory; the SQLite backend keeps its database file inside it.
    pub store: PathBuf,
    pub backend: StorageBackend,
    pub builder: BuilderConfig,
    pub node2vec: Node2VecConfig,
    pub transe: TransEConfig,
}

impl Default for ForgeConfig {
    fn default() -> Self {
        Self {
            store: PathBuf::from("kgforge-store"),
            backend: StorageBackend::default(),
            builder: BuilderConfig::default(),
            node2vec: Node2VecConfig::default(),
            transe: TransEConfig::default(),
        }
    }
}

impl ForgeConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("invalid config {}", path.display()))
    }

    /// The file at `path` when given, defaults otherwise.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    /// A connected storage backend.
    pub fn open_storage(&self) -> Result<Box<dyn GraphStorage>> {
        let mut storage: Box<dyn GraphStorage> = match self.backend {
            StorageBackend::Json => Box::new(JsonStorage::new(&self.store)),
            StorageBackend::Sqlite => {
                std::fs::create_dir_all(&self.store)
                    .with_context(|| format!("failed to create {}", self.store.display()))?;
                Box::new(SqliteGraphStorage::open(self.store.join(SQLITE_FILE)))
            }
        };
        storage
            .connect()
            .with_context(|| format!("failed to open {} store at {}", storage.backend_name(), self.store.display()))?;
        Ok(storage)
    }
}
