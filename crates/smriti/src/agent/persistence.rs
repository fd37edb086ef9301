//! Persistence boundary for the learned value table
//!
//! The policy agent owns its table; persistence is injected so the
//! table is never ambient global state. The default implementation
//! writes JSON to a well-known per-user location.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::agent::qtable::QTable;
use crate::error::{Result, SmritiError};

/// Load/save boundary for the agent's learned value table
pub trait QTablePersistence: Send + Sync {
    /// Load the table, returning an empty one when no artifact exists
    fn load(&self) -> Result<QTable>;

    /// Persist the table
    fn save(&self, table: &QTable) -> Result<()>;
}

/// JSON-file persistence at a configurable path
pub struct JsonFileQTable {
    path: PathBuf,
}

impl JsonFileQTable {
    /// Persist at the given path
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Persist at the default per-user location (`~/.smriti/q_table.json`)
    pub fn at_default_path() -> Self {
        Self::new(default_q_table_path())
    }

    /// The configured artifact path
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Default per-user location for the learned value table
pub fn default_q_table_path() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".smriti"))
        .unwrap_or_else(|| PathBuf::from(".smriti"))
        .join("q_table.json")
}

impl QTablePersistence for JsonFileQTable {
    fn load(&self) -> Result<QTable> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "no persisted value table, starting empty");
            return Ok(QTable::new());
        }

        let contents = std::fs::read_to_string(&self.path)?;
        serde_json::from_str(&contents)
            .map_err(|error| SmritiError::Serialization(error.to_string()))
    }

    fn save(&self, table: &QTable) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = serde_json::to_string_pretty(table)
            .map_err(|error| SmritiError::Serialization(error.to_string()))?;
        std::fs::write(&self.path, contents)?;
        debug!(path = %self.path.display(), entries = table.len(), "persisted value table");
        Ok(())
    }
}
