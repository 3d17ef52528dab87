//! The fact table — durable key/value attributes of the user.
//!
//! Facts live in a single JSON object on disk. Merges are shallow,
//! last-write-wins per key, and the file is rewritten synchronously after
//! every merge. Keys are never deleted programmatically.

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub struct FactStore {
    path: PathBuf,
    facts: BTreeMap<String, serde_json::Value>,
}

impl FactStore {
    /// Load the fact table from `path`. A missing file yields an empty
    /// table; a present-but-corrupt file is an error.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let facts = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read fact table {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("fact table {} is not valid JSON", path.display()))?
        } else {
            BTreeMap::new()
        };
        Ok(Self { path, facts })
    }

    /// Shallow merge: new keys are added, existing keys overwritten.
    /// Persists to disk before returning.
    pub fn merge(&mut self, new_facts: &BTreeMap<String, serde_json::Value>) -> Result<()> {
        if new_facts.is_empty() {
            return Ok(());
        }
        for (key, value) in new_facts {
            self.facts.insert(key.clone(), value.clone());
        }
        self.persist()
    }

    /// The full current table, serialized for prompt-building. There is no
    /// partial or filtered view.
    pub fn snapshot(&self) -> String {
        serde_json::to_string(&self.facts).unwrap_or_else(|_| "{}".to_string())
    }

    pub fn len(&self) -> usize {
        self.facts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }

    fn persist(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory {}", parent.display()))?;
        }
        let contents =
            serde_json::to_string_pretty(&self.facts).context("failed to serialize facts")?;
        std::fs::write(&self.path, contents)
            .with_context(|| format!("failed to write fact table {}", self.path.display()))
    }
}
