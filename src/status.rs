//! Status file: the persisted reference set
//!
//! ```yaml
//! items:
//!   - kind: github-issue
//!     repo: octo/widgets
//!     number: 12
//!     last_updated: 2024-03-01T12:00:00Z
//! ```

use crate::reference::Reference;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Root structure of the status file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatusFile {
    #[serde(default)]
    pub items: Vec<Record>,
}

/// One persisted reference: its kind tag plus the kind's own fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub kind: String,
    #[serde(flatten)]
    pub fields: serde_yaml::Mapping,
}

impl StatusFile {
    /// Read the status file. A missing or empty file is an empty set.
    pub async fn load(path: &Path) -> Result<Self> {
        let content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(e).with_context(|| format!("Failed to read {}", path.display())),
        };

        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }

    /// Records in the given order (callers pass the sorted set).
    pub fn from_references(references: &[Reference]) -> crate::Result<Self> {
        let items = references
            .iter()
            .map(Reference::to_record)
            .collect::<crate::Result<Vec<_>>>()?;
        Ok(Self { items })
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        tokio::fs::write(path, yaml)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))
    }
}
