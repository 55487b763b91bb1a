//! Reference registry: which kinds are tried, and in what order

use crate::error::{Error, Result};
use crate::reference::{Kind, Reference};
use crate::status::Record;
use std::collections::HashSet;
use tracing::{debug, info};

/// Ordered set of reference kinds. Order only affects lookup cost.
#[derive(Debug, Clone)]
pub struct Registry {
    kinds: Vec<Kind>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(Kind::ALL.to_vec())
    }
}

impl Registry {
    pub fn new(kinds: Vec<Kind>) -> Self {
        Self { kinds }
    }

    pub fn kinds(&self) -> &[Kind] {
        &self.kinds
    }

    /// First kind that builds a reference from `url`, if any.
    pub fn identify(&self, url: &str) -> Option<Reference> {
        self.kinds
            .iter()
            .filter(|kind| kind.recognizes(url))
            .find_map(|kind| kind.construct(url).ok())
    }

    /// References among the URLs found in source. Unrecognized URLs are skipped.
    pub fn identify_all<'a>(&self, urls: impl IntoIterator<Item = &'a str>) -> HashSet<Reference> {
        let mut found = HashSet::new();
        for url in urls {
            match self.identify(url) {
                Some(reference) => {
                    debug!(url, kind = %reference.kind(), "identified reference");
                    found.insert(reference);
                }
                None => debug!(url, "not a tracked reference"),
            }
        }
        info!(count = found.len(), "identified references in source");
        found
    }

    /// Rebuild a persisted reference. Unknown kinds are an error.
    pub fn load(&self, record: Record) -> Result<Reference> {
        let kind = Kind::from_tag(&record.kind)
            .filter(|kind| self.kinds.contains(kind))
            .ok_or_else(|| Error::InvalidItem {
                kind: record.kind.clone(),
                reason: "unknown kind".to_string(),
            })?;
        kind.from_fields(record.fields)
    }

    pub fn load_all(&self, records: Vec<Record>) -> Result<HashSet<Reference>> {
        let loaded = records
            .into_iter()
            .map(|record| self.load(record))
            .collect::<Result<HashSet<_>>>()?;
        info!(count = loaded.len(), "loaded references from status file");
        Ok(loaded)
    }
}
