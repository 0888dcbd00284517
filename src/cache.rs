/*!
Persistent record of filter decisions, keyed by document id. Each decision is appended to a JSON
lines file as soon as it is made, so an interrupted run never asks the operator twice. When a file
holds several lines for the same id, the last one wins.

Only one bootstrapping run may use a given cache file at a time; there is no locking.
*/
use crate::error::{Error, Result};
use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use serde_jsonlines::{append_json_lines, json_lines};
use std::path::{Path, PathBuf};

/// The stored outcome for a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub accepted: bool,
    /// The literal answer given by the operator, kept for audit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct Line {
    id: String,
    #[serde(flatten)]
    decision: Decision,
}

#[derive(Debug, Default)]
pub struct Cache {
    path: Option<PathBuf>,
    entries: AHashMap<String, Decision>,
}

impl Cache {
    /// Loads the decisions stored at `path`. A missing file is an empty cache; it is created on
    /// the first insert.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut entries = AHashMap::default();
        if path.exists() {
            let lines = json_lines::<Line, _>(&path).map_err(|e| Error::io(&path, e))?;
            for line in lines {
                let line = line.map_err(|e| Error::io(&path, e))?;
                entries.insert(line.id, line.decision);
            }
        }
        tracing::debug!(path = %path.display(), entries = entries.len(), "cache loaded");
        Ok(Cache {
            path: Some(path),
            entries,
        })
    }

    /// A cache that lives only for the current process.
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<&Decision> {
        self.entries.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Records a decision and appends it to the backing file.
    pub fn insert(&mut self, id: impl Into<String>, decision: Decision) -> Result<()> {
        let id = id.into();
        if let Some(path) = &self.path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
            }
            let line = Line {
                id: id.clone(),
                decision: decision.clone(),
            };
            append_json_lines(path, [&line]).map_err(|e| Error::io(path, e))?;
        }
        self.entries.insert(id, decision);
        Ok(())
    }
}
