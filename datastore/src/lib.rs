#![deny(missing_docs)]

//! Durable keyed storage for per-election state and operator settings.
//!
//! Everything lives in a single human-inspectable JSON document:
//!
//! ```json
//! { "settings": { ... }, "elections": [ { "id": 1700000000, ... } ] }
//! ```
//!
//! Writes are atomic (temp file + rename) and a write is not considered
//! complete until flushed. The store assumes the process-wide single-writer
//! discipline enforced by the policy's in-progress guard; no cross-process
//! coordination is provided. Storage errors propagate to the caller; retry
//! is a policy-level concern.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::debug;

use esm_interface::{ElectionRecord, Settings};

mod merge;

pub use merge::merge_values;

#[derive(Debug, Default, Serialize, Deserialize)]
struct Document {
    #[serde(default)]
    settings: serde_json::Value,
    #[serde(default)]
    elections: Vec<ElectionRecord>,
}

/// The election-record and settings store backing the staking policy.
#[derive(Debug)]
pub struct Datastore {
    path: PathBuf,
    // Loaded lazily on first access, then authoritative for this process.
    cache: Mutex<Option<Document>>,
}

impl Datastore {
    /// Open a store at `path`. The file and its parent directories are
    /// created on the first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cache: Mutex::new(None),
        }
    }

    /// Load the election record for `id`. A miss yields a fresh record
    /// containing only the id; it is not persisted until the first
    /// [`set_election`](Self::set_election).
    pub fn election(&self, id: u32) -> anyhow::Result<ElectionRecord> {
        self.read(|doc| {
            doc.elections
                .iter()
                .find(|r| r.id == id)
                .cloned()
                .unwrap_or_else(|| ElectionRecord::new(id))
        })
    }

    /// The full ordered election history.
    pub fn elections(&self) -> anyhow::Result<Vec<ElectionRecord>> {
        self.read(|doc| doc.elections.clone())
    }

    /// Upsert a record by id. With `inc_stake`, the stored `stake` becomes
    /// `stored + incoming` instead of being overwritten (absent on both
    /// sides stays absent); every other field overwrites. Returns the stored
    /// record.
    pub fn set_election(
        &self,
        record: ElectionRecord,
        inc_stake: bool,
    ) -> anyhow::Result<ElectionRecord> {
        self.write(|doc| {
            let stored = match doc.elections.iter_mut().rfind(|r| r.id == record.id) {
                Some(slot) => {
                    let mut updated = record;
                    if inc_stake {
                        updated.stake = match (slot.stake, updated.stake) {
                            (None, None) => None,
                            (prior, incoming) => {
                                Some(prior.unwrap_or(0) + incoming.unwrap_or(0))
                            }
                        };
                    }
                    *slot = updated;
                    slot.clone()
                }
                None => {
                    doc.elections.push(record);
                    doc.elections.last().expect("just pushed").clone()
                }
            };
            Ok(stored)
        })
    }

    /// Current settings, with defaults filling anything the document does
    /// not carry yet. A settings object that no longer matches the schema is
    /// an error, not a silent reset.
    pub fn settings(&self) -> anyhow::Result<Settings> {
        let stored = self.read(|doc| doc.settings.clone())?;
        if stored.is_null() {
            return Ok(Settings::default());
        }
        serde_json::from_value(stored).context("stored settings document failed validation")
    }

    /// Recursive defaults-merge of `partial` into the stored settings:
    /// incoming values win, existing values fill gaps. The merged document is
    /// persisted and returned.
    pub fn merge_settings(&self, partial: serde_json::Value) -> anyhow::Result<Settings> {
        self.write(|doc| {
            let merged = merge_values(partial, doc.settings.take());
            let settings: Settings = serde_json::from_value(merged)
                .context("merged settings document failed validation")?;
            doc.settings = serde_json::to_value(&settings)?;
            Ok(settings)
        })
    }

    /// Get or set the "sit out the next elections" flag.
    pub fn skip_next_elections(&self, value: Option<bool>) -> anyhow::Result<bool> {
        match value {
            None => Ok(self.settings()?.skip_next_elections),
            Some(skip) => {
                let updated =
                    self.merge_settings(serde_json::json!({ "skipNextElections": skip }))?;
                Ok(updated.skip_next_elections)
            }
        }
    }

    /// Get or set the operator's next-stake-size override (whole tokens).
    pub fn next_stake_size(&self, value: Option<u64>) -> anyhow::Result<Option<u64>> {
        match value {
            None => Ok(self.settings()?.next_stake_size),
            Some(size) => {
                let updated = self.merge_settings(serde_json::json!({ "nextStakeSize": size }))?;
                Ok(updated.next_stake_size)
            }
        }
    }

    fn read<T>(&self, op: impl FnOnce(&Document) -> T) -> anyhow::Result<T> {
        let mut cache = self.cache.lock().expect("datastore lock poisoned");
        let doc = self.loaded(&mut cache)?;
        Ok(op(doc))
    }

    fn write<T>(&self, op: impl FnOnce(&mut Document) -> anyhow::Result<T>) -> anyhow::Result<T> {
        let mut cache = self.cache.lock().expect("datastore lock poisoned");
        self.loaded(&mut cache)?;
        let doc = cache.as_mut().expect("loaded above");
        let result = op(doc)?;
        persist(&self.path, doc)?;
        Ok(result)
    }

    fn loaded<'a>(&self, cache: &'a mut Option<Document>) -> anyhow::Result<&'a mut Document> {
        if cache.is_none() {
            *cache = Some(load(&self.path)?);
        }
        Ok(cache.as_mut().expect("populated above"))
    }
}

fn load(path: &Path) -> anyhow::Result<Document> {
    match fs::read(path) {
        Ok(bytes) if bytes.is_empty() => Ok(Document::default()),
        Ok(bytes) => serde_json::from_slice(&bytes)
            .with_context(|| format!("corrupt datastore document at {}", path.display())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "no datastore document yet, starting empty");
            Ok(Document::default())
        }
        Err(e) => Err(e).with_context(|| format!("failed to read {}", path.display())),
    }
}

fn persist(path: &Path, doc: &Document) -> anyhow::Result<()> {
    let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
    if let Some(dir) = dir {
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create datastore dir {}", dir.display()))?;
    }

    let mut tmp = tempfile::NamedTempFile::new_in(dir.unwrap_or_else(|| Path::new(".")))
        .context("failed to create datastore temp file")?;
    serde_json::to_writer_pretty(&mut tmp, doc)?;
    tmp.flush()?;
    tmp.persist(path)
        .with_context(|| format!("failed to persist datastore document to {}", path.display()))?;
    Ok(())
}
