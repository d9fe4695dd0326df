//! Collection State: the serializable snapshot a frontend owns and persists.
//!
//! Holds catalog identities (not their entries), the last scan, the last
//! plan and the action log. Saving and loading are plain byte transforms.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{CatalogDocument, CatalogEntry, CatalogFormat, CatalogHeader, FileDescriptor};
use crate::error::Result;
use crate::matching::{Completeness, Identification, MatchReport};
use crate::organizer::{ActionRecord, OrganizePlan};

/// Identity of a loaded catalog, enough to reload it later.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogRef {
    pub id: String,
    pub load_order: u32,
    pub format: CatalogFormat,
    pub header: CatalogHeader,
    #[serde(default)]
    pub source_path: Option<PathBuf>,
    pub entry_count: usize,
    pub loaded_at: DateTime<Utc>,
}

impl From<&CatalogDocument> for CatalogRef {
    fn from(doc: &CatalogDocument) -> Self {
        Self {
            id: doc.id.clone(),
            load_order: doc.load_order,
            format: doc.format,
            header: doc.header.clone(),
            source_path: doc.source_path.clone(),
            entry_count: doc.entries.len(),
            loaded_at: doc.loaded_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanRecord {
    pub root: PathBuf,
    pub scanned_at: DateTime<Utc>,
    /// Files that could not be read.
    pub skipped: usize,
    /// The scan stopped early on request.
    #[serde(default)]
    pub cancelled: bool,
    pub report: MatchReport,
}

impl ScanRecord {
    /// Every scanned descriptor, identified ones first.
    pub fn descriptors(&self) -> impl Iterator<Item = &FileDescriptor> {
        self.report
            .identified
            .iter()
            .map(|i| &i.descriptor)
            .chain(self.report.unidentified.iter())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggedAction {
    #[serde(flatten)]
    pub record: ActionRecord,
    /// Reverted, or deliberately left in place, by an undo.
    #[serde(default)]
    pub undone: bool,
}

/// Records produced by one `execute` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutedBatch {
    pub id: u64,
    pub strategy_id: String,
    pub output_root: PathBuf,
    pub executed_at: DateTime<Utc>,
    pub actions: Vec<LoggedAction>,
}

impl ExecutedBatch {
    pub fn has_pending(&self) -> bool {
        self.actions.iter().any(|a| !a.undone)
    }

    /// Records still to undo, with their position in the batch.
    pub fn pending(&self) -> (Vec<usize>, Vec<ActionRecord>) {
        self.actions
            .iter()
            .enumerate()
            .filter(|(_, a)| !a.undone)
            .map(|(i, a)| (i, a.record.clone()))
            .unzip()
    }

    pub fn mark_undone(&mut self, positions: impl IntoIterator<Item = usize>) {
        for i in positions {
            if let Some(action) = self.actions.get_mut(i) {
                action.undone = true;
            }
        }
    }
}

/// Append-only log of executed actions, grouped by batch. Only `commit`
/// truncates it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionLog {
    pub batches: Vec<ExecutedBatch>,
    #[serde(default)]
    next_batch_id: u64,
}

impl ActionLog {
    /// Append the records of one execution. Empty executions add no batch.
    pub fn append(&mut self, plan: &OrganizePlan, records: Vec<ActionRecord>) -> Option<u64> {
        if records.is_empty() {
            return None;
        }
        let id = self.next_batch_id;
        self.next_batch_id += 1;
        self.batches.push(ExecutedBatch {
            id,
            strategy_id: plan.strategy_id.clone(),
            output_root: plan.output_root.clone(),
            executed_at: Utc::now(),
            actions: records
                .into_iter()
                .map(|record| LoggedAction { record, undone: false })
                .collect(),
        });
        Some(id)
    }

    /// Newest batch that still has something to undo.
    pub fn latest_pending_mut(&mut self) -> Option<&mut ExecutedBatch> {
        self.batches.iter_mut().rev().find(|b| b.has_pending())
    }

    pub fn pending_count(&self) -> usize {
        self.batches
            .iter()
            .flat_map(|b| &b.actions)
            .filter(|a| !a.undone)
            .count()
    }

    /// All records in execution order.
    pub fn records(&self) -> impl Iterator<Item = &ActionRecord> {
        self.batches.iter().flat_map(|b| b.actions.iter().map(|a| &a.record))
    }

    pub fn len(&self) -> usize {
        self.batches.iter().map(|b| b.actions.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    /// Drop every batch. Returns how many records were discarded.
    pub fn commit(&mut self) -> usize {
        let dropped = self.len();
        self.batches.clear();
        dropped
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollectionState {
    /// In load order.
    pub catalogs: Vec<CatalogRef>,
    #[serde(default)]
    pub next_load_order: u32,
    #[serde(default)]
    pub last_scan: Option<ScanRecord>,
    #[serde(default)]
    pub last_plan: Option<OrganizePlan>,
    #[serde(default)]
    pub action_log: ActionLog,
}

impl CollectionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    pub fn catalog(&self, id: &str) -> Option<&CatalogRef> {
        self.catalogs.iter().find(|c| c.id == id)
    }

    /// Give a freshly parsed document its load order and record it.
    /// Reloading an id keeps the order it was first loaded with.
    pub fn register_catalog(&mut self, mut doc: CatalogDocument) -> CatalogDocument {
        match self.catalogs.iter_mut().find(|c| c.id == doc.id) {
            Some(existing) => {
                doc.load_order = existing.load_order;
                *existing = CatalogRef::from(&doc);
            }
            None => {
                doc.load_order = self.next_load_order;
                self.next_load_order += 1;
                self.catalogs.push(CatalogRef::from(&doc));
            }
        }
        doc
    }

    pub fn remove_catalog(&mut self, id: &str) -> Option<CatalogRef> {
        let pos = self.catalogs.iter().position(|c| c.id == id)?;
        Some(self.catalogs.remove(pos))
    }

    pub fn catalog_by_path(&self, path: &Path) -> Option<&CatalogRef> {
        self.catalogs
            .iter()
            .find(|c| c.source_path.as_deref() == Some(path))
    }

    // ── Query views ──────────────────────────────────────────────────

    pub fn identified(&self) -> &[Identification] {
        self.last_scan
            .as_ref()
            .map(|s| s.report.identified.as_slice())
            .unwrap_or_default()
    }

    pub fn unidentified(&self) -> &[FileDescriptor] {
        self.last_scan
            .as_ref()
            .map(|s| s.report.unidentified.as_slice())
            .unwrap_or_default()
    }

    pub fn missing(&self) -> &[CatalogEntry] {
        self.last_scan
            .as_ref()
            .map(|s| s.report.missing.as_slice())
            .unwrap_or_default()
    }

    /// Per catalog, in load order. Catalogs never scanned against report
    /// zero found.
    pub fn completeness(&self) -> Vec<(String, Completeness)> {
        self.catalogs
            .iter()
            .map(|c| {
                let found = self
                    .last_scan
                    .as_ref()
                    .and_then(|s| s.report.completeness_of(&c.id));
                (c.id.clone(), found.unwrap_or(Completeness::new(c.entry_count, 0)))
            })
            .collect()
    }

    pub fn overall_completeness(&self) -> Completeness {
        let (total, found) = self
            .completeness()
            .iter()
            .fold((0, 0), |(t, f), (_, c)| (t + c.total, f + c.found));
        Completeness::new(total, found)
    }
}
