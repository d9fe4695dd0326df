//! Matching engine: one merged hash index over every loaded catalog, and
//! classification of scanned files against it.
//!
//! Precedence is fixed by catalog `load_order`: when a file matches entries
//! in several catalogs, the lowest load order wins and the losers are
//! recorded on the [`Identification`] as `shadowed`.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::domain::{CatalogDocument, CatalogEntry, FileDescriptor, HashKind, Hashes};

/// Position of an entry inside the index: catalog slot (in precedence order)
/// and entry position within that catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryRef {
    pub catalog: usize,
    pub entry: usize,
}

/// Entries inside one catalog that share identical digests and size.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmbiguousKey {
    pub catalog_id: String,
    pub hashes: Hashes,
    pub size: Option<u64>,
    pub rom_names: Vec<String>,
}

/// Merged, read-only lookup structure over all loaded catalogs.
#[derive(Debug, Clone, Default)]
pub struct HashIndex {
    catalogs: Vec<Arc<CatalogDocument>>,
    by_kind: HashMap<HashKind, HashMap<String, Vec<EntryRef>>>,
    required: BTreeSet<HashKind>,
    ambiguous: Vec<AmbiguousKey>,
    indexed: usize,
}

/// Build the merged index. Input order does not matter; catalogs are ranked by
/// `load_order` (then id) so lookups are deterministic.
pub fn build_index(catalogs: &[Arc<CatalogDocument>]) -> HashIndex {
    HashIndex::build(catalogs)
}

impl HashIndex {
    pub fn build(catalogs: &[Arc<CatalogDocument>]) -> Self {
        let mut ranked: Vec<Arc<CatalogDocument>> = catalogs.to_vec();
        ranked.sort_by(|a, b| a.load_order.cmp(&b.load_order).then_with(|| a.id.cmp(&b.id)));

        let mut index = HashIndex::default();
        for (catalog, doc) in ranked.iter().enumerate() {
            let mut same_key: HashMap<(&Hashes, Option<u64>), Vec<usize>> = HashMap::new();

            for (entry, rom) in doc.entries.iter().enumerate() {
                if !rom.is_matchable() {
                    continue;
                }
                let slot = EntryRef { catalog, entry };
                for (kind, digest) in rom.hashes.iter() {
                    index
                        .by_kind
                        .entry(kind)
                        .or_default()
                        .entry(digest.to_string())
                        .or_default()
                        .push(slot);
                    if kind != HashKind::Crc32 {
                        index.required.insert(kind);
                    }
                }
                same_key.entry((&rom.hashes, rom.size)).or_default().push(entry);
                index.indexed += 1;
            }

            let mut dupes: Vec<Vec<usize>> = same_key
                .into_values()
                .filter(|positions| positions.len() > 1)
                .collect();
            dupes.sort();
            for positions in dupes {
                let first = &doc.entries[positions[0]];
                index.ambiguous.push(AmbiguousKey {
                    catalog_id: doc.id.clone(),
                    hashes: first.hashes.clone(),
                    size: first.size,
                    rom_names: positions
                        .iter()
                        .map(|&p| doc.entries[p].rom_name.clone())
                        .collect(),
                });
            }
        }
        index.catalogs = ranked;

        tracing::debug!(
            catalogs = index.catalogs.len(),
            entries = index.indexed,
            ambiguous = index.ambiguous.len(),
            "built hash index"
        );
        index
    }

    /// Catalogs in precedence order.
    pub fn catalogs(&self) -> &[Arc<CatalogDocument>] {
        &self.catalogs
    }

    pub fn entry(&self, at: EntryRef) -> &CatalogEntry {
        &self.catalogs[at.catalog].entries[at.entry]
    }

    pub fn lookup(&self, kind: HashKind, digest: &str) -> &[EntryRef] {
        self.by_kind
            .get(&kind)
            .and_then(|m| m.get(&digest.to_ascii_lowercase()))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Digests beyond CRC32 that at least one indexed entry carries.
    pub fn required_kinds(&self) -> Vec<HashKind> {
        self.required.iter().copied().collect()
    }

    pub fn ambiguous_keys(&self) -> &[AmbiguousKey] {
        &self.ambiguous
    }

    /// Number of matchable entries indexed.
    pub fn len(&self) -> usize {
        self.indexed
    }

    pub fn is_empty(&self) -> bool {
        self.indexed == 0
    }

    /// Find the winning entry for a descriptor. Candidates from every hash
    /// kind the descriptor carries are pooled; the lowest catalog slot wins
    /// and hash strength only ranks entries inside that catalog.
    /// Size only disqualifies a candidate when both sides declare one.
    fn resolve(&self, descriptor: &FileDescriptor) -> Option<Resolution> {
        let mut candidates: BTreeSet<EntryRef> = BTreeSet::new();
        for (kind, digest) in descriptor.hashes.iter() {
            candidates.extend(self.lookup(kind, digest).iter().copied().filter(|&at| {
                let entry = self.entry(at);
                let size_ok = match entry.size {
                    Some(size) => size == descriptor.size,
                    None => true,
                };
                size_ok && entry.hashes.agrees_with(&descriptor.hashes)
            }));
        }

        let catalog = candidates.first()?.catalog;
        let ranked: Vec<(EntryRef, HashKind)> = candidates
            .iter()
            .filter(|c| c.catalog == catalog)
            .filter_map(|&c| shared_kind(&self.entry(c).hashes, &descriptor.hashes).map(|k| (c, k)))
            .collect();
        let (winner, kind) = ranked
            .iter()
            .copied()
            .min_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)))?;
        let same_catalog = ranked
            .iter()
            .filter(|(_, k)| *k == kind)
            .map(|(c, _)| *c)
            .collect();
        let mut shadowed: Vec<usize> = candidates
            .iter()
            .map(|c| c.catalog)
            .filter(|&c| c != catalog)
            .collect();
        shadowed.dedup();

        Some(Resolution {
            winner,
            kind,
            same_catalog,
            shadowed,
        })
    }

    fn identification(&self, descriptor: FileDescriptor, r: &Resolution) -> Identification {
        let doc = &self.catalogs[r.winner.catalog];
        Identification {
            descriptor,
            entry: self.entry(r.winner).clone(),
            catalog_id: doc.id.clone(),
            load_order: doc.load_order,
            matched_by: r.kind,
            shadowed: r
                .shadowed
                .iter()
                .map(|&c| self.catalogs[c].id.clone())
                .collect(),
            ambiguous: r.same_catalog.len() > 1,
        }
    }
}

/// Strongest hash kind both sides carry.
fn shared_kind(entry: &Hashes, descriptor: &Hashes) -> Option<HashKind> {
    HashKind::strongest_first().find(|&k| entry.get(k).is_some() && descriptor.get(k).is_some())
}

struct Resolution {
    winner: EntryRef,
    kind: HashKind,
    same_catalog: Vec<EntryRef>,
    shadowed: Vec<usize>,
}

/// A scanned file matched to exactly one catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identification {
    pub descriptor: FileDescriptor,
    pub entry: CatalogEntry,
    pub catalog_id: String,
    pub load_order: u32,
    /// Hash kind that produced the match.
    pub matched_by: HashKind,
    /// Lower-precedence catalogs that also contained a matching entry.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub shadowed: Vec<String>,
    /// The winning catalog holds several entries with this exact key.
    #[serde(default)]
    pub ambiguous: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MatchResult {
    Identified(Identification),
    Unidentified(FileDescriptor),
    Missing(CatalogEntry),
}

/// Classify one descriptor. Never yields `Missing`; that outcome is only
/// known once a whole scan has been observed (see [`Classifier`]).
pub fn classify(descriptor: &FileDescriptor, index: &HashIndex) -> MatchResult {
    match index.resolve(descriptor) {
        Some(r) => MatchResult::Identified(index.identification(descriptor.clone(), &r)),
        None => MatchResult::Unidentified(descriptor.clone()),
    }
}

/// Found/total counts for one catalog or for all of them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Completeness {
    pub total: usize,
    pub found: usize,
    pub missing: usize,
    /// found / total, 0.0 for an empty catalog.
    pub ratio: f64,
}

impl Completeness {
    pub fn new(total: usize, found: usize) -> Self {
        Self {
            total,
            found,
            missing: total.saturating_sub(found),
            ratio: if total == 0 {
                0.0
            } else {
                found as f64 / total as f64
            },
        }
    }
}

/// The three result partitions of a full scan.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchReport {
    pub identified: Vec<Identification>,
    pub unidentified: Vec<FileDescriptor>,
    pub missing: Vec<CatalogEntry>,
    /// Per catalog, in precedence order.
    pub completeness: Vec<(String, Completeness)>,
}

impl MatchReport {
    pub fn overall(&self) -> Completeness {
        let (total, found) = self
            .completeness
            .iter()
            .fold((0, 0), |(t, f), (_, c)| (t + c.total, f + c.found));
        Completeness::new(total, found)
    }

    pub fn completeness_of(&self, catalog_id: &str) -> Option<Completeness> {
        self.completeness
            .iter()
            .find(|(id, _)| id == catalog_id)
            .map(|(_, c)| *c)
    }

    pub fn missing_in<'a>(&'a self, catalog_id: &'a str) -> impl Iterator<Item = &'a CatalogEntry> {
        self.missing
            .iter()
            .filter(move |e| e.source_catalog_id == catalog_id)
    }
}

/// Borrowed view of the outcome of one observed file.
#[derive(Debug, Clone, Copy)]
pub enum Observed<'a> {
    Identified(&'a Identification),
    Unidentified(&'a FileDescriptor),
}

/// Classify-as-you-scan accumulator. Entries of the winning catalog that
/// share the matched key are all counted as found; entries in shadowed
/// catalogs are not.
pub struct Classifier<'a> {
    index: &'a HashIndex,
    hits: Vec<Vec<bool>>,
    identified: Vec<Identification>,
    unidentified: Vec<FileDescriptor>,
}

impl<'a> Classifier<'a> {
    pub fn new(index: &'a HashIndex) -> Self {
        Self {
            index,
            hits: index
                .catalogs
                .iter()
                .map(|doc| vec![false; doc.entries.len()])
                .collect(),
            identified: Vec::new(),
            unidentified: Vec::new(),
        }
    }

    pub fn observe(&mut self, descriptor: FileDescriptor) -> Observed<'_> {
        match self.index.resolve(&descriptor) {
            Some(r) => {
                for at in &r.same_catalog {
                    self.hits[at.catalog][at.entry] = true;
                }
                let identification = self.index.identification(descriptor, &r);
                self.identified.push(identification);
                Observed::Identified(&self.identified[self.identified.len() - 1])
            }
            None => {
                self.unidentified.push(descriptor);
                Observed::Unidentified(&self.unidentified[self.unidentified.len() - 1])
            }
        }
    }

    pub fn identified_count(&self) -> usize {
        self.identified.len()
    }

    pub fn unidentified_count(&self) -> usize {
        self.unidentified.len()
    }

    /// Single pass over every catalog entry to collect the missing set.
    pub fn finish(self) -> MatchReport {
        let mut missing = Vec::new();
        let mut completeness = Vec::with_capacity(self.index.catalogs.len());

        for (doc, hits) in self.index.catalogs.iter().zip(&self.hits) {
            let mut found = 0;
            for (entry, &hit) in doc.entries.iter().zip(hits) {
                if hit {
                    found += 1;
                } else {
                    missing.push(entry.clone());
                }
            }
            completeness.push((doc.id.clone(), Completeness::new(doc.entries.len(), found)));
        }

        MatchReport {
            identified: self.identified,
            unidentified: self.unidentified,
            missing,
            completeness,
        }
    }
}

/// Classify a finished batch of descriptors.
pub fn classify_all(
    descriptors: impl IntoIterator<Item = FileDescriptor>,
    index: &HashIndex,
) -> MatchReport {
    let mut classifier = Classifier::new(index);
    for d in descriptors {
        classifier.observe(d);
    }
    classifier.finish()
}
