pub mod cancel;
pub mod collection;
pub mod dat;
pub mod domain;
pub mod error;
pub mod hasher;
pub mod matching;
pub mod organizer;
pub mod scanner;
pub mod settings;
pub mod store;

use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub use cancel::CancelToken;
pub use collection::{CatalogRef, CollectionState, ScanRecord};
pub use error::{Error, Result};
pub use settings::Settings;

use dat::FormatHint;
use domain::{CatalogDocument, CatalogEntry, FileDescriptor, HashKind, Operation};
use matching::{
    Classifier, Completeness, HashIndex, Identification, MatchReport, MatchResult, Observed,
};
use organizer::{ActionOutcome, ExecuteOptions, ExecutionReport, OrganizePlan, Strategy, UndoReport};
use scanner::{ScanEvent, ScanOptions};

/// Callback events while a scan runs. Emitted as each file is classified.
#[derive(Debug, Clone)]
pub enum ScanProgress {
    Started { root: PathBuf, hash_kinds: Vec<HashKind> },
    Identified { path: String, game: String, catalog_id: String },
    Unidentified { path: String },
    Skipped { path: String, reason: String },
    Finished { identified: usize, unidentified: usize, missing: usize, cancelled: bool },
}

impl From<Observed<'_>> for ScanProgress {
    fn from(observed: Observed<'_>) -> Self {
        match observed {
            Observed::Identified(ident) => ScanProgress::Identified {
                path: ident.descriptor.display_path(),
                game: ident.entry.game_name.clone(),
                catalog_id: ident.catalog_id.clone(),
            },
            Observed::Unidentified(d) => ScanProgress::Unidentified {
                path: d.display_path(),
            },
        }
    }
}

fn is_catalog_name(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    lower.ends_with(".dat") || lower.ends_with(".xml")
}

/// Read a catalog file, looking inside `.zip` archives for the first
/// `.dat`/`.xml` member.
fn read_catalog_file(path: &Path) -> Result<Vec<u8>> {
    let zipped = path
        .extension()
        .is_some_and(|e| e.eq_ignore_ascii_case("zip"));
    if !zipped {
        return Ok(fs::read(path)?);
    }

    let mut archive = zip::ZipArchive::new(BufReader::new(File::open(path)?))?;
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        if !entry.is_dir() && is_catalog_name(entry.name()) {
            let mut bytes = Vec::with_capacity(entry.size() as usize);
            entry.read_to_end(&mut bytes)?;
            return Ok(bytes);
        }
    }
    Err(Error::NoCatalogInArchive(path.to_path_buf()))
}

/// One frontend session: the loaded catalogs plus the Collection State
/// they feed. Every frontend drives the core through this surface.
pub struct Session {
    state: CollectionState,
    /// In load order.
    documents: Vec<Arc<CatalogDocument>>,
    /// Rebuilt lazily after the catalog set changes.
    index: Option<Arc<HashIndex>>,
    settings: Settings,
}

impl Session {
    pub fn new(settings: Settings) -> Self {
        Self::restore(CollectionState::new(), settings)
    }

    /// Resume from a saved snapshot. Catalog entries are not part of the
    /// snapshot; call [`Session::reload_catalogs`] to read them back.
    pub fn restore(state: CollectionState, settings: Settings) -> Self {
        Self {
            state,
            documents: Vec::new(),
            index: None,
            settings,
        }
    }

    pub fn from_bytes(bytes: &[u8], settings: Settings) -> Result<Self> {
        Ok(Self::restore(CollectionState::from_bytes(bytes)?, settings))
    }

    pub fn save_state(&self) -> Result<Vec<u8>> {
        self.state.to_bytes()
    }

    pub fn state(&self) -> &CollectionState {
        &self.state
    }

    pub fn into_state(self) -> CollectionState {
        self.state
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn set_setting(&mut self, key: &str, value: &str) -> Result<()> {
        self.settings.set(key, value)
    }

    // ── Catalogs ─────────────────────────────────────────────────────

    /// Parse and activate a catalog. Loading an id that is already active
    /// replaces that catalog and keeps its load order.
    pub fn load_catalog_bytes(
        &mut self,
        bytes: &[u8],
        hint: FormatHint,
        source_path: Option<&Path>,
    ) -> Result<Arc<CatalogDocument>> {
        let doc = self.activate(bytes, hint, source_path)?;
        self.catalogs_changed();
        Ok(doc)
    }

    /// Load a `.dat`/`.xml` file, or a `.zip` holding one.
    pub fn load_catalog_file(
        &mut self,
        path: &Path,
        hint: FormatHint,
    ) -> Result<Arc<CatalogDocument>> {
        let bytes = read_catalog_file(path)?;
        self.load_catalog_bytes(&bytes, hint, Some(path))
    }

    fn activate(
        &mut self,
        bytes: &[u8],
        hint: FormatHint,
        source_path: Option<&Path>,
    ) -> Result<Arc<CatalogDocument>> {
        let mut doc = dat::parse(bytes, hint)?;
        if let Some(path) = source_path {
            if doc.header.name.trim().is_empty() {
                if let Some(stem) = path.file_stem() {
                    doc = doc.with_id(stem.to_string_lossy());
                }
            }
            doc.source_path = Some(path.to_path_buf());
        }
        let doc = Arc::new(self.state.register_catalog(doc));

        self.documents.retain(|d| d.id != doc.id);
        self.documents.push(Arc::clone(&doc));
        self.documents.sort_by_key(|d| d.load_order);
        self.index = None;

        tracing::debug!(
            catalog = %doc.id,
            load_order = doc.load_order,
            entries = doc.entries.len(),
            "loaded catalog"
        );
        Ok(doc)
    }

    pub fn unload_catalog(&mut self, id: &str) -> Result<CatalogRef> {
        let removed = self
            .state
            .remove_catalog(id)
            .ok_or_else(|| Error::CatalogNotLoaded(id.to_string()))?;
        self.documents.retain(|d| d.id != id);
        self.catalogs_changed();
        Ok(removed)
    }

    /// Re-read every catalog that has a source path, e.g. after
    /// [`Session::restore`]. The stored scan results are left as they were.
    /// Returns the catalogs that could not be read; those stay registered so
    /// their load order is kept.
    pub fn reload_catalogs(&mut self) -> Vec<(String, Error)> {
        let sources: Vec<(String, Option<PathBuf>)> = self
            .state
            .catalogs
            .iter()
            .map(|c| (c.id.clone(), c.source_path.clone()))
            .collect();

        let mut failures = Vec::new();
        for (id, path) in sources {
            let result = match path {
                Some(path) => read_catalog_file(&path)
                    .and_then(|bytes| self.activate(&bytes, FormatHint::Auto, Some(&path)))
                    .map(|_| ()),
                None => Err(Error::CatalogNotLoaded(id.clone())),
            };
            if let Err(err) = result {
                tracing::debug!(catalog = %id, error = %err, "could not reload catalog");
                failures.push((id, err));
            }
        }
        failures
    }

    pub fn catalogs(&self) -> &[Arc<CatalogDocument>] {
        &self.documents
    }

    pub fn catalog(&self, id: &str) -> Option<&Arc<CatalogDocument>> {
        self.documents.iter().find(|d| d.id == id)
    }

    fn catalogs_changed(&mut self) {
        self.index = None;
        if self.state.last_scan.is_some() {
            self.reclassify();
        }
    }

    /// The merged hash index over the active catalogs.
    pub fn index(&mut self) -> Arc<HashIndex> {
        let documents = &self.documents;
        Arc::clone(
            self.index
                .get_or_insert_with(|| Arc::new(HashIndex::build(documents))),
        )
    }

    // ── Scan & classify ──────────────────────────────────────────────

    /// Defaults from settings, hashing whatever the active catalogs need.
    pub fn scan_options(&mut self) -> ScanOptions {
        ScanOptions {
            recurse_archives: self.settings.scan_archives,
            hash_kinds: self.index().required_kinds(),
            ..ScanOptions::default()
        }
    }

    /// Scan `root` and classify as files are discovered. Hash kinds the
    /// active catalogs require are always added to `options`.
    pub fn scan(
        &mut self,
        root: &Path,
        options: ScanOptions,
        cancel: &CancelToken,
        mut progress: Option<&mut dyn FnMut(ScanProgress)>,
    ) -> Result<&ScanRecord> {
        let index = self.index();
        let options = with_required_kinds(options, &index);
        if let Some(cb) = progress.as_mut() {
            cb(ScanProgress::Started {
                root: root.to_path_buf(),
                hash_kinds: options.hash_kinds.clone(),
            });
        }

        let mut classifier = Classifier::new(&index);
        let mut skipped = 0;
        for event in scanner::scan(root, options, cancel.clone())? {
            match event {
                ScanEvent::File(descriptor) => {
                    let observed = classifier.observe(descriptor);
                    if let Some(cb) = progress.as_mut() {
                        cb(observed.into());
                    }
                }
                skip @ ScanEvent::Skipped { .. } => {
                    skipped += 1;
                    report_skip(skip, &mut progress);
                }
            }
        }

        let report = classifier.finish();
        Ok(self.record_scan(root, report, skipped, cancel.is_cancelled(), progress))
    }

    /// Like [`Session::scan`], but hashes on a bounded worker pool first
    /// and classifies afterwards (the callback is not `Send`).
    pub fn scan_parallel(
        &mut self,
        root: &Path,
        options: ScanOptions,
        cancel: &CancelToken,
        mut progress: Option<&mut dyn FnMut(ScanProgress)>,
    ) -> Result<&ScanRecord> {
        let index = self.index();
        let options = with_required_kinds(options, &index);
        if let Some(cb) = progress.as_mut() {
            cb(ScanProgress::Started {
                root: root.to_path_buf(),
                hash_kinds: options.hash_kinds.clone(),
            });
        }

        let events = scanner::scan_parallel(root, &options, self.settings.workers, cancel)?;

        let mut classifier = Classifier::new(&index);
        let mut skipped = 0;
        for event in events {
            match event {
                ScanEvent::File(descriptor) => {
                    let observed = classifier.observe(descriptor);
                    if let Some(cb) = progress.as_mut() {
                        cb(observed.into());
                    }
                }
                skip @ ScanEvent::Skipped { .. } => {
                    skipped += 1;
                    report_skip(skip, &mut progress);
                }
            }
        }

        let report = classifier.finish();
        Ok(self.record_scan(root, report, skipped, cancel.is_cancelled(), progress))
    }

    fn record_scan(
        &mut self,
        root: &Path,
        report: MatchReport,
        skipped: usize,
        cancelled: bool,
        mut progress: Option<&mut dyn FnMut(ScanProgress)>,
    ) -> &ScanRecord {
        tracing::debug!(
            root = %root.display(),
            identified = report.identified.len(),
            unidentified = report.unidentified.len(),
            missing = report.missing.len(),
            skipped,
            cancelled,
            "scan finished"
        );
        if let Some(cb) = progress.as_mut() {
            cb(ScanProgress::Finished {
                identified: report.identified.len(),
                unidentified: report.unidentified.len(),
                missing: report.missing.len(),
                cancelled,
            });
        }
        self.state.last_plan = None;
        self.state.last_scan.insert(ScanRecord {
            root: root.to_path_buf(),
            scanned_at: chrono::Utc::now(),
            skipped,
            cancelled,
            report,
        })
    }

    /// Classify one descriptor against the active catalogs.
    pub fn classify_file(&mut self, descriptor: &FileDescriptor) -> MatchResult {
        matching::classify(descriptor, &self.index())
    }

    /// Re-run classification of the last scan against the active catalogs.
    /// No file is read again.
    pub fn classify(&mut self) -> Result<&MatchReport> {
        if self.state.last_scan.is_none() {
            return Err(Error::NoScan);
        }
        self.reclassify();
        self.state
            .last_scan
            .as_ref()
            .map(|s| &s.report)
            .ok_or(Error::NoScan)
    }

    fn reclassify(&mut self) {
        let index = self.index();
        if let Some(scan) = self.state.last_scan.as_mut() {
            let descriptors: Vec<FileDescriptor> = scan.descriptors().cloned().collect();
            scan.report = matching::classify_all(descriptors, &index);
        }
    }

    // ── Organize ─────────────────────────────────────────────────────

    /// Compute and remember a plan for the identified files. No file is touched.
    pub fn plan(
        &mut self,
        strategy: &str,
        output_root: &Path,
        operation: Operation,
    ) -> Result<&OrganizePlan> {
        let strategy: Strategy = strategy.parse()?;
        let scan = self.state.last_scan.as_ref().ok_or(Error::NoScan)?;
        let plan = organizer::plan(
            &scan.report.identified,
            &strategy,
            output_root,
            operation,
            &self.settings.region_priority,
        );
        Ok(&*self.state.last_plan.insert(plan))
    }

    pub fn last_plan(&self) -> Option<&OrganizePlan> {
        self.state.last_plan.as_ref()
    }

    /// Execute the last plan, best effort, and append what was done to the
    /// action log. `&mut self` keeps executions on one session serialized.
    pub fn execute(
        &mut self,
        options: &ExecuteOptions,
        cancel: &CancelToken,
        progress: Option<&mut dyn FnMut(&ActionOutcome)>,
    ) -> Result<ExecutionReport> {
        let plan = self.state.last_plan.as_ref().ok_or(Error::NoPlan)?;
        let report = organizer::execute(plan, options, cancel, progress);
        self.state.action_log.append(plan, report.records.clone());
        Ok(report)
    }

    /// Undo the newest batch that still has unreverted actions. Actions that
    /// fail to revert stay in the log so a later undo can retry them.
    pub fn undo(&mut self) -> Result<UndoReport> {
        let batch = self
            .state
            .action_log
            .latest_pending_mut()
            .ok_or(Error::NothingToUndo)?;
        let (positions, records) = batch.pending();
        let report = organizer::undo(&records, Some(batch.output_root.as_path()));
        let settled: Vec<usize> = report.settled().map(|i| positions[i]).collect();
        batch.mark_undone(settled);
        Ok(report)
    }

    /// Forget the action log. Returns the number of records dropped.
    pub fn commit(&mut self) -> usize {
        let dropped = self.state.action_log.commit();
        tracing::debug!(dropped, "committed action log");
        dropped
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn identified(&self) -> &[Identification] {
        self.state.identified()
    }

    pub fn unidentified(&self) -> &[FileDescriptor] {
        self.state.unidentified()
    }

    pub fn missing(&self) -> &[CatalogEntry] {
        self.state.missing()
    }

    pub fn completeness(&self) -> Vec<(String, Completeness)> {
        self.state.completeness()
    }

    pub fn overall_completeness(&self) -> Completeness {
        self.state.overall_completeness()
    }
}

fn with_required_kinds(mut options: ScanOptions, index: &HashIndex) -> ScanOptions {
    for kind in index.required_kinds() {
        if !options.hash_kinds.contains(&kind) {
            options.hash_kinds.push(kind);
        }
    }
    options
}

fn report_skip(event: ScanEvent, progress: &mut Option<&mut dyn FnMut(ScanProgress)>) {
    let ScanEvent::Skipped {
        path,
        container_path,
        reason,
    } = event
    else {
        return;
    };
    let path = match container_path {
        Some(inner) => format!("{}|{}", path.display(), inner),
        None => path.display().to_string(),
    };
    tracing::debug!(%path, %reason, "skipped file");
    if let Some(cb) = progress.as_mut() {
        cb(ScanProgress::Skipped { path, reason });
    }
}
