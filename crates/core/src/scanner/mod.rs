//! Content scanner: walks a directory tree (and optionally into zip
//! containers) and yields one [`FileDescriptor`] per discovered file.
//!
//! [`scan`] returns a lazy iterator. Per-file failures come back as
//! [`ScanEvent::Skipped`] items in the same stream; only an inaccessible root
//! is fatal.

use std::collections::VecDeque;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use walkdir::WalkDir;

use crate::cancel::CancelToken;
use crate::domain::{FileDescriptor, HashKind, Hashes};
use crate::error::ScanError;
use crate::hasher;

/// Extensions that are never ROM content (documents, media, source code, databases).
pub const DEFAULT_EXCLUDED_EXTENSIONS: &[&str] = &[
    "txt", "md", "rtf", "pdf", "jpg", "jpeg", "png", "gif", "bmp", "webp", "svg", "ico", "mp3",
    "wav", "flac", "ogg", "mp4", "mkv", "avi", "mov", "doc", "docx", "xls", "xlsx", "ppt", "pptx",
    "json", "yaml", "yml", "xml", "html", "htm", "css", "js", "ts", "ini", "cfg", "conf", "log",
    "csv", "py", "pyw", "pyc", "c", "cpp", "h", "hpp", "java", "cs", "go", "rs", "exe", "dll",
    "bat", "cmd", "ps1", "msi", "lnk", "db", "sqlite", "sqlite3", "partial",
];

/// Which file names are considered for scanning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionPolicy {
    /// When set, only these extensions are scanned (lowercase, no dot).
    pub include: Option<Vec<String>>,
    pub exclude: Vec<String>,
}

impl Default for ExtensionPolicy {
    fn default() -> Self {
        Self {
            include: None,
            exclude: DEFAULT_EXCLUDED_EXTENSIONS
                .iter()
                .map(|e| e.to_string())
                .collect(),
        }
    }
}

impl ExtensionPolicy {
    /// Accept everything.
    pub fn all() -> Self {
        Self {
            include: None,
            exclude: Vec::new(),
        }
    }

    /// Extension-less names are always accepted unless an include list is set.
    pub fn allows(&self, name: &str) -> bool {
        let ext = extension_of(name);
        if let Some(include) = &self.include {
            return ext.is_some_and(|e| include.iter().any(|i| i.eq_ignore_ascii_case(&e)));
        }
        match ext {
            Some(e) => !self.exclude.iter().any(|x| x.eq_ignore_ascii_case(&e)),
            None => true,
        }
    }
}

fn extension_of(name: &str) -> Option<String> {
    let file = name.rsplit(['/', '\\']).next().unwrap_or(name);
    match file.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => Some(ext.to_ascii_lowercase()),
        _ => None,
    }
}

fn is_zip(path: &Path) -> bool {
    path.extension()
        .is_some_and(|e| e.eq_ignore_ascii_case("zip"))
}

#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub recursive: bool,
    /// Look inside `.zip` files instead of hashing the archive itself.
    pub recurse_archives: bool,
    /// Digests to compute in addition to CRC32.
    pub hash_kinds: Vec<HashKind>,
    pub extensions: ExtensionPolicy,
    pub follow_links: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            recursive: true,
            recurse_archives: true,
            hash_kinds: Vec::new(),
            extensions: ExtensionPolicy::default(),
            follow_links: false,
        }
    }
}

impl ScanOptions {
    fn needs_content_hash(&self) -> bool {
        self.hash_kinds.iter().any(|k| *k != HashKind::Crc32)
    }
}

/// One item of the scan stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanEvent {
    File(FileDescriptor),
    /// A file or container entry that could not be read. The scan continues.
    Skipped {
        path: PathBuf,
        container_path: Option<String>,
        reason: String,
    },
}

impl ScanEvent {
    fn skipped(path: &Path, container_path: Option<&str>, reason: impl ToString) -> Self {
        ScanEvent::Skipped {
            path: path.to_path_buf(),
            container_path: container_path.map(str::to_string),
            reason: reason.to_string(),
        }
    }
}

fn check_root(root: &Path) -> Result<(), ScanError> {
    if !root.exists() {
        return Err(ScanError::RootNotFound(root.to_path_buf()));
    }
    if root.is_dir() {
        std::fs::read_dir(root).map_err(|source| ScanError::RootInaccessible {
            path: root.to_path_buf(),
            source,
        })?;
    }
    Ok(())
}

fn walker(root: &Path, options: &ScanOptions) -> walkdir::IntoIter {
    let mut walk = WalkDir::new(root)
        .follow_links(options.follow_links)
        .sort_by_file_name();
    if !options.recursive {
        walk = walk.max_depth(1);
    }
    walk.into_iter()
}

/// Walk result for one directory entry: a path to scan, an error to report, or nothing.
fn candidate(
    entry: walkdir::Result<walkdir::DirEntry>,
    options: &ScanOptions,
) -> Option<Result<PathBuf, ScanEvent>> {
    let entry = match entry {
        Ok(entry) => entry,
        Err(err) => {
            let path = err.path().map(Path::to_path_buf).unwrap_or_default();
            return Some(Err(ScanEvent::Skipped {
                path,
                container_path: None,
                reason: err.to_string(),
            }));
        }
    };
    if !entry.file_type().is_file() {
        return None;
    }
    let path = entry.into_path();
    if options.recurse_archives && is_zip(&path) {
        return Some(Ok(path));
    }
    let allowed = path
        .file_name()
        .is_some_and(|n| options.extensions.allows(&n.to_string_lossy()));
    allowed.then_some(Ok(path))
}

/// Produce every event for one walked path: one descriptor for a plain file,
/// one per entry for a container.
pub fn scan_path(path: &Path, options: &ScanOptions) -> Vec<ScanEvent> {
    if options.recurse_archives && is_zip(path) {
        return scan_zip(path, options);
    }
    match hasher::hash_file(path, &options.hash_kinds) {
        Ok((size, hashes)) => vec![ScanEvent::File(FileDescriptor {
            path: path.to_path_buf(),
            container_path: None,
            size,
            hashes,
        })],
        Err(err) => vec![ScanEvent::skipped(path, None, err)],
    }
}

fn scan_zip(path: &Path, options: &ScanOptions) -> Vec<ScanEvent> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(err) => return vec![ScanEvent::skipped(path, None, err)],
    };
    let mut archive = match zip::ZipArchive::new(BufReader::new(file)) {
        Ok(archive) => archive,
        Err(err) => return vec![ScanEvent::skipped(path, None, err)],
    };

    let mut events = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let mut entry = match archive.by_index(i) {
            Ok(entry) => entry,
            Err(err) => {
                events.push(ScanEvent::skipped(path, None, format!("entry #{i}: {err}")));
                continue;
            }
        };
        if entry.is_dir() {
            continue;
        }
        let inner = entry.name().to_string();
        if !options.extensions.allows(&inner) {
            continue;
        }

        let hashed = if options.needs_content_hash() {
            hasher::hash_reader(&mut entry, &options.hash_kinds)
        } else {
            // Central directory already carries CRC32 and size.
            Ok((
                entry.size(),
                Hashes::default().with(HashKind::Crc32, format!("{:08x}", entry.crc32())),
            ))
        };

        match hashed {
            Ok((size, hashes)) => events.push(ScanEvent::File(FileDescriptor {
                path: path.to_path_buf(),
                container_path: Some(inner),
                size,
                hashes,
            })),
            Err(err) => events.push(ScanEvent::skipped(path, Some(&inner), err)),
        }
    }
    tracing::trace!(archive = %path.display(), entries = events.len(), "scanned container");
    events
}

/// Lazy, single forward pass over a directory tree.
pub struct Scan {
    walk: walkdir::IntoIter,
    options: ScanOptions,
    cancel: CancelToken,
    pending: VecDeque<ScanEvent>,
}

impl Iterator for Scan {
    type Item = ScanEvent;

    fn next(&mut self) -> Option<ScanEvent> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(event);
            }
            if self.cancel.is_cancelled() {
                return None;
            }
            let entry = self.walk.next()?;
            match candidate(entry, &self.options) {
                Some(Ok(path)) => self.pending.extend(scan_path(&path, &self.options)),
                Some(Err(event)) => return Some(event),
                None => {}
            }
        }
    }
}

/// Start a scan. Fails only if `root` is missing or cannot be listed.
pub fn scan(root: &Path, options: ScanOptions, cancel: CancelToken) -> Result<Scan, ScanError> {
    check_root(root)?;
    tracing::debug!(root = %root.display(), kinds = ?options.hash_kinds, "starting scan");
    Ok(Scan {
        walk: walker(root, &options),
        options,
        cancel,
        pending: VecDeque::new(),
    })
}

/// Hash files on a bounded rayon pool. Events come back in walk order.
/// Files not yet started when `cancel` fires are left out.
pub fn scan_parallel(
    root: &Path,
    options: &ScanOptions,
    workers: Option<usize>,
    cancel: &CancelToken,
) -> Result<Vec<ScanEvent>, ScanError> {
    check_root(root)?;

    let mut walked: Vec<Result<PathBuf, ScanEvent>> = Vec::new();
    for entry in walker(root, options) {
        if let Some(item) = candidate(entry, options) {
            walked.push(item);
        }
    }

    let mut builder = rayon::ThreadPoolBuilder::new();
    if let Some(n) = workers {
        builder = builder.num_threads(n.max(1));
    }
    let pool = builder
        .build()
        .map_err(|e| ScanError::WorkerPool(e.to_string()))?;

    let per_path: Vec<Vec<ScanEvent>> = pool.install(|| {
        walked
            .into_par_iter()
            .map(|item| match item {
                Ok(path) if !cancel.is_cancelled() => scan_path(&path, options),
                Ok(_) => Vec::new(),
                Err(event) => vec![event],
            })
            .collect()
    });

    Ok(per_path.into_iter().flatten().collect())
}
