use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::dat::ParseWarning;

/// Content hash algorithms understood by catalogs and the scanner.
/// Ordered from weakest to strongest; matching ranks entries of one catalog strongest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashKind {
    Crc32,
    Md5,
    Sha1,
    Sha256,
}

impl HashKind {
    pub const ALL: [HashKind; 4] = [
        HashKind::Crc32,
        HashKind::Md5,
        HashKind::Sha1,
        HashKind::Sha256,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HashKind::Crc32 => "crc32",
            HashKind::Md5 => "md5",
            HashKind::Sha1 => "sha1",
            HashKind::Sha256 => "sha256",
        }
    }

    /// Length of the lowercase hex digest.
    pub fn hex_len(&self) -> usize {
        match self {
            HashKind::Crc32 => 8,
            HashKind::Md5 => 32,
            HashKind::Sha1 => 40,
            HashKind::Sha256 => 64,
        }
    }

    /// Strongest-first iteration order.
    pub fn strongest_first() -> impl Iterator<Item = HashKind> {
        Self::ALL.into_iter().rev()
    }
}

impl fmt::Display for HashKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Hex digests keyed by hash kind. Digests are always stored lowercase.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Hashes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crc32: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub md5: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha1: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

impl Hashes {
    pub fn get(&self, kind: HashKind) -> Option<&str> {
        match kind {
            HashKind::Crc32 => self.crc32.as_deref(),
            HashKind::Md5 => self.md5.as_deref(),
            HashKind::Sha1 => self.sha1.as_deref(),
            HashKind::Sha256 => self.sha256.as_deref(),
        }
    }

    pub fn set(&mut self, kind: HashKind, digest: impl Into<String>) {
        let digest = Some(digest.into().to_ascii_lowercase());
        match kind {
            HashKind::Crc32 => self.crc32 = digest,
            HashKind::Md5 => self.md5 = digest,
            HashKind::Sha1 => self.sha1 = digest,
            HashKind::Sha256 => self.sha256 = digest,
        }
    }

    pub fn with(mut self, kind: HashKind, digest: impl Into<String>) -> Self {
        self.set(kind, digest);
        self
    }

    /// Present (kind, digest) pairs, weakest first.
    pub fn iter(&self) -> impl Iterator<Item = (HashKind, &str)> {
        HashKind::ALL
            .into_iter()
            .filter_map(move |kind| self.get(kind).map(|d| (kind, d)))
    }

    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }

    /// Strongest kind present, if any.
    pub fn strongest(&self) -> Option<(HashKind, &str)> {
        HashKind::strongest_first().find_map(|kind| self.get(kind).map(|d| (kind, d)))
    }

    /// True when every kind present on both sides carries the same digest.
    pub fn agrees_with(&self, other: &Hashes) -> bool {
        HashKind::ALL.into_iter().all(|kind| match (self.get(kind), other.get(kind)) {
            (Some(a), Some(b)) => a == b,
            _ => true,
        })
    }
}

/// On-disk syntax of a catalog document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CatalogFormat {
    Logiqx,
    ClrMamePro,
}

impl CatalogFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            CatalogFormat::Logiqx => "logiqx",
            CatalogFormat::ClrMamePro => "clrmamepro",
        }
    }
}

/// Dump status recorded by the catalog for a rom.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RomStatus {
    #[default]
    Verified,
    BadDump,
    NoDump,
}

impl RomStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RomStatus::Verified => "verified",
            RomStatus::BadDump => "baddump",
            RomStatus::NoDump => "nodump",
        }
    }

    pub fn from_str_loose(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "baddump" => RomStatus::BadDump,
            "nodump" => RomStatus::NoDump,
            _ => RomStatus::Verified,
        }
    }
}

/// One expected file within one loaded catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub game_name: String,
    pub rom_name: String,
    pub system: String,
    /// Empty when no recognised region token is present.
    pub region: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub languages: Vec<String>,
    pub size: Option<u64>,
    pub hashes: Hashes,
    #[serde(default)]
    pub status: RomStatus,
    pub source_catalog_id: String,
}

impl CatalogEntry {
    /// Entries without any digest can never be matched.
    pub fn is_matchable(&self) -> bool {
        !self.hashes.is_empty()
    }
}

/// Header metadata declared by a catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogHeader {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub homepage: String,
}

/// One loaded catalog. Immutable once parsed; replaced wholesale on reload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogDocument {
    pub id: String,
    pub format: CatalogFormat,
    pub header: CatalogHeader,
    pub entries: Vec<CatalogEntry>,
    pub load_order: u32,
    #[serde(default)]
    pub source_path: Option<PathBuf>,
    #[serde(default)]
    pub warnings: Vec<ParseWarning>,
    pub loaded_at: DateTime<Utc>,
}

impl CatalogDocument {
    /// Catalog-scoped grouping name used as the `system` of every entry.
    pub fn system_name(&self) -> &str {
        if !self.header.name.is_empty() {
            &self.header.name
        } else if !self.header.description.is_empty() {
            &self.header.description
        } else {
            &self.id
        }
    }

    /// Re-stamp the identity on the document and all of its entries.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        let system = self.system_name().to_string();
        for entry in &mut self.entries {
            entry.source_catalog_id = self.id.clone();
            entry.system = system.clone();
        }
        self
    }

    pub fn stats(&self) -> CatalogStats {
        let mut stats = CatalogStats {
            total_entries: self.entries.len(),
            ..CatalogStats::default()
        };
        for entry in &self.entries {
            let region = if entry.region.is_empty() { "Unknown" } else { entry.region.as_str() };
            *stats.by_region.entry(region.to_string()).or_default() += 1;
            for (kind, _) in entry.hashes.iter() {
                *stats.by_hash_kind.entry(kind).or_default() += 1;
            }
            if !entry.is_matchable() {
                stats.unmatchable += 1;
            }
        }
        stats
    }
}

/// Per-catalog summary counts for display.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogStats {
    pub total_entries: usize,
    pub unmatchable: usize,
    pub by_region: std::collections::BTreeMap<String, usize>,
    pub by_hash_kind: std::collections::BTreeMap<HashKind, usize>,
}

/// One scanned local file (or one entry inside a container).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileDescriptor {
    pub path: PathBuf,
    /// Inner entry path when the file lives inside an archive.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_path: Option<String>,
    pub size: u64,
    pub hashes: Hashes,
}

impl FileDescriptor {
    pub fn is_in_container(&self) -> bool {
        self.container_path.is_some()
    }

    /// Bare file name of the content, looking through containers.
    pub fn file_name(&self) -> String {
        match &self.container_path {
            Some(inner) => inner
                .rsplit(['/', '\\'])
                .next()
                .unwrap_or(inner)
                .to_string(),
            None => self
                .path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
        }
    }

    /// `archive.zip|inner/name.bin` for container entries, the plain path otherwise.
    pub fn display_path(&self) -> String {
        match &self.container_path {
            Some(inner) => format!("{}|{}", self.path.display(), inner),
            None => self.path.display().to_string(),
        }
    }

    pub fn source_path(&self) -> &Path {
        &self.path
    }
}

/// File operation applied by the organizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Copy,
    Move,
    /// Copy of an entry out of a container. Undone like a copy.
    Extract,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Copy => "copy",
            Operation::Move => "move",
            Operation::Extract => "extract",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
