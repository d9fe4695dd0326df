//! Catalog (DAT) parsing.
//!
//! Both syntaxes are first lowered into [`RawCatalog`] records made of plain
//! strings; a single validation pass then turns those into [`CatalogEntry`]
//! values, skipping malformed roms with a [`ParseWarning`] instead of failing.
//! The parser performs no file I/O: callers hand it bytes.

pub mod clrmamepro;
pub mod logiqx;
pub mod names;
pub mod writer;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::domain::{
    CatalogDocument, CatalogEntry, CatalogFormat, CatalogHeader, HashKind, Hashes, RomStatus,
};
use crate::error::ParseError;

/// Caller's hint about the document syntax.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FormatHint {
    #[default]
    Auto,
    Logiqx,
    ClrMamePro,
}

/// Non-fatal problem found while loading a catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParseWarning {
    /// A rom record could not be interpreted and was skipped.
    MalformedEntry {
        game: String,
        rom: String,
        reason: String,
    },
    /// A rom carries no digest and can never be matched.
    NoHash { game: String, rom: String },
    /// Two roms in the same catalog share identical digests and size.
    DuplicateKey { first: String, duplicate: String },
    /// The document ended in a syntax error; entries before it were kept.
    Truncated { reason: String, entries_read: usize },
}

/// One rom record as written in the document, before validation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawRom {
    pub game_name: String,
    /// Structured region field, when the format has one.
    pub game_region: Option<String>,
    pub game_languages: Option<String>,
    pub name: Option<String>,
    pub size: Option<String>,
    pub crc: Option<String>,
    pub md5: Option<String>,
    pub sha1: Option<String>,
    pub sha256: Option<String>,
    pub status: Option<String>,
}

/// Format-specific parse output shared by both syntaxes.
#[derive(Debug, Clone, Default)]
pub struct RawCatalog {
    pub header: CatalogHeader,
    pub roms: Vec<RawRom>,
    pub games_seen: usize,
    pub warnings: Vec<ParseWarning>,
}

/// Parse catalog bytes into a document. The returned document has an id
/// derived from its header (`name` + `version`) and `load_order` 0; the
/// collection assigns the final identity and load order.
pub fn parse(bytes: &[u8], hint: FormatHint) -> Result<CatalogDocument, ParseError> {
    let text = clean_content(bytes);

    let (format, raw) = match hint {
        FormatHint::Logiqx => (CatalogFormat::Logiqx, logiqx::parse(&text)?),
        FormatHint::ClrMamePro => (CatalogFormat::ClrMamePro, clrmamepro::parse(&text)?),
        FormatHint::Auto => match detect_format(&text) {
            CatalogFormat::ClrMamePro => (CatalogFormat::ClrMamePro, clrmamepro::parse(&text)?),
            CatalogFormat::Logiqx => match logiqx::parse(&text) {
                Ok(raw) => (CatalogFormat::Logiqx, raw),
                Err(xml_err) => match clrmamepro::parse(&text) {
                    Ok(raw) if !raw.roms.is_empty() => (CatalogFormat::ClrMamePro, raw),
                    _ => return Err(xml_err),
                },
            },
        },
    };

    let document = finalize(format, raw)?;
    tracing::debug!(
        catalog = %document.id,
        format = format.as_str(),
        entries = document.entries.len(),
        warnings = document.warnings.len(),
        "parsed catalog"
    );
    Ok(document)
}

/// Lossy UTF-8 decode with BOM and stray control characters removed.
pub fn clean_content(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    text.trim_start_matches('\u{feff}')
        .chars()
        .filter(|&c| !c.is_control() || matches!(c, '\n' | '\r' | '\t'))
        .collect()
}

/// XML when the first significant character opens a tag, clrmamepro otherwise.
pub fn detect_format(text: &str) -> CatalogFormat {
    if text.trim_start().starts_with('<') {
        CatalogFormat::Logiqx
    } else {
        CatalogFormat::ClrMamePro
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Validate a digest; CRCs written without leading zeros are padded.
fn normalize_digest(kind: HashKind, raw: &str) -> Result<String, String> {
    let digest = raw.trim().to_ascii_lowercase();
    if !digest.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(format!("{kind} `{raw}` is not hexadecimal"));
    }
    let expected = kind.hex_len();
    match digest.len() {
        n if n == expected => Ok(digest),
        n if kind == HashKind::Crc32 && n < expected => Ok(format!("{digest:0>8}")),
        n => Err(format!("{kind} `{raw}` has {n} digits, expected {expected}")),
    }
}

fn validate_rom(raw: &RawRom) -> Result<CatalogEntry, String> {
    let game_name = raw.game_name.trim().to_string();
    let rom_name = non_empty(&raw.name)
        .map(str::to_string)
        .unwrap_or_else(|| game_name.clone());
    if rom_name.is_empty() {
        return Err("rom has no name".to_string());
    }

    let size = match non_empty(&raw.size) {
        Some(s) => Some(
            s.parse::<u64>()
                .map_err(|_| format!("size `{s}` is not a number"))?,
        ),
        None => None,
    };

    let mut hashes = Hashes::default();
    for (kind, value) in [
        (HashKind::Crc32, &raw.crc),
        (HashKind::Md5, &raw.md5),
        (HashKind::Sha1, &raw.sha1),
        (HashKind::Sha256, &raw.sha256),
    ] {
        if let Some(v) = non_empty(value) {
            hashes.set(kind, normalize_digest(kind, v)?);
        }
    }

    let region = non_empty(&raw.game_region)
        .map(str::to_string)
        .unwrap_or_else(|| {
            let from_game = names::extract_region(&game_name);
            if from_game.is_empty() {
                names::extract_region(&rom_name)
            } else {
                from_game
            }
        });

    let languages = match non_empty(&raw.game_languages) {
        Some(list) => list
            .split(',')
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect(),
        None => names::extract_languages(&game_name),
    };

    Ok(CatalogEntry {
        game_name,
        rom_name,
        system: String::new(),
        region,
        languages,
        size,
        hashes,
        status: raw
            .status
            .as_deref()
            .map(RomStatus::from_str_loose)
            .unwrap_or_default(),
        source_catalog_id: String::new(),
    })
}

/// Shared post-parse validation pass for every input format.
pub fn finalize(format: CatalogFormat, raw: RawCatalog) -> Result<CatalogDocument, ParseError> {
    if raw.games_seen == 0 && raw.roms.is_empty() {
        return Err(ParseError::Malformed(
            "no game or machine entries found".to_string(),
        ));
    }

    let mut warnings = raw.warnings;
    let mut entries = Vec::with_capacity(raw.roms.len());
    let mut seen_keys: HashMap<(Hashes, Option<u64>), usize> = HashMap::new();

    for rom in &raw.roms {
        let entry = match validate_rom(rom) {
            Ok(entry) => entry,
            Err(reason) => {
                warnings.push(ParseWarning::MalformedEntry {
                    game: rom.game_name.clone(),
                    rom: rom.name.clone().unwrap_or_default(),
                    reason,
                });
                continue;
            }
        };

        if entry.is_matchable() {
            let key = (entry.hashes.clone(), entry.size);
            if let Some(&first) = seen_keys.get(&key) {
                let first: &CatalogEntry = &entries[first];
                warnings.push(ParseWarning::DuplicateKey {
                    first: first.rom_name.clone(),
                    duplicate: entry.rom_name.clone(),
                });
            } else {
                seen_keys.insert(key, entries.len());
            }
        } else {
            warnings.push(ParseWarning::NoHash {
                game: entry.game_name.clone(),
                rom: entry.rom_name.clone(),
            });
        }
        entries.push(entry);
    }

    if entries.is_empty() {
        return Err(if raw.roms.is_empty() {
            ParseError::Empty
        } else {
            ParseError::Malformed("no rom entry could be read".to_string())
        });
    }

    let id = match (raw.header.name.trim(), raw.header.version.trim()) {
        ("", _) => "unnamed".to_string(),
        (name, "") => name.to_string(),
        (name, version) => format!("{name} ({version})"),
    };

    let document = CatalogDocument {
        id: String::new(),
        format,
        header: raw.header,
        entries,
        load_order: 0,
        source_path: None,
        warnings,
        loaded_at: chrono::Utc::now(),
    };
    Ok(document.with_id(id))
}
