use std::fmt::Write;

use quick_xml::escape::escape;

use crate::domain::{CatalogDocument, HashKind, RomStatus};

/// Serialize a document back to Logiqx XML. Consecutive entries that share a
/// game name, region and languages are written under one `<game>` element,
/// which carries the region and languages on a `<release>` child.
pub fn to_logiqx(doc: &CatalogDocument) -> String {
    let mut out = String::new();
    out.push_str("<?xml version=\"1.0\"?>\n<datafile>\n\t<header>\n");
    for (tag, value) in [
        ("name", &doc.header.name),
        ("description", &doc.header.description),
        ("version", &doc.header.version),
        ("author", &doc.header.author),
        ("homepage", &doc.header.homepage),
    ] {
        if !value.is_empty() {
            let _ = writeln!(out, "\t\t<{tag}>{}</{tag}>", escape(value.as_str()));
        }
    }
    out.push_str("\t</header>\n");

    let mut open_game: Option<(&str, &str, &[String])> = None;
    for entry in &doc.entries {
        let key = (
            entry.game_name.as_str(),
            entry.region.as_str(),
            entry.languages.as_slice(),
        );
        if open_game != Some(key) {
            if open_game.is_some() {
                out.push_str("\t</game>\n");
            }
            let _ = writeln!(out, "\t<game name=\"{}\">", escape(entry.game_name.as_str()));
            if !entry.region.is_empty() || !entry.languages.is_empty() {
                let _ = write!(
                    out,
                    "\t\t<release name=\"{}\"",
                    escape(entry.game_name.as_str())
                );
                if !entry.region.is_empty() {
                    let _ = write!(out, " region=\"{}\"", escape(entry.region.as_str()));
                }
                if !entry.languages.is_empty() {
                    let languages = entry.languages.join(",");
                    let _ = write!(out, " language=\"{}\"", escape(languages.as_str()));
                }
                out.push_str("/>\n");
            }
            open_game = Some(key);
        }

        let _ = write!(out, "\t\t<rom name=\"{}\"", escape(entry.rom_name.as_str()));
        if let Some(size) = entry.size {
            let _ = write!(out, " size=\"{size}\"");
        }
        for (kind, digest) in entry.hashes.iter() {
            let attr = match kind {
                HashKind::Crc32 => "crc",
                other => other.as_str(),
            };
            let _ = write!(out, " {attr}=\"{digest}\"");
        }
        if entry.status != RomStatus::Verified {
            let _ = write!(out, " status=\"{}\"", entry.status.as_str());
        }
        out.push_str("/>\n");
    }
    if open_game.is_some() {
        out.push_str("\t</game>\n");
    }
    out.push_str("</datafile>\n");
    out
}
