use std::path::Path;

use anyhow::Result;
use comfy_table::{presets::UTF8_FULL, Cell, ContentArrangement, Table};
use romsmith_core::dat::{writer, FormatHint};
use romsmith_core::error::Error;
use romsmith_core::store::Store;
use romsmith_core::Session;

pub fn add(session: &mut Session, store: &Store, path: &Path) -> Result<()> {
    let path = path.canonicalize()?;
    let doc = session.load_catalog_file(&path, FormatHint::Auto)?;
    store.record_dat(&doc, &path)?;

    let stats = doc.stats();
    println!(
        "Loaded {} ({}, {} entries, load order {})",
        doc.id,
        doc.format.as_str(),
        stats.total_entries,
        doc.load_order
    );
    if stats.unmatchable > 0 {
        println!("  {} entries have no hash and can never match", stats.unmatchable);
    }
    if !doc.warnings.is_empty() {
        println!("  {} warnings while parsing", doc.warnings.len());
    }
    Ok(())
}

pub fn rm(session: &mut Session, store: &Store, id: &str) -> Result<()> {
    let removed = session.unload_catalog(id)?;
    // The library row may already be gone; unloading is what matters.
    let _ = store.remove_dat(id);
    println!("Unloaded {} ({} entries)", removed.id, removed.entry_count);
    Ok(())
}

pub fn export(session: &Session, id: &str, output: &Path) -> Result<()> {
    let doc = session
        .catalog(id)
        .ok_or_else(|| Error::CatalogNotLoaded(id.to_string()))?;
    std::fs::write(output, writer::to_logiqx(doc))?;
    println!("Wrote {} entries to {}", doc.entries.len(), output.display());
    Ok(())
}

pub fn list(session: &Session) -> Result<()> {
    let catalogs = session.catalogs();
    if catalogs.is_empty() {
        println!("No catalogs loaded. Use `romsmith dat add <path>` to load one.");
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("#"),
        Cell::new("ID"),
        Cell::new("Format"),
        Cell::new("Entries"),
        Cell::new("Version"),
        Cell::new("Path"),
    ]);
    for doc in catalogs {
        table.add_row(vec![
            Cell::new(doc.load_order),
            Cell::new(&doc.id),
            Cell::new(doc.format.as_str()),
            Cell::new(doc.entries.len()),
            Cell::new(&doc.header.version),
            Cell::new(
                doc.source_path
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default(),
            ),
        ]);
    }
    println!("{table}");
    Ok(())
}
