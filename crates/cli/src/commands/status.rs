use anyhow::Result;
use comfy_table::{presets::UTF8_FULL, Cell, Color, ContentArrangement, Table};
use romsmith_core::domain::CatalogEntry;
use romsmith_core::matching::Completeness;
use romsmith_core::Session;

pub(crate) fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    match bytes {
        b if b >= GB => format!("{:.1} GB", b as f64 / GB as f64),
        b if b >= MB => format!("{:.1} MB", b as f64 / MB as f64),
        b if b >= KB => format!("{:.1} KB", b as f64 / KB as f64),
        b => format!("{} B", b),
    }
}

pub(crate) fn format_ratio(c: &Completeness) -> String {
    format!("{:.1}%", c.ratio * 100.0)
}

fn ratio_color(c: &Completeness) -> Color {
    match c.ratio {
        r if r >= 1.0 => Color::Green,
        r if r >= 0.5 => Color::Yellow,
        _ => Color::Red,
    }
}

/// Group missing entries by catalog, keeping catalog order.
pub(crate) fn group_by_catalog<'a>(
    entries: &'a [CatalogEntry],
    only: Option<&str>,
) -> Vec<(&'a str, Vec<&'a CatalogEntry>)> {
    let mut groups: Vec<(&str, Vec<&CatalogEntry>)> = Vec::new();
    for entry in entries {
        let catalog = entry.source_catalog_id.as_str();
        if only.is_some_and(|o| o != catalog) {
            continue;
        }
        match groups.iter_mut().find(|(id, _)| *id == catalog) {
            Some((_, list)) => list.push(entry),
            None => groups.push((catalog, vec![entry])),
        }
    }
    groups
}

pub fn run(session: &Session) -> Result<()> {
    let state = session.state();
    let overall = session.overall_completeness();

    println!();
    println!("  Romsmith Status");
    println!("  ===============");
    println!();
    match &state.last_scan {
        Some(scan) => {
            let bytes: u64 = scan.report.identified.iter().map(|i| i.descriptor.size).sum();
            println!(
                "   Last scan:    {} ({})",
                scan.root.display(),
                scan.scanned_at.format("%Y-%m-%d %H:%M:%S")
            );
            println!(
                "   Identified:   {:>8}        Size:        {}",
                scan.report.identified.len(),
                format_size(bytes)
            );
            println!(
                "   Unidentified: {:>8}        Skipped:     {:>8}",
                scan.report.unidentified.len(),
                scan.skipped
            );
        }
        None => println!("   Last scan:    never"),
    }
    println!(
        "   Missing:      {:>8}        Complete:    {}",
        session.missing().len(),
        format_ratio(&overall)
    );
    println!(
        "   Undo history: {:>8} actions",
        state.action_log.pending_count()
    );

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("#"),
        Cell::new("Catalog"),
        Cell::new("Found"),
        Cell::new("Total"),
        Cell::new("Complete"),
    ]);
    for (catalog, (id, c)) in state.catalogs.iter().zip(session.completeness()) {
        table.add_row(vec![
            Cell::new(catalog.load_order),
            Cell::new(&id),
            Cell::new(c.found),
            Cell::new(c.total),
            Cell::new(format_ratio(&c)).fg(ratio_color(&c)),
        ]);
    }

    println!();
    println!("  Catalogs");
    println!("  --------");
    println!("{table}");
    println!();
    Ok(())
}

pub fn missing(session: &Session, catalog: Option<&str>) -> Result<()> {
    let groups = group_by_catalog(session.missing(), catalog);
    if groups.is_empty() {
        println!("Nothing missing.");
        return Ok(());
    }
    for (id, entries) in groups {
        println!();
        println!("  {id} ({} missing)", entries.len());
        for entry in entries {
            println!("    {}  [{}]", entry.rom_name, entry.game_name);
        }
    }
    println!();
    Ok(())
}

pub fn unidentified(session: &Session) -> Result<()> {
    let files = session.unidentified();
    if files.is_empty() {
        println!("Every scanned file was identified.");
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![Cell::new("Path"), Cell::new("Size"), Cell::new("CRC32")]);
    for file in files {
        table.add_row(vec![
            Cell::new(file.display_path()),
            Cell::new(format_size(file.size)),
            Cell::new(file.hashes.crc32.as_deref().unwrap_or("-")),
        ]);
    }
    println!("{table}");
    Ok(())
}
