use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use romsmith_core::dat::FormatHint;
use romsmith_core::domain::Operation;
use romsmith_core::error::UndoError;
use romsmith_core::organizer::{ActionStatus, ExecuteOptions, Resolution, UndoStatus};
use romsmith_core::store::Store;
use romsmith_core::{hasher, CancelToken, Error, Session, Settings};

/// Write deterministic content seeded by `seed`; returns (path, size, crc32).
fn write_rom(dir: &Path, name: &str, seed: u8) -> (PathBuf, u64, String) {
    fs::create_dir_all(dir).unwrap();
    let path = dir.join(name);
    let data: Vec<u8> = (0..4096u32)
        .map(|i| (i as u8).wrapping_mul(seed).wrapping_add(seed))
        .collect();
    fs::write(&path, data).unwrap();
    let (size, hashes) = hasher::hash_file(&path, &[]).unwrap();
    (path, size, hashes.crc32.unwrap())
}

/// Logiqx document with one rom per game, named `<game>.nes`.
fn logiqx(name: &str, games: &[(&str, u64, &str)]) -> String {
    let mut xml = format!(
        "<?xml version=\"1.0\"?>\n<datafile>\n  <header>\n    <name>{name}</name>\n  </header>\n"
    );
    for (game, size, crc) in games {
        xml.push_str(&format!(
            "  <game name=\"{game}\">\n    <rom name=\"{game}.nes\" size=\"{size}\" crc=\"{crc}\"/>\n  </game>\n"
        ));
    }
    xml.push_str("</datafile>\n");
    xml
}

fn write_dat(dir: &Path, file: &str, contents: &str) -> PathBuf {
    fs::create_dir_all(dir).unwrap();
    let path = dir.join(file);
    fs::write(&path, contents).unwrap();
    path
}

fn scan(session: &mut Session, root: &Path) {
    let options = session.scan_options();
    session
        .scan(root, options, &CancelToken::new(), None)
        .unwrap();
}

fn run_plan(session: &mut Session) -> romsmith_core::organizer::ExecutionReport {
    session
        .execute(&ExecuteOptions::default(), &CancelToken::new(), None)
        .unwrap()
}

// ── Identification ───────────────────────────────────────────────

#[test]
fn test_1g1r_keeps_usa_and_reports_europe_missing() {
    let tmp = tempfile::tempdir().unwrap();
    let (_, size, crc) = write_rom(&tmp.path().join("roms"), "smb.nes", 7);
    let dat = write_dat(
        &tmp.path().join("dats"),
        "nes.dat",
        &logiqx(
            "Nintendo - NES",
            &[
                ("Super Mario Bros (USA)", size, &crc),
                ("Super Mario Bros (Europe)", size, "bbbbbbbb"),
            ],
        ),
    );

    let mut session = Session::new(Settings::default());
    session.load_catalog_file(&dat, FormatHint::Auto).unwrap();
    scan(&mut session, &tmp.path().join("roms"));

    assert_eq!(session.identified().len(), 1);
    assert_eq!(session.identified()[0].entry.game_name, "Super Mario Bros (USA)");
    assert!(session.unidentified().is_empty());
    assert_eq!(session.missing().len(), 1);
    assert_eq!(session.missing()[0].game_name, "Super Mario Bros (Europe)");

    let completeness = session.overall_completeness();
    assert_eq!((completeness.total, completeness.found), (2, 1));

    let plan = session
        .plan("1g1r", &tmp.path().join("out"), Operation::Copy)
        .unwrap();
    assert_eq!(plan.actions.len(), 1);
    assert_eq!(
        plan.actions[0].destination,
        tmp.path().join("out/Super Mario Bros (USA).nes")
    );
}

#[test]
fn test_lowest_load_order_wins() {
    let tmp = tempfile::tempdir().unwrap();
    let (_, size, crc) = write_rom(&tmp.path().join("roms"), "shared.nes", 3);
    let dats = tmp.path().join("dats");
    let a = write_dat(&dats, "a.dat", &logiqx("A", &[("Shared (USA)", size, &crc)]));
    let b = write_dat(&dats, "b.dat", &logiqx("B", &[("Shared (Japan)", size, &crc)]));

    let mut session = Session::new(Settings::default());
    session.load_catalog_file(&a, FormatHint::Auto).unwrap();
    session.load_catalog_file(&b, FormatHint::Auto).unwrap();
    scan(&mut session, &tmp.path().join("roms"));

    let ident = &session.identified()[0];
    assert_eq!(ident.catalog_id, "A");
    assert_eq!(ident.shadowed, vec!["B".to_string()]);

    // B's entry was only shadowed, never matched.
    assert_eq!(session.missing().len(), 1);
    assert_eq!(session.missing()[0].source_catalog_id, "B");

    // Reloading A keeps its place ahead of B.
    session.load_catalog_file(&a, FormatHint::Auto).unwrap();
    assert_eq!(session.identified()[0].catalog_id, "A");
}

#[test]
fn test_unload_reclassifies_last_scan() {
    let tmp = tempfile::tempdir().unwrap();
    let (_, size, crc) = write_rom(&tmp.path().join("roms"), "game.nes", 5);
    let xml = logiqx("X", &[("Game (USA)", size, &crc)]);
    let dat = write_dat(&tmp.path().join("dats"), "x.dat", &xml);

    let mut session = Session::new(Settings::default());
    session.load_catalog_file(&dat, FormatHint::Auto).unwrap();
    scan(&mut session, &tmp.path().join("roms"));
    assert_eq!(session.identified().len(), 1);

    session.unload_catalog("X").unwrap();
    assert!(session.identified().is_empty());
    assert_eq!(session.unidentified().len(), 1);
    assert!(matches!(
        session.unload_catalog("X"),
        Err(Error::CatalogNotLoaded(_))
    ));
}

#[test]
fn test_zipped_dat_and_zipped_rom() {
    let tmp = tempfile::tempdir().unwrap();
    let (rom, size, crc) = write_rom(&tmp.path().join("staging"), "game.nes", 9);

    let roms = tmp.path().join("roms");
    fs::create_dir_all(&roms).unwrap();
    let archive = roms.join("game.zip");
    {
        let mut zip = zip::ZipWriter::new(fs::File::create(&archive).unwrap());
        let options = zip::write::SimpleFileOptions::default();
        zip.start_file("game.nes", options).unwrap();
        zip.write_all(&fs::read(&rom).unwrap()).unwrap();
        zip.finish().unwrap();
    }

    let dat_zip = tmp.path().join("nes.zip");
    {
        let mut zip = zip::ZipWriter::new(fs::File::create(&dat_zip).unwrap());
        let options = zip::write::SimpleFileOptions::default();
        zip.start_file("readme.txt", options).unwrap();
        zip.write_all(b"not a catalog").unwrap();
        zip.start_file("Nintendo - NES.dat", options).unwrap();
        zip.write_all(logiqx("Nintendo - NES", &[("Game (USA)", size, &crc)]).as_bytes())
            .unwrap();
        zip.finish().unwrap();
    }

    let mut session = Session::new(Settings::default());
    let doc = session.load_catalog_file(&dat_zip, FormatHint::Auto).unwrap();
    assert_eq!(doc.entries.len(), 1);
    scan(&mut session, &roms);

    let ident = &session.identified()[0];
    assert_eq!(ident.descriptor.container_path.as_deref(), Some("game.nes"));

    let out = tmp.path().join("out");
    let plan = session.plan("system", &out, Operation::Move).unwrap();
    assert_eq!(plan.actions[0].operation, Operation::Extract);

    let report = run_plan(&mut session);
    assert_eq!(report.done(), 1);
    let dest = out.join("Nintendo - NES/Game (USA).nes");
    assert_eq!(fs::read(&dest).unwrap(), fs::read(&rom).unwrap());
    assert!(archive.exists());

    let undo = session.undo().unwrap();
    assert_eq!(undo.reverted(), 1);
    assert!(!dest.exists());
    assert!(!out.join("Nintendo - NES").exists());
}

#[test]
fn test_zip_without_catalog_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("empty.zip");
    {
        let mut zip = zip::ZipWriter::new(fs::File::create(&path).unwrap());
        zip.start_file("notes.txt", zip::write::SimpleFileOptions::default())
            .unwrap();
        zip.write_all(b"hello").unwrap();
        zip.finish().unwrap();
    }
    let mut session = Session::new(Settings::default());
    assert!(matches!(
        session.load_catalog_file(&path, FormatHint::Auto),
        Err(Error::NoCatalogInArchive(_))
    ));
}

#[test]
fn test_scan_missing_root_is_fatal() {
    let tmp = tempfile::tempdir().unwrap();
    let mut session = Session::new(Settings::default());
    let options = session.scan_options();
    let result = session.scan(&tmp.path().join("nope"), options, &CancelToken::new(), None);
    assert!(matches!(result, Err(Error::Scan(_))));
}

#[test]
fn test_parallel_scan_matches_sequential() {
    let tmp = tempfile::tempdir().unwrap();
    let roms = tmp.path().join("roms");
    let mut games = Vec::new();
    let names = ["A (USA)", "B (USA)", "C (Europe)", "D (Japan)"];
    for (i, game) in names.iter().enumerate() {
        let (_, size, crc) = write_rom(&roms, &format!("{i}.nes"), i as u8 + 1);
        games.push((*game, size, crc));
    }
    write_rom(&roms, "stranger.nes", 200);
    let refs: Vec<(&str, u64, &str)> = games.iter().map(|(g, s, c)| (*g, *s, c.as_str())).collect();
    let dat = write_dat(&tmp.path().join("dats"), "x.dat", &logiqx("X", &refs));

    let mut session = Session::new(Settings::default());
    session.load_catalog_file(&dat, FormatHint::Auto).unwrap();
    scan(&mut session, &roms);
    let sequential = session.state().last_scan.clone().unwrap().report;

    let mut events = 0;
    let options = session.scan_options();
    session
        .scan_parallel(&roms, options, &CancelToken::new(), Some(&mut |_| events += 1))
        .unwrap();
    let parallel = &session.state().last_scan.as_ref().unwrap().report;

    assert_eq!(&sequential, parallel);
    assert_eq!(parallel.identified.len(), 4);
    assert_eq!(parallel.unidentified.len(), 1);
    // started + 5 files + finished
    assert_eq!(events, 7);
}

// ── Organize & undo ──────────────────────────────────────────────

#[test]
fn test_modified_copy_survives_undo() {
    let tmp = tempfile::tempdir().unwrap();
    let roms = tmp.path().join("roms");
    let (_, s1, c1) = write_rom(&roms, "one.nes", 11);
    let (_, s2, c2) = write_rom(&roms, "two.nes", 13);
    let dat = write_dat(
        &tmp.path().join("dats"),
        "x.dat",
        &logiqx("X", &[("One (USA)", s1, &c1), ("Two (Europe)", s2, &c2)]),
    );

    let mut session = Session::new(Settings::default());
    session.load_catalog_file(&dat, FormatHint::Auto).unwrap();
    scan(&mut session, &roms);

    let out = tmp.path().join("out");
    session.plan("region", &out, Operation::Copy).unwrap();
    let report = run_plan(&mut session);
    assert_eq!(report.done(), 2);

    let modified = out.join("USA/One (USA).nes");
    let untouched = out.join("Europe/Two (Europe).nes");
    let mut contents = fs::read(&modified).unwrap();
    contents[0] ^= 0xff;
    fs::write(&modified, &contents).unwrap();

    let undo = session.undo().unwrap();
    assert_eq!(undo.reverted(), 1);
    assert_eq!(undo.failed(), 1);
    let failed = undo
        .steps
        .iter()
        .find(|s| s.destination == modified)
        .unwrap();
    assert_eq!(
        failed.status,
        UndoStatus::Failed {
            error: UndoError::ContentModified {
                path: modified.clone()
            }
        }
    );
    assert!(modified.exists());
    assert!(!untouched.exists());
    assert!(roms.join("one.nes").exists());

    // The failed step stays pending; restoring the content lets it revert.
    contents[0] ^= 0xff;
    fs::write(&modified, &contents).unwrap();
    let retry = session.undo().unwrap();
    assert_eq!(retry.reverted(), 1);
    assert!(!out.join("USA").exists());
    assert!(matches!(session.undo(), Err(Error::NothingToUndo)));
}

#[test]
fn test_move_and_undo_restores_sources() {
    let tmp = tempfile::tempdir().unwrap();
    let roms = tmp.path().join("roms");
    let (src, size, crc) = write_rom(&roms.join("nested"), "zelda.nes", 21);
    let dat = write_dat(
        &tmp.path().join("dats"),
        "nes.dat",
        &logiqx(
            "Nintendo - Nintendo Entertainment System",
            &[("Zelda: Link? (USA)", size, &crc)],
        ),
    );

    let mut session = Session::new(Settings::default());
    session.load_catalog_file(&dat, FormatHint::Auto).unwrap();
    scan(&mut session, &roms);

    let out = tmp.path().join("out");
    let plan = session
        .plan("emulationstation", &out, Operation::Move)
        .unwrap();
    let dest = out.join("roms/nes/Zelda_ Link_ (USA).nes");
    assert_eq!(plan.actions[0].destination, dest);

    let report = run_plan(&mut session);
    assert_eq!(report.done(), 1);
    assert!(!src.exists());
    assert!(dest.exists());

    let undo = session.undo().unwrap();
    assert_eq!(undo.reverted(), 1);
    assert!(src.exists());
    assert!(!out.join("roms").exists());
}

#[test]
fn test_conflicts_block_until_resolved() {
    let tmp = tempfile::tempdir().unwrap();
    let roms = tmp.path().join("roms");
    let (a, size, crc) = write_rom(&roms, "a.nes", 31);
    fs::copy(&a, roms.join("b.nes")).unwrap();
    let xml = logiqx("X", &[("Dup (USA)", size, &crc)]);
    let dat = write_dat(&tmp.path().join("dats"), "x.dat", &xml);

    let mut session = Session::new(Settings::default());
    session.load_catalog_file(&dat, FormatHint::Auto).unwrap();
    scan(&mut session, &roms);
    let out = tmp.path().join("out");
    let plan = session.plan("flat", &out, Operation::Copy).unwrap().clone();
    assert_eq!(plan.conflicts.len(), 1);

    let blocked = run_plan(&mut session);
    assert_eq!(blocked.failed(), 2);
    assert!(blocked.records.is_empty());
    assert!(matches!(
        blocked.outcomes[0].status,
        ActionStatus::Failed { .. }
    ));

    let options = ExecuteOptions::resolve_all(&plan, Resolution::Rename);
    let report = session
        .execute(&options, &CancelToken::new(), None)
        .unwrap();
    assert_eq!(report.done(), 2);
    assert!(out.join("Dup (USA).nes").exists());
    assert!(out.join("Dup (USA)_1.nes").exists());
}

#[test]
fn test_plan_is_idempotent() {
    let tmp = tempfile::tempdir().unwrap();
    let roms = tmp.path().join("roms");
    let (_, s1, c1) = write_rom(&roms, "1.nes", 41);
    let (_, s2, c2) = write_rom(&roms, "2.nes", 43);
    let dat = write_dat(
        &tmp.path().join("dats"),
        "x.dat",
        &logiqx("X", &[("Alpha (USA)", s1, &c1), ("beta (Japan)", s2, &c2)]),
    );

    let mut session = Session::new(Settings::default());
    session.load_catalog_file(&dat, FormatHint::Auto).unwrap();
    scan(&mut session, &roms);

    let out = tmp.path().join("out");
    let first = session
        .plan("system+alphabetical", &out, Operation::Copy)
        .unwrap()
        .clone();
    let second = session
        .plan("system+alphabetical", &out, Operation::Copy)
        .unwrap()
        .clone();
    assert_eq!(first.actions, second.actions);
    assert_eq!(first.conflicts, second.conflicts);
    assert_eq!(first.actions[0].destination, out.join("X/A/Alpha (USA).nes"));
    assert_eq!(first.actions[1].destination, out.join("X/B/beta (Japan).nes"));
    assert!(!out.exists());

    assert!(matches!(
        session.plan("by-colour", &out, Operation::Copy),
        Err(Error::UnknownStrategy(_))
    ));
}

#[test]
fn test_execute_and_undo_preconditions() {
    let mut session = Session::new(Settings::default());
    assert!(matches!(
        session.execute(&ExecuteOptions::default(), &CancelToken::new(), None),
        Err(Error::NoPlan)
    ));
    assert!(matches!(session.undo(), Err(Error::NothingToUndo)));
    assert!(matches!(session.classify(), Err(Error::NoScan)));
    assert!(matches!(
        session.plan("flat", Path::new("/out"), Operation::Copy),
        Err(Error::NoScan)
    ));
}

// ── State persistence ────────────────────────────────────────────

#[test]
fn test_state_restore_then_undo() {
    let tmp = tempfile::tempdir().unwrap();
    let roms = tmp.path().join("roms");
    let (_, size, crc) = write_rom(&roms, "game.nes", 51);
    let xml = logiqx("X", &[("Game (USA)", size, &crc)]);
    let dat = write_dat(&tmp.path().join("dats"), "x.dat", &xml);
    let out = tmp.path().join("out");

    let bytes = {
        let mut session = Session::new(Settings::default());
        session.load_catalog_file(&dat, FormatHint::Auto).unwrap();
        scan(&mut session, &roms);
        session.plan("flat", &out, Operation::Copy).unwrap();
        run_plan(&mut session);
        session.save_state().unwrap()
    };

    let mut session = Session::from_bytes(&bytes, Settings::default()).unwrap();
    assert!(session.reload_catalogs().is_empty());
    assert_eq!(session.catalogs().len(), 1);
    assert_eq!(session.identified().len(), 1);
    assert_eq!(session.state().action_log.len(), 1);

    session.undo().unwrap();
    assert!(!out.join("Game (USA).nes").exists());
    assert_eq!(session.commit(), 1);
}

#[test]
fn test_collection_saved_in_store() {
    let tmp = tempfile::tempdir().unwrap();
    let roms = tmp.path().join("roms");
    let (_, size, crc) = write_rom(&roms, "game.nes", 61);
    let xml = logiqx("X", &[("Game (USA)", size, &crc)]);
    let dat = write_dat(&tmp.path().join("dats"), "x.dat", &xml);

    let store = Store::open(&tmp.path().join("db/library.db")).unwrap();
    let mut settings = Settings::load(&store).unwrap();
    settings.set("region_priority", "Japan,USA").unwrap();
    settings.save(&store).unwrap();

    let mut session = Session::new(Settings::load(&store).unwrap());
    let doc = session.load_catalog_file(&dat, FormatHint::Auto).unwrap();
    store.record_dat(&doc, &dat).unwrap();
    scan(&mut session, &roms);
    store.save_collection("default", session.state()).unwrap();

    let state = store.load_collection("default").unwrap();
    let mut restored = Session::restore(state, Settings::load(&store).unwrap());
    assert_eq!(restored.settings().region_priority, vec!["Japan", "USA"]);
    assert!(restored.reload_catalogs().is_empty());
    assert_eq!(restored.identified().len(), 1);
    assert_eq!(store.list_dats().unwrap()[0].id, "X");
}

#[test]
fn test_reload_reports_vanished_catalog() {
    let tmp = tempfile::tempdir().unwrap();
    let dat = write_dat(tmp.path(), "x.dat", &logiqx("X", &[("Game (USA)", 4, "12345678")]));

    let mut session = Session::new(Settings::default());
    session.load_catalog_file(&dat, FormatHint::Auto).unwrap();
    let bytes = session.save_state().unwrap();
    fs::remove_file(&dat).unwrap();

    let mut restored = Session::from_bytes(&bytes, Settings::default()).unwrap();
    let failures = restored.reload_catalogs();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].0, "X");
    assert!(restored.state().catalog("X").is_some());
}
