#[path = "../src/backup.rs"]
mod backup;
// backup.rs pulls its workspace-layout constants from these modules.
#[path = "../src/db.rs"]
#[allow(dead_code)]
mod db;
#[path = "../src/programs.rs"]
#[allow(dead_code)]
mod programs;
#[path = "../src/schedule.rs"]
#[allow(dead_code)]
mod schedule;

use std::fs::File;
use std::io::Read;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

#[test]
fn zip_export_and_import_roundtrip_with_programs() {
    let workspace = temp_dir("cadet-backup-src");
    let workspace2 = temp_dir("cadet-backup-dst");
    let out_dir = temp_dir("cadet-backup-out");

    let db_src = workspace.join("portal.sqlite3");
    let db_bytes = b"sqlite-test-payload";
    std::fs::write(&db_src, db_bytes).expect("write source db");

    let programs_dir = workspace.join("training_programs");
    std::fs::create_dir_all(&programs_dir).expect("create programs dir");
    let program_bytes = b"Year Group,Period,Week 1\n,,05/02/2090\n";
    std::fs::write(programs_dir.join("2090_1.csv"), program_bytes).expect("write program csv");

    let bundle_path = out_dir.join("workspace.cadetbackup.zip");
    let export = backup::export_workspace_bundle(&workspace, &bundle_path).expect("export bundle");
    assert_eq!(export.bundle_format, backup::BUNDLE_FORMAT_V1);
    assert_eq!(export.entry_count, 3);

    let f = File::open(&bundle_path).expect("open bundle");
    let mut archive = zip::ZipArchive::new(f).expect("open zip archive");
    let mut manifest = String::new();
    archive
        .by_name("manifest.json")
        .expect("manifest entry")
        .read_to_string(&mut manifest)
        .expect("read manifest");
    assert!(manifest.contains(backup::BUNDLE_FORMAT_V1));
    archive
        .by_name("db/portal.sqlite3")
        .expect("database entry in bundle");
    archive
        .by_name("programs/2090_1.csv")
        .expect("program entry in bundle");

    let import = backup::import_workspace_bundle(&bundle_path, &workspace2).expect("import bundle");
    assert_eq!(import.bundle_format_detected, backup::BUNDLE_FORMAT_V1);
    assert_eq!(import.program_count, 1);

    let restored_db = std::fs::read(workspace2.join("portal.sqlite3")).expect("read restored db");
    assert_eq!(restored_db, db_bytes);
    let restored_program = std::fs::read(workspace2.join("training_programs/2090_1.csv"))
        .expect("read restored program");
    assert_eq!(restored_program, program_bytes);

    let _ = std::fs::remove_dir_all(workspace);
    let _ = std::fs::remove_dir_all(workspace2);
    let _ = std::fs::remove_dir_all(out_dir);
}

#[test]
fn bare_sqlite_import_is_supported() {
    let out_dir = temp_dir("cadet-backup-bare");
    let workspace = temp_dir("cadet-backup-bare-dst");

    let bare_file = out_dir.join("portal-copy.sqlite3");
    let bytes = b"bare-sqlite-copy";
    std::fs::write(&bare_file, bytes).expect("write bare sqlite file");

    let import = backup::import_workspace_bundle(&bare_file, &workspace).expect("import bare sqlite");
    assert_eq!(import.bundle_format_detected, "bare-sqlite3");

    let restored = std::fs::read(workspace.join("portal.sqlite3")).expect("read restored sqlite");
    assert_eq!(restored, bytes);

    let _ = std::fs::remove_dir_all(out_dir);
    let _ = std::fs::remove_dir_all(workspace);
}
