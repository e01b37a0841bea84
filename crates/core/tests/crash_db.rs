use bsod_core::db::{CrashDb, DbError, CURRENT_SCHEMA_VERSION};
use bsod_core::model::{
    AnalysisResult, CrashInfo, DumpFormat, Module, SystemInfo,
};
use chrono::{DateTime, Duration, Utc};
use rusqlite::Connection;
use tempfile::tempdir;

fn result_at(
    file: &str,
    code: u32,
    name: &str,
    driver: Option<&str>,
    when: DateTime<Utc>,
) -> AnalysisResult {
    AnalysisResult {
        dump_file: file.to_string(),
        format: DumpFormat::StructuredMinidump,
        file_size: 4096,
        system_info: SystemInfo { timestamp: when, ..SystemInfo::default() },
        crash_info: CrashInfo {
            bugcheck_code: code,
            bugcheck_name: name.to_string(),
            description: "desc".to_string(),
            parameters: vec![1, 2, 3, 4],
            crash_address: 0x1000,
            thread_id: 3,
        },
        modules: Vec::new(),
        stack_traces: Vec::new(),
        exception: None,
        suspected_driver: driver.map(|d| Module::from_path(d, 0x1000, 0x100, 0)),
        known_bad_driver: false,
        problematic_drivers: Vec::new(),
        probable_cause: "cause".to_string(),
        recommendations: vec!["do a thing".to_string()],
        confidence: 0.8,
        ai_analysis: None,
        analyzed_at: Utc::now(),
    }
}

#[test]
fn fresh_database_is_migrated_to_current_schema() {
    let dir = tempdir().expect("tempdir");
    let db_path = dir.path().join("crashes.db");

    {
        let db = CrashDb::open(&db_path).expect("open db");
        let version: i32 = db
            .connection()
            .query_row("PRAGMA user_version;", [], |row| row.get(0))
            .expect("schema version");
        assert_eq!(version, CURRENT_SCHEMA_VERSION);
        db.save_analysis(&result_at("a.dmp", 0x0A, "IRQL", None, Utc::now()), Some("abc"))
            .expect("save");
    }

    // Re-opening keeps data and schema.
    let db = CrashDb::open(&db_path).expect("re-open db");
    assert_eq!(db.crash_history(10, None).expect("history").len(), 1);
    assert!(db.contains_hash("abc").expect("hash lookup"));
    assert!(!db.contains_hash("def").expect("hash lookup"));
}

#[test]
fn version_one_database_gains_hash_column() {
    let dir = tempdir().expect("tempdir");
    let db_path = dir.path().join("old.db");
    {
        let conn = Connection::open(&db_path).expect("open raw");
        conn.execute_batch(
            r#"
            CREATE TABLE crash_history (
                id               INTEGER PRIMARY KEY AUTOINCREMENT,
                dump_file_path   TEXT NOT NULL,
                crash_time       TEXT NOT NULL,
                bugcheck_code    INTEGER NOT NULL,
                bugcheck_name    TEXT NOT NULL,
                suspected_driver TEXT,
                confidence       REAL NOT NULL,
                analysis_result  TEXT NOT NULL,
                ai_analysis      TEXT,
                created_at       TEXT NOT NULL
            );
            PRAGMA user_version = 1;
            "#,
        )
        .expect("create v1 schema");
    }

    let db = CrashDb::open(&db_path).expect("migrate");
    let version: i32 = db
        .connection()
        .query_row("PRAGMA user_version;", [], |row| row.get(0))
        .expect("schema version");
    assert_eq!(version, 2);
    db.save_analysis(&result_at("x.dmp", 0x50, "PFN", None, Utc::now()), Some("h1"))
        .expect("save after migration");
    assert!(db.contains_hash("h1").expect("hash lookup"));
}

#[test]
fn newer_schema_is_rejected() {
    let dir = tempdir().expect("tempdir");
    let db_path = dir.path().join("future.db");
    {
        let conn = Connection::open(&db_path).expect("open raw");
        conn.execute_batch("PRAGMA user_version = 99;").expect("bump version");
    }

    match CrashDb::open(&db_path) {
        Err(DbError::UnsupportedSchemaVersion { found, max_supported, .. }) => {
            assert_eq!(found, 99);
            assert_eq!(max_supported, CURRENT_SCHEMA_VERSION);
        }
        other => panic!("expected UnsupportedSchemaVersion, got {:?}", other.err()),
    }
}

#[test]
fn saved_analysis_round_trips_through_get_by_id() {
    let db = CrashDb::open_in_memory().expect("in-memory db");
    let original = result_at("C:/dumps/one.dmp", 0xD1, "DRIVER_IRQL", Some("foo.sys"), Utc::now());
    let id = db.save_analysis(&original, None).expect("save");

    let record = db.get_by_id(id).expect("query").expect("record exists");
    assert_eq!(record.dump_file_path, "C:/dumps/one.dmp");
    assert_eq!(record.bugcheck_code, 0xD1);
    assert_eq!(record.suspected_driver.as_deref(), Some("foo.sys"));
    assert!(record.dump_hash.is_none());
    assert_eq!(record.analysis().expect("decode stored analysis"), original);

    assert!(db.get_by_id(id + 100).expect("query").is_none());
}

#[test]
fn history_is_newest_first_and_respects_limit_and_window() {
    let db = CrashDb::open_in_memory().expect("in-memory db");
    let now = Utc::now();
    db.save_analysis(&result_at("old.dmp", 0x50, "A", None, now - Duration::days(40)), None)
        .expect("save");
    db.save_analysis(&result_at("mid.dmp", 0x50, "A", None, now - Duration::days(5)), None)
        .expect("save");
    db.save_analysis(&result_at("new.dmp", 0x50, "A", None, now - Duration::hours(1)), None)
        .expect("save");

    let all = db.crash_history(10, None).expect("history");
    let files: Vec<&str> = all.iter().map(|r| r.dump_file_path.as_str()).collect();
    assert_eq!(files, vec!["new.dmp", "mid.dmp", "old.dmp"]);

    assert_eq!(db.crash_history(1, None).expect("history")[0].dump_file_path, "new.dmp");
    assert_eq!(db.crash_history(10, Some(30)).expect("history").len(), 2);
}

#[test]
fn statistics_count_recent_bugchecks_and_drivers() {
    let db = CrashDb::open_in_memory().expect("in-memory db");
    let now = Utc::now();
    for (code, name, driver) in [
        (0x0A, "IRQL_NOT_LESS_OR_EQUAL", Some("nvlddmkm.sys")),
        (0x0A, "IRQL_NOT_LESS_OR_EQUAL", Some("nvlddmkm.sys")),
        (0x50, "PAGE_FAULT_IN_NONPAGED_AREA", None),
    ] {
        db.save_analysis(&result_at("x.dmp", code, name, driver, now), None).expect("save");
    }
    db.save_analysis(
        &result_at("ancient.dmp", 0x124, "WHEA", Some("old.sys"), now - Duration::days(400)),
        None,
    )
    .expect("save");

    let stats = db.statistics(30).expect("statistics");
    assert_eq!(stats.days, 30);
    assert_eq!(stats.total_crashes, 3);
    assert_eq!(
        stats.top_bugchecks,
        vec![
            (0x0A, "IRQL_NOT_LESS_OR_EQUAL".to_string(), 2),
            (0x50, "PAGE_FAULT_IN_NONPAGED_AREA".to_string(), 1),
        ]
    );
    assert_eq!(stats.top_drivers, vec![("nvlddmkm.sys".to_string(), 2)]);
}

#[test]
fn clearing_old_records_only_removes_expired_rows() {
    let db = CrashDb::open_in_memory().expect("in-memory db");
    let now = Utc::now();
    db.save_analysis(&result_at("keep.dmp", 0x1, "A", None, now), None).expect("save");
    db.save_analysis(&result_at("drop.dmp", 0x1, "A", None, now - Duration::days(100)), None)
        .expect("save");

    assert_eq!(db.clear_old_records(90).expect("prune"), 1);
    let remaining = db.crash_history(10, None).expect("history");
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].dump_file_path, "keep.dmp");
}
