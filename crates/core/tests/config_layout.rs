use std::collections::HashMap;
use std::fs;

use bsod_core::db::{
    load_config, load_config_file, open_crash_db, save_config, AnalyzerConfig, AnalyzerContext,
    DataLayout, DATA_DIR_NAME,
};
use tempfile::tempdir;

#[test]
fn layout_paths_hang_off_the_root() {
    let dir = tempdir().expect("tempdir");
    let layout = DataLayout::new(dir.path());

    assert_eq!(layout.root, dir.path());
    assert_eq!(layout.config_path, dir.path().join("config.json"));
    assert_eq!(layout.db_path, dir.path().join("crashes.db"));
    assert_eq!(layout.dumps_dir, dir.path().join("dumps"));
    assert_eq!(layout.resolve("nested/history.db"), dir.path().join("nested/history.db"));

    let absolute = dir.path().join("elsewhere.db");
    assert_eq!(layout.resolve(absolute.to_str().expect("utf8 path")), absolute);
}

#[test]
fn user_layout_lives_under_the_home_directory() {
    if let Some(layout) = DataLayout::default_for_user() {
        assert!(layout.root.ends_with(DATA_DIR_NAME));
    }
}

#[test]
fn defaults_are_sensible() {
    let config = AnalyzerConfig::default();
    assert_eq!(config.database_path, "crashes.db");
    assert_eq!(config.max_stack_frames, 50);
    assert_eq!(config.log_level, "info");
    assert!((config.confidence_threshold - 0.6).abs() < f64::EPSILON);
    assert!(config.known_bad_drivers_file.is_none());
}

#[test]
fn partial_config_file_fills_in_defaults() {
    let dir = tempdir().expect("tempdir");
    let layout = DataLayout::new(dir.path());
    fs::write(&layout.config_path, r#"{"max_stack_frames": 12, "database_path": "h.db"}"#)
        .expect("write config");

    let config = load_config(&layout).expect("load");
    assert_eq!(config.database_path, "h.db");
    assert_eq!(config.max_stack_frames, 12);
    assert_eq!(config.default_dump_dir, "C:/Windows/Minidump");
    assert_eq!(config.config_version, AnalyzerConfig::new().config_version);
}

#[test]
fn config_round_trips_through_disk() {
    let dir = tempdir().expect("tempdir");
    let layout = DataLayout::new(dir.path().join("data"));
    let mut config = AnalyzerConfig::new();
    config.known_bad_drivers_file = Some("drivers.json".to_string());
    config.confidence_threshold = 0.75;

    save_config(&layout, &config).expect("save");
    assert!(layout.config_path.exists());

    let loaded: AnalyzerConfig =
        serde_json::from_str(&fs::read_to_string(&layout.config_path).expect("read"))
            .expect("parse");
    assert_eq!(loaded, config);
}

#[test]
fn invalid_config_json_is_reported() {
    let dir = tempdir().expect("tempdir");
    let layout = DataLayout::new(dir.path());
    fs::write(&layout.config_path, "{ not json").expect("write config");
    assert!(load_config(&layout).is_err());
}

#[test]
fn environment_overrides_apply_on_top() {
    let env: HashMap<&str, &str> = [
        ("BSOD_ANALYZER_DB", "/tmp/override.db"),
        ("BSOD_ANALYZER_LOG_LEVEL", "debug"),
        ("BSOD_ANALYZER_MAX_FRAMES", "7"),
    ]
    .into_iter()
    .collect();
    let mut config = AnalyzerConfig::new();
    config.apply_env(|key| env.get(key).map(|v| v.to_string()));

    assert_eq!(config.database_path, "/tmp/override.db");
    assert_eq!(config.log_level, "debug");
    assert_eq!(config.max_stack_frames, 7);

    let mut config = AnalyzerConfig::new();
    config.apply_env(|key| (key == "BSOD_ANALYZER_MAX_FRAMES").then(|| "lots".to_string()));
    assert_eq!(config.max_stack_frames, 50);
}

#[test]
fn crash_db_is_created_under_the_data_root() {
    let dir = tempdir().expect("tempdir");
    let layout = DataLayout::new(dir.path().join("fresh"));
    let mut config = AnalyzerConfig::new();
    config.database_path = "db/crashes.db".to_string();

    let (db_path, _db) = open_crash_db(&layout, &config).expect("open");
    assert_eq!(db_path, dir.path().join("fresh/db/crashes.db"));
    assert!(db_path.exists());
}

#[test]
fn context_bundles_layout_config_and_db() {
    let dir = tempdir().expect("tempdir");
    let ctx = AnalyzerContext::from_root(dir.path()).expect("context");
    assert_eq!(ctx.layout.root, dir.path());
    assert_eq!(ctx.db_path, dir.path().join("crashes.db"));
    assert!(ctx.db.crash_history(5, None).expect("history").is_empty());
}

#[test]
fn library_version_matches_package() {
    assert_eq!(bsod_core::version(), env!("CARGO_PKG_VERSION"));
}

#[test]
fn stored_config_file_ignores_environment() {
    let dir = tempdir().expect("tempdir");
    let layout = DataLayout::new(dir.path());
    fs::write(&layout.config_path, r#"{"database_path": "stored.db"}"#).expect("write config");

    let stored = load_config_file(&layout).expect("load stored");
    assert_eq!(stored.database_path, "stored.db");
    assert_eq!(stored.max_stack_frames, 50);

    let missing = DataLayout::new(dir.path().join("none"));
    assert_eq!(load_config_file(&missing).expect("defaults"), AnalyzerConfig::default());
}

#[test]
fn context_opens_database_named_by_loaded_config() {
    let dir = tempdir().expect("tempdir");
    let mut config = AnalyzerConfig::new();
    config.database_path = "history/x.db".to_string();

    let ctx = AnalyzerContext::open(DataLayout::new(dir.path()), config).expect("open");
    assert_eq!(ctx.db_path, dir.path().join("history/x.db"));
    assert_eq!(ctx.config.database_path, "history/x.db");
    assert_eq!(ctx.db.statistics(7).expect("stats").total_crashes, 0);
}
