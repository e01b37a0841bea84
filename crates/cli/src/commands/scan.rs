use std::collections::HashSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use bsod_core::db::{AnalyzerConfig, DataLayout};
use bsod_core::dump::detect_format;
use bsod_core::knowledge::BugcheckKnowledgeBase;
use bsod_core::model::DumpFormat;
use bsod_core::services::CrashAnalyzer;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use super::batch::save_to_history;
use crate::load_driver_detector;

const DUMP_EXTENSIONS: &[&str] = &["dmp", "mdmp"];

/// A candidate dump file found on disk.
#[derive(Debug, Clone, Serialize)]
pub struct FoundDump {
    pub path: PathBuf,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
    /// `None` when the signature was not recognized.
    pub format: Option<DumpFormat>,
}

impl FoundDump {
    pub fn label(&self) -> String {
        match self.format {
            Some(format) => format.to_string(),
            None => "unrecognized".to_string(),
        }
    }
}

/// Directories searched by `scan`, in priority order.
pub fn scan_locations(layout: &DataLayout, config: &AnalyzerConfig) -> Vec<PathBuf> {
    let mut dirs = vec![
        PathBuf::from(&config.default_dump_dir),
        PathBuf::from("C:/Windows"),
        PathBuf::from("C:/Windows/LiveKernelReports"),
        layout.dumps_dir.clone(),
    ];
    if let Ok(cwd) = env::current_dir() {
        dirs.push(cwd);
    }
    dirs
}

fn is_dump_name(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| DUMP_EXTENSIONS.iter().any(|d| e.eq_ignore_ascii_case(d)))
}

fn collect(dir: &Path, depth: usize, out: &mut Vec<PathBuf>) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        match entry.file_type() {
            Ok(kind) if kind.is_dir() && depth > 0 => collect(&path, depth - 1, out),
            Ok(kind) if kind.is_file() && is_dump_name(&path) => out.push(path),
            _ => {}
        }
    }
}

/// Find dump files under `dirs` (and one level of subdirectories).
///
/// Empty files are skipped, duplicates by `(file name, size)` are dropped and
/// the result is ordered newest first.
pub fn discover_dumps(dirs: &[PathBuf]) -> Vec<FoundDump> {
    let mut paths = Vec::new();
    for dir in dirs {
        if dir.is_dir() {
            collect(dir, 1, &mut paths);
        }
    }

    let mut seen = HashSet::new();
    let mut found = Vec::new();
    for path in paths {
        let Ok(metadata) = fs::metadata(&path) else {
            continue;
        };
        if metadata.len() == 0 {
            continue;
        }
        let key = (path.file_name().map(|n| n.to_os_string()), metadata.len());
        if !seen.insert(key) {
            continue;
        }
        let format = detect_format(&path).ok();
        debug!(path = %path.display(), ?format, "found dump candidate");
        found.push(FoundDump {
            modified: metadata.modified().ok().map(DateTime::<Utc>::from),
            size: metadata.len(),
            format,
            path,
        });
    }
    found.sort_by(|a, b| b.modified.cmp(&a.modified));
    found
}

/// Discover dumps in the standard locations and optionally analyze them.
/// Saving implies analysis.
pub fn scan_command(
    layout: &DataLayout,
    config: &AnalyzerConfig,
    analyze: bool,
    limit: Option<usize>,
    all: bool,
    save: bool,
    json: bool,
) -> Result<()> {
    let analyze = analyze || save;
    let mut dumps = discover_dumps(&scan_locations(layout, config));
    if !all {
        dumps.retain(|d| d.format.is_some());
    }
    if let Some(limit) = limit {
        dumps.truncate(limit);
    }

    if json && !analyze {
        println!("{}", serde_json::to_string_pretty(&dumps)?);
        return Ok(());
    }

    if dumps.is_empty() {
        println!("No dump files found.");
        return Ok(());
    }

    println!("Found {} dump file(s):", dumps.len());
    for dump in &dumps {
        let when = dump.modified.map(|t| t.to_rfc3339()).unwrap_or_else(|| "-".to_string());
        println!("- {} [{}] {} bytes, modified {when}", dump.path.display(), dump.label(), dump.size);
    }

    if analyze {
        let catalog = BugcheckKnowledgeBase::new();
        let drivers = load_driver_detector(layout, config)?;
        let analyzer =
            CrashAnalyzer::new(&catalog, &drivers).with_max_frames(config.max_stack_frames);
        let paths: Vec<PathBuf> =
            dumps.iter().filter(|d| d.format.is_some()).map(|d| d.path.clone()).collect();
        let outcomes = analyzer.analyze_many(&paths);
        println!();
        for outcome in &outcomes {
            match &outcome.result {
                Ok(result) => println!(
                    "{}: {} ({:#x}), driver {}, confidence {:.0}%",
                    outcome.path.display(),
                    result.crash_info.bugcheck_name,
                    result.crash_info.bugcheck_code,
                    result.suspected_driver_name(),
                    result.confidence * 100.0
                ),
                Err(err) => println!("{}: failed: {err}", outcome.path.display()),
            }
        }
        if save {
            save_to_history(layout, config, &outcomes)?;
        }
    }

    Ok(())
}
