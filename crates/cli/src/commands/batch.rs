use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use bsod_core::db::{open_crash_db, AnalyzerConfig, CrashDb, DataLayout};
use bsod_core::knowledge::BugcheckKnowledgeBase;
use bsod_core::model::AnalysisResult;
use bsod_core::services::{crash_patterns, BatchOutcome, CrashAnalyzer};
use serde::Serialize;
use tracing::warn;

use crate::{load_driver_detector, sha256_file};

/// Files in `dir` whose extension matches `ext` (case-insensitive), sorted by
/// path and capped at `limit`.
pub fn collect_dump_files(dir: &Path, ext: &str, limit: Option<usize>) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in
        fs::read_dir(dir).with_context(|| format!("Failed to read directory {}", dir.display()))?
    {
        let entry = entry?;
        let path = entry.path();
        if !entry.file_type()?.is_file() {
            continue;
        }
        let matches = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case(ext.trim_start_matches('.')));
        if matches {
            files.push(path);
        }
    }
    files.sort();
    if let Some(limit) = limit {
        files.truncate(limit);
    }
    Ok(files)
}

/// Counts from recording analyses in the history database.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SaveSummary {
    pub saved: usize,
    pub failed: usize,
}

/// Record every successful outcome. A failed insert is reported and the
/// remaining outcomes are still written.
pub fn save_outcomes(db: &CrashDb, outcomes: &[BatchOutcome]) -> SaveSummary {
    let mut summary = SaveSummary::default();
    for outcome in outcomes {
        let Ok(result) = &outcome.result else {
            continue;
        };
        let hash = sha256_file(&outcome.path).ok();
        match db.save_analysis(result, hash.as_deref()) {
            Ok(_) => summary.saved += 1,
            Err(err) => {
                warn!(%err, path = %outcome.path.display(), "failed to record analysis");
                eprintln!("Failed to save {}: {err}", outcome.path.display());
                summary.failed += 1;
            }
        }
    }
    summary
}

/// Open the configured history database and record `outcomes` in it.
pub fn save_to_history(
    layout: &DataLayout,
    config: &AnalyzerConfig,
    outcomes: &[BatchOutcome],
) -> Result<SaveSummary> {
    let (_db_path, db) = open_crash_db(layout, config)?;
    let summary = save_outcomes(&db, outcomes);
    eprintln!("Saved {} analyses to history", summary.saved);
    if summary.failed > 0 {
        eprintln!("{} analyses could not be saved", summary.failed);
    }
    Ok(summary)
}

#[derive(Debug, Serialize)]
struct BatchFailure {
    path: String,
    error: String,
}

#[derive(Debug, Serialize)]
struct BatchReport<'a> {
    succeeded: usize,
    failed: usize,
    results: Vec<&'a AnalysisResult>,
    failures: Vec<BatchFailure>,
    patterns: Option<bsod_core::services::CrashPatterns>,
}

/// Analyze every matching dump in a directory in parallel.
///
/// Individual failures are reported and skipped; the command only fails when
/// the directory itself cannot be read or nothing matched.
pub fn batch_command(
    layout: &DataLayout,
    config: &AnalyzerConfig,
    dir: &str,
    limit: Option<usize>,
    ext: &str,
    save: bool,
    json: bool,
) -> Result<()> {
    let files = collect_dump_files(Path::new(dir), ext, limit)?;
    if files.is_empty() {
        anyhow::bail!("No .{} files found in {dir}", ext.trim_start_matches('.'));
    }

    let catalog = BugcheckKnowledgeBase::new();
    let drivers = load_driver_detector(layout, config)?;
    let analyzer =
        CrashAnalyzer::new(&catalog, &drivers).with_max_frames(config.max_stack_frames);
    let outcomes = analyzer.analyze_many(&files);

    let mut results = Vec::new();
    let mut failures = Vec::new();
    for outcome in &outcomes {
        match &outcome.result {
            Ok(result) => results.push(result),
            Err(err) => failures.push(BatchFailure {
                path: outcome.path.display().to_string(),
                error: err.to_string(),
            }),
        }
    }

    // Writes happen here, after the parallel phase, on one connection.
    if save && !results.is_empty() {
        save_to_history(layout, config, &outcomes)?;
    }

    let patterns = crash_patterns(results.iter().copied());

    if json {
        let report = BatchReport {
            succeeded: results.len(),
            failed: failures.len(),
            results,
            failures,
            patterns,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    for result in &results {
        println!(
            "OK   {} | {} ({:#x}) | driver: {} | confidence {:.0}%",
            result.dump_file,
            result.crash_info.bugcheck_name,
            result.crash_info.bugcheck_code,
            result.suspected_driver_name(),
            result.confidence * 100.0
        );
    }
    for failure in &failures {
        println!("FAIL {} | {}", failure.path, failure.error);
    }
    println!();
    println!("{}/{} succeeded", results.len(), outcomes.len());

    if let Some(patterns) = patterns {
        println!();
        println!("Crash patterns:");
        println!("  Total crashes: {}", patterns.total_crashes);
        println!("  Average confidence: {:.0}%", patterns.average_confidence * 100.0);
        println!("  Bugchecks:");
        for (code, count) in &patterns.bugcheck_distribution {
            println!("    - {code:#x}: {count}");
        }
        println!("  Drivers:");
        for (name, count) in &patterns.driver_distribution {
            println!("    - {name}: {count}");
        }
    }

    Ok(())
}
