use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use bsod_core::db::{open_crash_db, AnalyzerConfig, DataLayout};
use bsod_core::knowledge::BugcheckKnowledgeBase;
use bsod_core::model::AnalysisResult;
use bsod_core::services::CrashAnalyzer;
use clap::ValueEnum;

use crate::{load_driver_detector, sha256_file};

/// Frames of the first stack trace shown in text reports.
const TEXT_FRAMES: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
    Yaml,
}

/// Render an analysis in the requested format.
pub fn render_result(
    result: &AnalysisResult,
    format: OutputFormat,
    confidence_threshold: f64,
) -> Result<String> {
    match format {
        OutputFormat::Text => Ok(render_text(result, confidence_threshold)),
        OutputFormat::Json => {
            serde_json::to_string_pretty(result).context("Failed to serialize analysis as JSON")
        }
        OutputFormat::Yaml => {
            serde_yaml::to_string(result).context("Failed to serialize analysis as YAML")
        }
    }
}

/// Human-readable report.
pub fn render_text(result: &AnalysisResult, confidence_threshold: f64) -> String {
    let mut out = String::new();
    let sys = &result.system_info;
    let crash = &result.crash_info;

    let _ = writeln!(out, "BSOD Analysis Report");
    let _ = writeln!(out, "====================");
    let _ = writeln!(out, "Dump file: {}", result.dump_file);
    let _ = writeln!(out, "Format: {} ({} bytes)", result.format, result.file_size);
    let _ = writeln!(out);

    let _ = writeln!(out, "System:");
    let _ = writeln!(out, "  Architecture: {}", sys.architecture);
    let _ = writeln!(out, "  Processors: {}", sys.processor_count);
    let _ = writeln!(out, "  OS version: {}", sys.os_version);
    if !sys.computer_name.is_empty() {
        let _ = writeln!(out, "  Computer: {}", sys.computer_name);
    }
    let _ = writeln!(out, "  Crash time: {}", sys.timestamp.to_rfc3339());
    let _ = writeln!(out);

    let _ = writeln!(out, "Crash:");
    let _ = writeln!(out, "  Bugcheck: {} ({:#x})", crash.bugcheck_name, crash.bugcheck_code);
    let _ = writeln!(out, "  Description: {}", crash.description);
    if !crash.parameters.is_empty() {
        let params: Vec<String> = crash.parameters.iter().map(|p| format!("{p:#x}")).collect();
        let _ = writeln!(out, "  Parameters: {}", params.join(", "));
    }
    let _ = writeln!(out, "  Crash address: {:#x}", crash.crash_address);
    let _ = writeln!(out);

    let _ = writeln!(out, "Attribution:");
    match &result.suspected_driver {
        Some(module) => {
            let flag = if result.known_bad_driver { " [known issue]" } else { "" };
            let _ = writeln!(
                out,
                "  Suspected driver: {} @ {:#x} (size {:#x}){flag}",
                module.name, module.base, module.size
            );
        }
        None => {
            let _ = writeln!(out, "  Suspected driver: none identified");
        }
    }
    let _ = writeln!(out, "  Probable cause: {}", result.probable_cause);
    let low = if result.confidence < confidence_threshold { " (low confidence)" } else { "" };
    let _ = writeln!(out, "  Confidence: {:.0}%{low}", result.confidence * 100.0);
    let _ = writeln!(out);

    if !result.problematic_drivers.is_empty() {
        let _ = writeln!(out, "Known-bad drivers loaded:");
        for flagged in &result.problematic_drivers {
            let _ = writeln!(out, "  {}: {}", flagged.module.name, flagged.issue);
        }
        let _ = writeln!(out);
    }

    let _ = writeln!(out, "Recommendations:");
    for (i, rec) in result.recommendations.iter().enumerate() {
        let _ = writeln!(out, "  {}. {rec}", i + 1);
    }

    if let Some(trace) = result.stack_traces.first() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Stack (thread {}):", trace.thread_id);
        for frame in trace.frames.iter().take(TEXT_FRAMES) {
            let _ = writeln!(
                out,
                "  {:#018x} {}+{:#x}",
                frame.address, frame.module, frame.offset
            );
        }
        if trace.frames.len() > TEXT_FRAMES {
            let _ = writeln!(out, "  ... {} more frames", trace.frames.len() - TEXT_FRAMES);
        }
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "Loaded modules: {}", result.modules.len());
    out
}

/// Analyze one dump, print or write the report, and optionally record it.
pub fn analyze_command(
    layout: &DataLayout,
    config: &AnalyzerConfig,
    dump: &str,
    format: OutputFormat,
    output: Option<&str>,
    save: bool,
) -> Result<()> {
    let path = Path::new(dump);
    let catalog = BugcheckKnowledgeBase::new();
    let drivers = load_driver_detector(layout, config)?;
    let analyzer =
        CrashAnalyzer::new(&catalog, &drivers).with_max_frames(config.max_stack_frames);

    let result =
        analyzer.analyze(path).with_context(|| format!("Failed to analyze {}", path.display()))?;
    let rendered = render_result(&result, format, config.confidence_threshold)?;

    match output {
        Some(out) => {
            fs::write(out, &rendered)
                .with_context(|| format!("Failed to write report to {out}"))?;
            eprintln!("Report written to {out}");
        }
        None => println!("{rendered}"),
    }

    if save {
        let hash = sha256_file(path).ok();
        let (_db_path, db) = open_crash_db(layout, config)?;
        let id = db.save_analysis(&result, hash.as_deref())?;
        eprintln!("Saved analysis to history (id {id})");
    }

    Ok(())
}
