use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::attribution::{attribute, Attribution};
use crate::analysis::{ModuleIndex, StackWalker};
use crate::dump::{open_dump, DumpError};
use crate::knowledge::{BugcheckCatalog, DriverCatalog};
use crate::model::{
    AnalysisResult, CrashInfo, DumpFormat, ExceptionRecord, Module, ProblematicDriver, StackTrace,
    SystemInfo,
};

/// Everything a decoder recovered from one file, before attribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecodedDump {
    pub path: PathBuf,
    pub file_size: u64,
    pub format: DumpFormat,
    pub system_info: SystemInfo,
    pub crash_info: CrashInfo,
    pub modules: Vec<Module>,
    pub stack_traces: Vec<StackTrace>,
    pub exception: Option<ExceptionRecord>,
}

/// Detect, decode and walk one dump file.
pub fn decode_file(
    path: &Path,
    catalog: &dyn BugcheckCatalog,
    walker: &StackWalker,
) -> Result<DecodedDump, DumpError> {
    let opened = open_dump(path)?;
    let decoder = opened.decoder;

    let modules = decoder.modules();
    let index = ModuleIndex::new(&modules);
    let stack_traces = decoder.stack_traces(&index, walker);
    debug!(
        modules = modules.len(),
        threads = stack_traces.len(),
        "decoded {}",
        path.display()
    );

    Ok(DecodedDump {
        path: opened.path,
        file_size: opened.file_size,
        format: decoder.format(),
        system_info: decoder.system_info(),
        crash_info: decoder.crash_info(catalog),
        modules,
        stack_traces,
        exception: decoder.exception(),
    })
}

/// Per-file outcome of a batch run.
#[derive(Debug)]
pub struct BatchOutcome {
    pub path: PathBuf,
    pub result: Result<AnalysisResult, DumpError>,
}

/// Decoding plus attribution over injected knowledge tables.
///
/// The analyzer only borrows its tables, so one instance can be shared by the
/// worker threads of [`CrashAnalyzer::analyze_many`].
#[derive(Clone, Copy)]
pub struct CrashAnalyzer<'a> {
    catalog: &'a dyn BugcheckCatalog,
    drivers: &'a dyn DriverCatalog,
    walker: StackWalker,
}

impl<'a> CrashAnalyzer<'a> {
    pub fn new(catalog: &'a dyn BugcheckCatalog, drivers: &'a dyn DriverCatalog) -> Self {
        Self { catalog, drivers, walker: StackWalker::default() }
    }

    pub fn with_max_frames(mut self, max_frames: usize) -> Self {
        self.walker = StackWalker::new(max_frames);
        self
    }

    pub fn analyze(&self, path: &Path) -> Result<AnalysisResult, DumpError> {
        info!("Starting analysis of {}", path.display());
        let decoded = decode_file(path, self.catalog, &self.walker)?;
        let verdict = attribute(
            &decoded.crash_info,
            &decoded.modules,
            &decoded.stack_traces,
            self.drivers,
            self.catalog,
        );
        let problematic = self.drivers.find_problematic(&decoded.modules);
        if !problematic.is_empty() {
            debug!(count = problematic.len(), "known-bad drivers loaded");
        }
        let result = assemble(decoded, verdict, problematic);
        info!("Analysis complete. Confidence: {:.0}%", result.confidence * 100.0);
        Ok(result)
    }

    /// Analyze files in parallel. Output order matches input order and a
    /// failure in one file never affects the others.
    pub fn analyze_many(&self, paths: &[PathBuf]) -> Vec<BatchOutcome> {
        paths
            .par_iter()
            .map(|path| {
                let result = self.analyze(path);
                if let Err(err) = &result {
                    warn!("Failed to analyze {}: {err}", path.display());
                }
                BatchOutcome { path: path.clone(), result }
            })
            .collect()
    }
}

fn assemble(
    decoded: DecodedDump,
    verdict: Attribution,
    problematic_drivers: Vec<ProblematicDriver>,
) -> AnalysisResult {
    AnalysisResult {
        dump_file: decoded.path.display().to_string(),
        format: decoded.format,
        file_size: decoded.file_size,
        system_info: decoded.system_info,
        crash_info: decoded.crash_info,
        modules: decoded.modules,
        stack_traces: decoded.stack_traces,
        exception: decoded.exception,
        suspected_driver: verdict.suspected,
        known_bad_driver: verdict.known_bad,
        problematic_drivers,
        probable_cause: verdict.cause,
        recommendations: verdict.recommendations,
        confidence: verdict.confidence,
        ai_analysis: None,
        analyzed_at: Utc::now(),
    }
}

/// Aggregate view over many analysis results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrashPatterns {
    pub total_crashes: usize,
    /// Top five `(bugcheck code, count)` pairs, most frequent first.
    pub bugcheck_distribution: Vec<(u32, usize)>,
    /// Top five `(driver name, count)` pairs; crashes without a suspect count as `Unknown`.
    pub driver_distribution: Vec<(String, usize)>,
    pub average_confidence: f64,
    pub most_common_bugcheck: Option<(u32, usize)>,
}

const TOP_N: usize = 5;

/// Count occurrences and return the `n` most frequent keys.
///
/// Ties keep first-seen order.
fn most_common<K, I>(items: I, n: usize) -> Vec<(K, usize)>
where
    K: Clone + Eq + std::hash::Hash,
    I: IntoIterator<Item = K>,
{
    let mut counts: HashMap<K, (usize, usize)> = HashMap::new();
    for (seen, key) in items.into_iter().enumerate() {
        counts.entry(key).or_insert((0, seen)).0 += 1;
    }
    let mut ranked: Vec<(K, (usize, usize))> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1 .0.cmp(&a.1 .0).then(a.1 .1.cmp(&b.1 .1)));
    ranked.into_iter().take(n).map(|(key, (count, _))| (key, count)).collect()
}

/// Summarize recurring bugchecks and drivers. Returns `None` for no input.
pub fn crash_patterns<'a, I>(results: I) -> Option<CrashPatterns>
where
    I: IntoIterator<Item = &'a AnalysisResult>,
{
    let results: Vec<&AnalysisResult> = results.into_iter().collect();
    if results.is_empty() {
        return None;
    }
    let bugchecks = most_common(results.iter().map(|r| r.crash_info.bugcheck_code), TOP_N);
    let drivers =
        most_common(results.iter().map(|r| r.suspected_driver_name().to_string()), TOP_N);
    let average_confidence =
        results.iter().map(|r| r.confidence).sum::<f64>() / results.len() as f64;

    Some(CrashPatterns {
        total_crashes: results.len(),
        most_common_bugcheck: bugchecks.first().copied(),
        bugcheck_distribution: bugchecks,
        driver_distribution: drivers,
        average_confidence,
    })
}
