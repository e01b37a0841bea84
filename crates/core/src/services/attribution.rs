use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::analysis::ModuleIndex;
use crate::knowledge::{BugcheckCatalog, DriverCatalog, DriverType};
use crate::model::{CrashInfo, Module, StackTrace};

/// Stop codes that are most often driver-caused; seeing one nudges confidence up.
pub const COMMON_DRIVER_BUGCHECKS: [u32; 6] = [0x0A, 0x3B, 0xD1, 0x50, 0x7E, 0x1E];

/// Number of knowledge-base causes quoted in the cause text.
const QUOTED_CAUSES: usize = 3;

const BASE_CONFIDENCE: f64 = 0.5;
const STACK_BONUS: f64 = 0.15;
const SUSPECT_BONUS: f64 = 0.15;
const KNOWN_BAD_BONUS: f64 = 0.25;
const COMMON_CODE_BONUS: f64 = 0.1;

const GRAPHICS_ADVICE: &str =
    "Graphics drivers are often the cause - try a clean install of GPU drivers";
const NETWORK_ADVICE: &str =
    "Network driver issues - update or temporarily disable network adapters";

/// Which strategy picked the suspected driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuspectSource {
    /// Top frame of a stack trace landed in a non-system module.
    StackTrace,
    /// First loaded module found in the known-bad table.
    KnownBadList,
    /// The crash address falls inside the module.
    CrashAddress,
}

/// Verdict of the attribution engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribution {
    pub suspected: Option<Module>,
    pub source: Option<SuspectSource>,
    pub known_bad: bool,
    pub cause: String,
    pub recommendations: Vec<String>,
    /// Heuristic score in `[0.5, 1.0]`.
    pub confidence: f64,
}

/// Pick a suspect driver, explain the crash and score the verdict.
///
/// Pure function of its inputs: the tables are only read.
pub fn attribute(
    crash: &CrashInfo,
    modules: &[Module],
    stacks: &[StackTrace],
    drivers: &dyn DriverCatalog,
    catalog: &dyn BugcheckCatalog,
) -> Attribution {
    let index = ModuleIndex::new(modules);
    let found = find_suspect(crash, modules, stacks, &index, drivers);
    let (suspected, source) = match found {
        Some((module, source)) => (Some(module), Some(source)),
        None => (None, None),
    };
    let known_bad = suspected.as_ref().is_some_and(|m| drivers.is_known_bad(m));
    match (&suspected, source) {
        (Some(module), Some(source)) => {
            debug!(driver = %module.name, ?source, known_bad, "suspected driver identified")
        }
        _ => debug!("no specific driver identified"),
    }

    let info = catalog.lookup(crash.bugcheck_code);

    let mut cause = info.description.clone();
    if !info.common_causes.is_empty() {
        let quoted: Vec<&str> =
            info.common_causes.iter().take(QUOTED_CAUSES).map(String::as_str).collect();
        cause.push_str(&format!(" Common causes: {}", quoted.join(", ")));
    }
    if let Some(module) = &suspected {
        match drivers.known_issue(module).filter(|_| known_bad) {
            Some(issue) => cause.push_str(&format!(" Known issue: {issue}")),
            None => cause.push_str(&format!(" Suspected driver: {}", module.name)),
        }
    }

    let mut recommendations = info.recommendations.clone();
    if let Some(module) = &suspected {
        if known_bad {
            if let Some(rec) = drivers.recommendation(module) {
                recommendations.push(format!("Driver-specific: {rec}"));
            }
        } else {
            recommendations.push(format!("Update '{}' to the latest version", module.name));
        }
        match drivers.classify(module) {
            DriverType::Graphics => recommendations.push(GRAPHICS_ADVICE.to_string()),
            DriverType::Network => recommendations.push(NETWORK_ADVICE.to_string()),
            _ => {}
        }
    }
    let recommendations = dedup_preserving_order(recommendations);

    let mut confidence = BASE_CONFIDENCE;
    if stacks.iter().any(|trace| !trace.frames.is_empty()) {
        confidence += STACK_BONUS;
    }
    if suspected.is_some() {
        confidence += SUSPECT_BONUS;
    }
    if known_bad {
        confidence += KNOWN_BAD_BONUS;
    }
    if COMMON_DRIVER_BUGCHECKS.contains(&crash.bugcheck_code) {
        confidence += COMMON_CODE_BONUS;
    }
    let confidence = confidence.min(1.0);

    Attribution { suspected, source, known_bad, cause, recommendations, confidence }
}

fn find_suspect(
    crash: &CrashInfo,
    modules: &[Module],
    stacks: &[StackTrace],
    index: &ModuleIndex,
    drivers: &dyn DriverCatalog,
) -> Option<(Module, SuspectSource)> {
    for trace in stacks {
        let Some(top) = trace.frames.first() else {
            continue;
        };
        if let Some(module) = index.lookup(top.address) {
            if !drivers.is_system_driver(module) {
                return Some((module.clone(), SuspectSource::StackTrace));
            }
        }
    }

    if let Some(module) = modules.iter().find(|m| drivers.is_known_bad(m)) {
        return Some((module.clone(), SuspectSource::KnownBadList));
    }

    index.lookup(crash.crash_address).map(|module| (module.clone(), SuspectSource::CrashAddress))
}

fn dedup_preserving_order(items: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    items.into_iter().filter(|item| seen.insert(item.clone())).collect()
}
