//! Read-only reference tables consulted during attribution.
//!
//! Two seams are exposed as traits so callers (and tests) can inject their own
//! tables:
//! - [`BugcheckCatalog`]: stop-code names, descriptions, causes and advice.
//! - [`DriverCatalog`]: known-bad drivers, the system allowlist and coarse
//!   driver classification.
//!
//! [`BugcheckKnowledgeBase`] and [`DriverDetector`] are the built-in
//! implementations.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::{Module, ProblematicDriver};

pub mod bugchecks;
pub mod drivers;

pub use bugchecks::BugcheckKnowledgeBase;
pub use drivers::{DriverDetector, KnownBadDriver};

/// Everything known about one stop code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BugcheckInfo {
    pub code: u32,
    pub name: String,
    pub description: String,
    pub common_causes: Vec<String>,
    pub recommendations: Vec<String>,
}

/// Lookup of bugcheck metadata by code.
///
/// Unknown codes must still produce a record (a generic one), never an error.
pub trait BugcheckCatalog: Send + Sync {
    fn lookup(&self, code: u32) -> BugcheckInfo;
}

/// Coarse category of a driver, used to pick extra recommendations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriverType {
    System,
    Graphics,
    Network,
    Storage,
    Audio,
    Security,
    Virtualization,
    Unknown,
}

impl DriverType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DriverType::System => "system",
            DriverType::Graphics => "graphics",
            DriverType::Network => "network",
            DriverType::Storage => "storage",
            DriverType::Audio => "audio",
            DriverType::Security => "security",
            DriverType::Virtualization => "virtualization",
            DriverType::Unknown => "unknown",
        }
    }
}

impl fmt::Display for DriverType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Driver reputation and classification queries.
pub trait DriverCatalog: Send + Sync {
    fn is_known_bad(&self, module: &Module) -> bool;
    /// `"<issue>. <recommendation>"` for known-bad drivers.
    fn known_issue(&self, module: &Module) -> Option<String>;
    fn recommendation(&self, module: &Module) -> Option<String>;
    fn is_system_driver(&self, module: &Module) -> bool;
    fn classify(&self, module: &Module) -> DriverType;

    /// Every known-bad module in `modules`, in list order, with its issue text.
    fn find_problematic(&self, modules: &[Module]) -> Vec<ProblematicDriver> {
        modules
            .iter()
            .filter_map(|module| {
                self.known_issue(module)
                    .map(|issue| ProblematicDriver { module: module.clone(), issue })
            })
            .collect()
    }
}
