use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{DriverCatalog, DriverType};
use crate::model::Module;

/// Known issue attached to a driver name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnownBadDriver {
    /// Matched case-insensitively as a substring of the module name.
    #[serde(skip)]
    pub pattern: String,
    pub issue: String,
    pub recommendation: String,
}

impl KnownBadDriver {
    pub fn new(
        pattern: impl Into<String>,
        issue: impl Into<String>,
        recommendation: impl Into<String>,
    ) -> Self {
        Self { pattern: pattern.into(), issue: issue.into(), recommendation: recommendation.into() }
    }

    fn matches(&self, lowered_name: &str) -> bool {
        lowered_name.contains(&self.pattern.to_lowercase())
    }
}

const BUILTIN_KNOWN_BAD: &[(&str, &str, &str)] = &[
    (
        "nvlddmkm.sys",
        "NVIDIA GPU driver - known to cause BSOD with certain configurations",
        "Update to latest NVIDIA driver or perform clean install",
    ),
    (
        "amdkmdag.sys",
        "AMD GPU driver - can cause crashes with certain hardware",
        "Update AMD graphics drivers",
    ),
    ("igdkmd64.sys", "Intel GPU driver - may cause system instability", "Update Intel graphics driver"),
    (
        "rtwlanu.sys",
        "Realtek USB WiFi driver - known stability issues",
        "Update Realtek driver or use alternative WiFi adapter",
    ),
    ("netr28x.sys", "Ralink network driver - can cause BSOD", "Update or replace network driver"),
    (
        "avgtdix.sys",
        "AVG Antivirus driver - known conflicts",
        "Update AVG or temporarily disable for testing",
    ),
    ("avghwnda.sys", "AVG driver component", "Update AVG Antivirus"),
    ("bdss.sys", "BitDefender security driver", "Update BitDefender or check for conflicts"),
    ("symefa.sys", "Symantec/Norton driver", "Update Norton Security"),
    ("symevent.sys", "Symantec event driver", "Update or remove Symantec product"),
    ("epfwwfp.sys", "ESET firewall driver", "Update ESET Security"),
    (
        "iaStorA.sys",
        "Intel RST driver - can cause BSOD with certain SSDs",
        "Update Intel Rapid Storage Technology driver",
    ),
    ("iaStorV.sys", "Intel storage driver", "Update Intel RST driver"),
    ("vmm.sys", "VirtualBox memory manager", "Update VirtualBox or disable if not in use"),
    ("vboxdrv.sys", "VirtualBox driver", "Update VirtualBox"),
    ("vmci.sys", "VMware CI driver", "Update VMware Workstation"),
    ("rgl64vk.sys", "Razer game capture driver", "Update Razer software"),
    (
        "Nahimic.sys",
        "Nahimic audio driver - known BSOD issues",
        "Update or disable Nahimic audio service",
    ),
    ("AiCharger.sys", "ASUS AI Charger driver", "Update or remove ASUS AI Suite"),
    ("AsIO.sys", "ASUS I/O driver for monitoring", "Update ASUS software"),
    (
        "ks.sys",
        "Windows kernel streaming - usually third-party filter driver issue",
        "Check audio/video capture software drivers",
    ),
];

/// Core Windows images that are never blamed directly. Matched exactly.
const SYSTEM_DRIVERS: &[&str] = &[
    "ntoskrnl.exe",
    "hal.dll",
    "ntkrnlmp.exe",
    "ntkrnlpa.exe",
    "kernel32.dll",
    "ntdll.dll",
    "win32k.sys",
    "csrss.exe",
    "lsass.exe",
    "services.exe",
    "svchost.exe",
    "explorer.exe",
];

/// Keyword lists checked in order; the first category with a hit wins.
const TYPE_KEYWORDS: &[(DriverType, &[&str])] = &[
    (DriverType::Graphics, &["nvlddmkm", "amdkmdag", "igdkmd", "nvidia", "amd", "intel", "gpu"]),
    (DriverType::Network, &["net", "wifi", "wlan", "ethernet", "realtek", "broadcom"]),
    (DriverType::Storage, &["stor", "disk", "raid", "ahci", "sata"]),
    (DriverType::Audio, &["audio", "sound", "hdaudio", "realtek", "conexant"]),
    (DriverType::Security, &["antivirus", "firewall", "security", "bdss", "avg", "norton"]),
    (DriverType::Virtualization, &["vbox", "vmware", "virtual"]),
];

/// Built-in [`DriverCatalog`] backed by a known-bad table.
///
/// Table order matters: the first matching entry supplies the issue text.
#[derive(Debug, Clone)]
pub struct DriverDetector {
    known_bad: Vec<KnownBadDriver>,
}

impl Default for DriverDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl DriverDetector {
    pub fn new() -> Self {
        let known_bad = BUILTIN_KNOWN_BAD
            .iter()
            .map(|(pattern, issue, rec)| KnownBadDriver::new(*pattern, *issue, *rec))
            .collect();
        Self { known_bad }
    }

    /// Detector with no known-bad entries; classification still works.
    pub fn empty() -> Self {
        Self { known_bad: Vec::new() }
    }

    /// Add or replace an entry. Patterns compare case-insensitively.
    pub fn insert(&mut self, entry: KnownBadDriver) {
        let key = entry.pattern.to_lowercase();
        match self.known_bad.iter_mut().find(|e| e.pattern.to_lowercase() == key) {
            Some(existing) => *existing = entry,
            None => self.known_bad.push(entry),
        }
    }

    /// Merge entries from a JSON object of `name -> {issue, recommendation}`.
    pub fn extend_from_json(&mut self, json: &str) -> Result<usize> {
        let entries: BTreeMap<String, KnownBadDriver> =
            serde_json::from_str(json).context("Failed to parse known-bad driver JSON")?;
        let count = entries.len();
        for (pattern, mut entry) in entries {
            entry.pattern = pattern;
            self.insert(entry);
        }
        Ok(count)
    }

    /// Load the built-in table and merge an extension file on top of it.
    pub fn with_extension_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path).with_context(|| {
            format!("Failed to read known-bad driver file at {}", path.display())
        })?;
        let mut detector = Self::new();
        let count = detector.extend_from_json(&json)?;
        debug!(path = %path.display(), count, "loaded known-bad driver extensions");
        Ok(detector)
    }

    pub fn entries(&self) -> &[KnownBadDriver] {
        &self.known_bad
    }

    fn find(&self, module: &Module) -> Option<&KnownBadDriver> {
        let lowered = module.name.to_lowercase();
        self.known_bad.iter().find(|entry| entry.matches(&lowered))
    }
}

impl DriverCatalog for DriverDetector {
    fn is_known_bad(&self, module: &Module) -> bool {
        self.find(module).is_some()
    }

    fn known_issue(&self, module: &Module) -> Option<String> {
        self.find(module).map(|entry| format!("{}. {}", entry.issue, entry.recommendation))
    }

    fn recommendation(&self, module: &Module) -> Option<String> {
        self.find(module).map(|entry| entry.recommendation.clone())
    }

    fn is_system_driver(&self, module: &Module) -> bool {
        SYSTEM_DRIVERS.iter().any(|name| name.eq_ignore_ascii_case(&module.name))
    }

    fn classify(&self, module: &Module) -> DriverType {
        if self.is_system_driver(module) {
            return DriverType::System;
        }
        let lowered = module.name.to_lowercase();
        TYPE_KEYWORDS
            .iter()
            .find(|(_, keywords)| keywords.iter().any(|k| lowered.contains(k)))
            .map(|(kind, _)| *kind)
            .unwrap_or(DriverType::Unknown)
    }
}
