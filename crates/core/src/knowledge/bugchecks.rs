use super::{BugcheckCatalog, BugcheckInfo};

struct Entry {
    code: u32,
    name: &'static str,
    description: &'static str,
    causes: &'static [&'static str],
    recommendations: &'static [&'static str],
}

const GENERIC_RECOMMENDATIONS: &[&str] = &[
    "Install the latest Windows updates",
    "Update device drivers from the hardware vendor",
    "Run 'sfc /scannow' to check system file integrity",
];

const ENTRIES: &[Entry] = &[
    Entry {
        code: 0x0A,
        name: "IRQL_NOT_LESS_OR_EQUAL",
        description: "A kernel-mode driver or the kernel accessed pageable or invalid memory at too high an IRQL.",
        causes: &[
            "faulty or incompatible device driver",
            "corrupted memory",
            "incompatible antivirus software",
            "hardware failure",
        ],
        recommendations: &[
            "Update or roll back recently installed drivers",
            "Run Windows Memory Diagnostic to test RAM",
            "Temporarily uninstall third-party antivirus software",
        ],
    },
    Entry {
        code: 0x19,
        name: "BAD_POOL_HEADER",
        description: "A pool header is corrupt, usually because a driver overran or freed a pool allocation incorrectly.",
        causes: &["driver pool corruption", "faulty RAM", "disk errors"],
        recommendations: &[
            "Enable Driver Verifier to identify the corrupting driver",
            "Run Windows Memory Diagnostic to test RAM",
            "Run 'chkdsk /f' on the system drive",
        ],
    },
    Entry {
        code: 0x1A,
        name: "MEMORY_MANAGEMENT",
        description: "A severe memory management error occurred.",
        causes: &["faulty RAM", "driver memory corruption", "corrupted page file", "disk errors"],
        recommendations: &[
            "Run Windows Memory Diagnostic or MemTest86",
            "Reseat or replace memory modules",
            "Update storage and chipset drivers",
        ],
    },
    Entry {
        code: 0x1E,
        name: "KMODE_EXCEPTION_NOT_HANDLED",
        description: "A kernel-mode program generated an exception that the error handler did not catch.",
        causes: &["faulty device driver", "hardware incompatibility", "corrupted system files"],
        recommendations: &[
            "Update the driver named in the crash if one is identified",
            "Remove recently installed hardware or software",
            "Run 'sfc /scannow' to check system file integrity",
        ],
    },
    Entry {
        code: 0x3B,
        name: "SYSTEM_SERVICE_EXCEPTION",
        description: "An exception occurred while executing a routine that transitions from non-privileged to privileged code.",
        causes: &[
            "faulty graphics driver",
            "incompatible antivirus software",
            "corrupted system files",
            "faulty RAM",
        ],
        recommendations: &[
            "Update graphics drivers",
            "Run 'sfc /scannow' and 'DISM /Online /Cleanup-Image /RestoreHealth'",
            "Temporarily uninstall third-party security software",
        ],
    },
    Entry {
        code: 0x50,
        name: "PAGE_FAULT_IN_NONPAGED_AREA",
        description: "Invalid system memory was referenced.",
        causes: &["faulty RAM", "faulty device driver", "antivirus software", "corrupted NTFS volume"],
        recommendations: &[
            "Run Windows Memory Diagnostic to test RAM",
            "Update or roll back recently installed drivers",
            "Run 'chkdsk /f' on the system drive",
        ],
    },
    Entry {
        code: 0x7A,
        name: "KERNEL_DATA_INPAGE_ERROR",
        description: "The requested page of kernel data from the paging file could not be read into memory.",
        causes: &["failing disk", "loose or faulty storage cables", "faulty RAM", "virus infection"],
        recommendations: &[
            "Check disk health with the vendor's diagnostic tool",
            "Run 'chkdsk /r' on the system drive",
            "Check storage cables and connections",
        ],
    },
    Entry {
        code: 0x7E,
        name: "SYSTEM_THREAD_EXCEPTION_NOT_HANDLED",
        description: "A system thread generated an exception that the error handler did not catch.",
        causes: &["incompatible device driver", "outdated BIOS", "corrupted system files"],
        recommendations: &[
            "Update the driver named in the crash if one is identified",
            "Update the system BIOS/UEFI",
            "Boot into Safe Mode and remove recently installed drivers",
        ],
    },
    Entry {
        code: 0x7F,
        name: "UNEXPECTED_KERNEL_MODE_TRAP",
        description: "The CPU generated a trap that the kernel failed to catch, often a double fault.",
        causes: &["hardware failure", "overclocking", "kernel stack overflow", "faulty RAM"],
        recommendations: &[
            "Revert CPU and memory overclocking",
            "Run hardware diagnostics",
            "Check system temperatures and cooling",
        ],
    },
    Entry {
        code: 0xC4,
        name: "DRIVER_VERIFIER_DETECTED_VIOLATION",
        description: "Driver Verifier detected an illegal action by a driver.",
        causes: &["driver bug caught by Driver Verifier"],
        recommendations: &[
            "Update or remove the driver flagged by Driver Verifier",
            "Disable Driver Verifier with 'verifier /reset' once finished",
        ],
    },
    Entry {
        code: 0xD1,
        name: "DRIVER_IRQL_NOT_LESS_OR_EQUAL",
        description: "A kernel-mode driver attempted to access pageable memory at a process IRQL that was too high.",
        causes: &["faulty network driver", "faulty device driver", "incompatible antivirus software"],
        recommendations: &[
            "Update network adapter drivers",
            "Update or roll back recently installed drivers",
            "Temporarily uninstall third-party antivirus software",
        ],
    },
    Entry {
        code: 0xEF,
        name: "CRITICAL_PROCESS_DIED",
        description: "A critical system process terminated unexpectedly.",
        causes: &["corrupted system files", "failing disk", "faulty driver", "malware"],
        recommendations: &[
            "Run 'sfc /scannow' and 'DISM /Online /Cleanup-Image /RestoreHealth'",
            "Check disk health",
            "Scan the system for malware",
        ],
    },
    Entry {
        code: 0xFC,
        name: "ATTEMPTED_EXECUTE_OF_NOEXECUTE_MEMORY",
        description: "An attempt was made to execute non-executable memory.",
        causes: &["faulty device driver", "faulty RAM", "outdated BIOS"],
        recommendations: &[
            "Update or roll back recently installed drivers",
            "Run Windows Memory Diagnostic to test RAM",
            "Update the system BIOS/UEFI",
        ],
    },
    Entry {
        code: 0x124,
        name: "WHEA_UNCORRECTABLE_ERROR",
        description: "A fatal hardware error was reported by the Windows Hardware Error Architecture.",
        causes: &["overheating", "overclocking", "failing CPU or memory", "insufficient power supply"],
        recommendations: &[
            "Revert any overclocking",
            "Check CPU and GPU temperatures",
            "Run hardware diagnostics on CPU, RAM and power supply",
        ],
    },
    Entry {
        code: 0x133,
        name: "DPC_WATCHDOG_VIOLATION",
        description: "A deferred procedure call ran too long or the system stalled at DISPATCH_LEVEL.",
        causes: &["outdated storage controller driver", "SSD firmware issues", "faulty device driver"],
        recommendations: &[
            "Update storage controller (SATA AHCI) drivers",
            "Update SSD firmware",
            "Update chipset drivers",
        ],
    },
    Entry {
        code: 0x13A,
        name: "KERNEL_MODE_HEAP_CORRUPTION",
        description: "The kernel-mode heap manager detected corruption in a heap.",
        causes: &["driver heap corruption", "faulty graphics driver", "faulty RAM"],
        recommendations: &[
            "Update graphics drivers",
            "Enable Driver Verifier to identify the corrupting driver",
            "Run Windows Memory Diagnostic to test RAM",
        ],
    },
];

fn owned(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Built-in table of well-known stop codes.
#[derive(Debug, Clone, Copy, Default)]
pub struct BugcheckKnowledgeBase;

impl BugcheckKnowledgeBase {
    pub fn new() -> Self {
        Self
    }

    /// Codes with a dedicated entry, in ascending order.
    pub fn known_codes(&self) -> Vec<u32> {
        ENTRIES.iter().map(|e| e.code).collect()
    }

    pub fn is_known(&self, code: u32) -> bool {
        ENTRIES.iter().any(|e| e.code == code)
    }
}

impl BugcheckCatalog for BugcheckKnowledgeBase {
    fn lookup(&self, code: u32) -> BugcheckInfo {
        match ENTRIES.iter().find(|e| e.code == code) {
            Some(entry) => BugcheckInfo {
                code,
                name: entry.name.to_string(),
                description: entry.description.to_string(),
                common_causes: owned(entry.causes),
                recommendations: owned(entry.recommendations),
            },
            None => BugcheckInfo {
                code,
                name: "UNKNOWN_BUGCHECK".to_string(),
                description: format!("Unrecognized bugcheck code {code:#x}."),
                common_causes: Vec::new(),
                recommendations: owned(GENERIC_RECOMMENDATIONS),
            },
        }
    }
}
