//! Core data model shared by the decoders, the attribution engine and storage.
//!
//! Everything here is a plain value type: decoders produce these records and
//! every later stage only reads them. All types serialize with serde so the
//! CLI can emit JSON/YAML and the history store can persist full results.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Label used for frames and drivers that could not be resolved to a module.
pub const UNKNOWN_MODULE: &str = "Unknown";

/// Container format of a dump file, decided from its leading signature bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DumpFormat {
    /// Stream-directory minidump (`MDMP`).
    StructuredMinidump,
    /// 64-bit kernel memory dump (`PAGEDU64`).
    KernelDump64,
    /// 32-bit kernel memory dump (`PAGEDU48`).
    KernelDump32,
}

impl DumpFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            DumpFormat::StructuredMinidump => "minidump",
            DumpFormat::KernelDump64 => "kernel-dump-64",
            DumpFormat::KernelDump32 => "kernel-dump-32",
        }
    }
}

impl fmt::Display for DumpFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Processor architecture of the crashed machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CpuArchitecture {
    X86,
    X64,
    Ia64,
    Arm,
    Arm64,
    /// Raw code that did not map to a known architecture.
    Unknown(u32),
}

impl CpuArchitecture {
    /// Map a minidump `ProcessorArchitecture` value.
    pub fn from_minidump_code(code: u16) -> Self {
        match code {
            0 => CpuArchitecture::X86,
            5 => CpuArchitecture::Arm,
            6 => CpuArchitecture::Ia64,
            9 => CpuArchitecture::X64,
            12 => CpuArchitecture::Arm64,
            other => CpuArchitecture::Unknown(u32::from(other)),
        }
    }

    /// Map a PE/COFF machine type as stored in kernel dump headers.
    pub fn from_machine_type(machine: u32) -> Self {
        match machine {
            0x014c => CpuArchitecture::X86,
            0x8664 => CpuArchitecture::X64,
            0x0200 => CpuArchitecture::Ia64,
            0x01c4 => CpuArchitecture::Arm,
            0xaa64 => CpuArchitecture::Arm64,
            other => CpuArchitecture::Unknown(other),
        }
    }

    /// Width in bytes of a native pointer (stack slot) on this architecture.
    pub fn pointer_width(&self) -> usize {
        match self {
            CpuArchitecture::X86 | CpuArchitecture::Arm => 4,
            _ => 8,
        }
    }
}

impl fmt::Display for CpuArchitecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CpuArchitecture::X86 => f.write_str("x86"),
            CpuArchitecture::X64 => f.write_str("x64"),
            CpuArchitecture::Ia64 => f.write_str("ia64"),
            CpuArchitecture::Arm => f.write_str("arm"),
            CpuArchitecture::Arm64 => f.write_str("arm64"),
            CpuArchitecture::Unknown(code) => write!(f, "unknown({code:#x})"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OsVersion {
    pub major: u32,
    pub minor: u32,
    pub build: u32,
}

impl fmt::Display for OsVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.build)
    }
}

/// Machine description recovered from the dump.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemInfo {
    pub architecture: CpuArchitecture,
    pub processor_count: u32,
    pub os_version: OsVersion,
    /// Empty when the format does not carry it.
    pub computer_name: String,
    /// Zero when the format does not carry it.
    pub physical_memory: u64,
    /// Capture time of the dump.
    pub timestamp: DateTime<Utc>,
}

impl Default for SystemInfo {
    fn default() -> Self {
        Self {
            architecture: CpuArchitecture::Unknown(0xffff),
            processor_count: 0,
            os_version: OsVersion::default(),
            computer_name: String::new(),
            physical_memory: 0,
            timestamp: DateTime::<Utc>::default(),
        }
    }
}

/// A loaded image (driver or executable) covering `[base, base + size)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Module {
    /// File name component, e.g. `nvlddmkm.sys`.
    pub name: String,
    /// Full path as recorded in the dump.
    pub path: String,
    pub base: u64,
    pub size: u64,
    /// Link timestamp (seconds since the Unix epoch) from the image header.
    pub timestamp: u32,
}

impl Module {
    /// Build a module from a recorded path; the name is its last path component.
    pub fn from_path(path: impl Into<String>, base: u64, size: u64, timestamp: u32) -> Self {
        let path = path.into();
        let name = file_name_of(&path).to_string();
        Self { name, path, base, size, timestamp }
    }

    /// Exclusive end of the module range, saturating at the top of the address space.
    pub fn end(&self) -> u64 {
        self.base.saturating_add(self.size)
    }

    pub fn contains(&self, address: u64) -> bool {
        self.size > 0 && address >= self.base && address < self.end()
    }
}

/// Last component of a Windows or POSIX style path.
pub fn file_name_of(path: &str) -> &str {
    path.rsplit(['\\', '/']).next().unwrap_or(path)
}

/// Raw exception data as recorded by a structured minidump.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExceptionRecord {
    pub code: u32,
    pub flags: u32,
    pub address: u64,
    pub thread_id: u32,
    pub parameters: Vec<u64>,
}

/// Bugcheck or exception summary of the crash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrashInfo {
    pub bugcheck_code: u32,
    pub bugcheck_name: String,
    pub description: String,
    /// Up to four bugcheck/exception parameters.
    pub parameters: Vec<u64>,
    pub crash_address: u64,
    pub thread_id: u32,
}

/// One frame of a walked stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackFrame {
    pub address: u64,
    /// Owning module name or [`UNKNOWN_MODULE`].
    pub module: String,
    /// Offset from the module base; zero when unresolved.
    pub offset: u64,
    /// Always `None`: symbols are not resolved.
    pub symbol: Option<String>,
}

impl StackFrame {
    pub fn is_resolved(&self) -> bool {
        self.module != UNKNOWN_MODULE
    }
}

/// A loaded module flagged by the known-bad table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProblematicDriver {
    pub module: Module,
    pub issue: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackTrace {
    pub thread_id: u32,
    pub frames: Vec<StackFrame>,
}

/// Full outcome of analyzing one dump file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub dump_file: String,
    pub format: DumpFormat,
    pub file_size: u64,
    pub system_info: SystemInfo,
    pub crash_info: CrashInfo,
    pub modules: Vec<Module>,
    pub stack_traces: Vec<StackTrace>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exception: Option<ExceptionRecord>,
    pub suspected_driver: Option<Module>,
    pub known_bad_driver: bool,
    /// Every loaded module the known-bad table flags, in module-list order.
    #[serde(default)]
    pub problematic_drivers: Vec<ProblematicDriver>,
    pub probable_cause: String,
    pub recommendations: Vec<String>,
    pub confidence: f64,
    /// Optional narrative attached by an external service; never filled here.
    #[serde(default)]
    pub ai_analysis: Option<String>,
    pub analyzed_at: DateTime<Utc>,
}

impl AnalysisResult {
    /// Name of the suspected driver, or [`UNKNOWN_MODULE`].
    pub fn suspected_driver_name(&self) -> &str {
        self.suspected_driver.as_ref().map(|m| m.name.as_str()).unwrap_or(UNKNOWN_MODULE)
    }
}
