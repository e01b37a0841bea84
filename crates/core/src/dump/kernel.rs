use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{ByteReader, DumpDecoder, DumpError, KERNEL_DUMP64_SIGNATURE};
use crate::analysis::{ModuleIndex, StackWalker};
use crate::knowledge::BugcheckCatalog;
use crate::model::{
    CpuArchitecture, CrashInfo, DumpFormat, ExceptionRecord, Module, OsVersion, StackTrace,
    SystemInfo,
};

/// Bytes loaded from the front of a kernel dump; the header lives in this page run.
pub const HEADER_PAGE_LEN: usize = 0x2000;

const MAJOR_VERSION_OFFSET: u64 = 0x08;
const MINOR_VERSION_OFFSET: u64 = 0x0c;
const DIRECTORY_TABLE_BASE_OFFSET: u64 = 0x10;
const MACHINE_TYPE_OFFSET: u64 = 0x30;
const PROCESSOR_COUNT_OFFSET: u64 = 0x34;
const BUGCHECK_CODE_OFFSET: u64 = 0x40;
const BUGCHECK_PARAMETERS_OFFSET: u64 = 0x44;
/// End of the mandatory fields; anything shorter is a truncated header.
const MIN_HEADER_LEN: usize = 0x64;

const CONTEXT_OFFSET: u64 = 0x200;
/// Size of an x64 `CONTEXT` record.
const CONTEXT_LEN: usize = 0x4d0;
const SYSTEM_TIME_OFFSET: u64 = 0xfa8;

/// Filler written into header fields the kernel left unset.
const PAGE_FILLER: &[u8; 4] = b"PAGE";

/// FILETIME ticks (100ns) between 1601-01-01 and the Unix epoch.
const FILETIME_UNIX_EPOCH: u64 = 116_444_736_000_000_000;

/// General purpose registers of the crashing processor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterContext {
    pub rax: u64,
    pub rcx: u64,
    pub rdx: u64,
    pub rbx: u64,
    pub rsp: u64,
    pub rbp: u64,
    pub rsi: u64,
    pub rdi: u64,
    pub r8: u64,
    pub r9: u64,
    pub r10: u64,
    pub r11: u64,
    pub r12: u64,
    pub r13: u64,
    pub r14: u64,
    pub r15: u64,
    pub rip: u64,
}

impl RegisterContext {
    /// Decode the register block from a `CONTEXT` record.
    ///
    /// Returns `None` when the block is too short or still holds the `PAGE`
    /// filler pattern.
    pub fn parse(block: &[u8]) -> Option<Self> {
        if block.len() < CONTEXT_LEN || is_page_filler(block) {
            return None;
        }
        let reader = ByteReader::new(block);
        let reg = |offset: u64| reader.u64_at(offset).ok();
        Some(Self {
            rax: reg(0x78)?,
            rcx: reg(0x80)?,
            rdx: reg(0x88)?,
            rbx: reg(0x90)?,
            rsp: reg(0x98)?,
            rbp: reg(0xa0)?,
            rsi: reg(0xa8)?,
            rdi: reg(0xb0)?,
            r8: reg(0xb8)?,
            r9: reg(0xc0)?,
            r10: reg(0xc8)?,
            r11: reg(0xd0)?,
            r12: reg(0xd8)?,
            r13: reg(0xe0)?,
            r14: reg(0xe8)?,
            r15: reg(0xf0)?,
            rip: reg(0xf8)?,
        })
    }
}

fn is_page_filler(block: &[u8]) -> bool {
    block.len() >= 16 && block[..16].chunks_exact(4).all(|chunk| chunk == PAGE_FILLER)
}

fn filetime_to_utc(filetime: u64) -> Option<DateTime<Utc>> {
    if filetime == 0 || filetime.to_le_bytes().chunks_exact(4).all(|c| c == PAGE_FILLER) {
        return None;
    }
    let ticks = filetime.checked_sub(FILETIME_UNIX_EPOCH)?;
    let secs = i64::try_from(ticks / 10_000_000).ok()?;
    let nanos = ((ticks % 10_000_000) * 100) as u32;
    DateTime::<Utc>::from_timestamp(secs, nanos)
}

/// Fixed-offset fields of a 64-bit kernel dump header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KernelHeader {
    pub major_version: u32,
    pub minor_version: u32,
    pub directory_table_base: u64,
    pub machine_type: u32,
    pub processor_count: u32,
    pub bugcheck_code: u32,
    pub bugcheck_parameters: [u64; 4],
    pub system_time: Option<DateTime<Utc>>,
    pub context: Option<RegisterContext>,
}

impl KernelHeader {
    pub fn parse(data: &[u8]) -> Result<Self, DumpError> {
        let reader = ByteReader::new(data);
        if data.len() < MIN_HEADER_LEN {
            return Err(DumpError::Truncated {
                offset: 0,
                needed: MIN_HEADER_LEN,
                available: data.len(),
            });
        }
        if !data.starts_with(KERNEL_DUMP64_SIGNATURE) {
            let len = data.len().min(super::SIGNATURE_LEN);
            return Err(DumpError::InvalidSignature { bytes: data[..len].to_vec() });
        }

        let mut bugcheck_parameters = [0u64; 4];
        for (i, slot) in bugcheck_parameters.iter_mut().enumerate() {
            *slot = reader.u64_at(BUGCHECK_PARAMETERS_OFFSET + 8 * i as u64)?;
        }

        let context =
            reader.bytes_at(CONTEXT_OFFSET, CONTEXT_LEN).ok().and_then(RegisterContext::parse);
        if context.is_none() {
            debug!("kernel dump carries no usable register context");
        }
        let system_time = reader.u64_at(SYSTEM_TIME_OFFSET).ok().and_then(filetime_to_utc);

        Ok(Self {
            major_version: reader.u32_at(MAJOR_VERSION_OFFSET)?,
            minor_version: reader.u32_at(MINOR_VERSION_OFFSET)?,
            directory_table_base: reader.u64_at(DIRECTORY_TABLE_BASE_OFFSET)?,
            machine_type: reader.u32_at(MACHINE_TYPE_OFFSET)?,
            processor_count: reader.u32_at(PROCESSOR_COUNT_OFFSET)?,
            bugcheck_code: reader.u32_at(BUGCHECK_CODE_OFFSET)?,
            bugcheck_parameters,
            system_time,
            context,
        })
    }
}

/// Decoder for `PAGEDU64` kernel memory dumps.
///
/// Only the header is interpreted. Modules and stacks would require walking
/// kernel structures through the page tables, so both come back empty.
#[derive(Debug)]
pub struct KernelDumpDecoder {
    header: KernelHeader,
    file_modified: Option<DateTime<Utc>>,
}

impl KernelDumpDecoder {
    pub fn new(data: Vec<u8>, file_modified: Option<DateTime<Utc>>) -> Result<Self, DumpError> {
        let header = KernelHeader::parse(&data)?;
        debug!(
            bugcheck = format_args!("{:#x}", header.bugcheck_code),
            machine = format_args!("{:#x}", header.machine_type),
            processors = header.processor_count,
            "parsed kernel dump header"
        );
        Ok(Self { header, file_modified })
    }

    pub fn header(&self) -> &KernelHeader {
        &self.header
    }

    /// Register state of the crashing processor, when recorded.
    pub fn registers(&self) -> Option<&RegisterContext> {
        self.header.context.as_ref()
    }
}

impl DumpDecoder for KernelDumpDecoder {
    fn format(&self) -> DumpFormat {
        DumpFormat::KernelDump64
    }

    fn system_info(&self) -> SystemInfo {
        let timestamp = match (self.header.system_time, self.file_modified) {
            (Some(time), _) | (None, Some(time)) => time,
            (None, None) => {
                warn!("kernel dump has no capture time; using the epoch");
                DateTime::<Utc>::default()
            }
        };
        SystemInfo {
            architecture: CpuArchitecture::from_machine_type(self.header.machine_type),
            processor_count: self.header.processor_count,
            os_version: OsVersion {
                major: self.header.major_version,
                minor: self.header.minor_version,
                build: 0,
            },
            computer_name: String::new(),
            physical_memory: 0,
            timestamp,
        }
    }

    fn crash_info(&self, catalog: &dyn BugcheckCatalog) -> CrashInfo {
        let info = catalog.lookup(self.header.bugcheck_code);
        let parameters = self.header.bugcheck_parameters.to_vec();
        CrashInfo {
            bugcheck_code: self.header.bugcheck_code,
            bugcheck_name: info.name,
            description: info.description,
            crash_address: parameters[0],
            parameters,
            thread_id: 0,
        }
    }

    fn modules(&self) -> Vec<Module> {
        Vec::new()
    }

    fn exception(&self) -> Option<ExceptionRecord> {
        None
    }

    fn stack_traces(&self, _index: &ModuleIndex, _walker: &StackWalker) -> Vec<StackTrace> {
        Vec::new()
    }
}
