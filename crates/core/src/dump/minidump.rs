use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use super::{ByteReader, DumpDecoder, DumpError, Location, MINIDUMP_SIGNATURE};
use crate::analysis::{ModuleIndex, StackWalker, ThreadStack};
use crate::knowledge::BugcheckCatalog;
use crate::model::{
    CpuArchitecture, CrashInfo, DumpFormat, ExceptionRecord, Module, OsVersion, StackTrace,
    SystemInfo,
};

const HEADER_LEN: usize = 0x20;
const DIRECTORY_ENTRY_LEN: u64 = 12;

const THREAD_LIST_STREAM: u32 = 3;
const MODULE_LIST_STREAM: u32 = 4;
const EXCEPTION_STREAM: u32 = 6;
const SYSTEM_INFO_STREAM: u32 = 7;

const SYSTEM_INFO_LEN: usize = 0x20;
const THREAD_ENTRY_LEN: u64 = 0x30;
const MODULE_ENTRY_LEN: u64 = 0x6c;
const EXCEPTION_STREAM_LEN: usize = 0xa8;
const MAX_EXCEPTION_PARAMETERS: usize = 15;
/// Only the first few exception arguments are surfaced as crash parameters.
const CRASH_PARAMETER_COUNT: usize = 4;

/// Instruction pointer offsets inside the per-architecture `CONTEXT` record.
const X64_RIP_OFFSET: u64 = 0xf8;
const X86_EIP_OFFSET: u64 = 0xb8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct MinidumpHeader {
    version: u32,
    stream_count: u32,
    directory_rva: u32,
    time_date_stamp: u32,
    flags: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct StreamEntry {
    stream_type: u32,
    location: Location,
}

#[derive(Debug, Clone, Copy)]
struct ThreadRecord {
    thread_id: u32,
    stack_start: u64,
    stack: Location,
    context: Location,
}

/// Decoder for stream-directory minidumps (`MDMP`).
///
/// The header is validated eagerly. Streams are located through the directory
/// and decoded on demand; a missing or short stream yields defaults and a log
/// line rather than an error.
#[derive(Debug)]
pub struct MinidumpDecoder {
    data: Vec<u8>,
    header: MinidumpHeader,
    streams: Vec<StreamEntry>,
}

impl MinidumpDecoder {
    pub fn new(data: Vec<u8>) -> Result<Self, DumpError> {
        if data.len() < HEADER_LEN {
            return Err(DumpError::Truncated {
                offset: 0,
                needed: HEADER_LEN,
                available: data.len(),
            });
        }
        if !data.starts_with(MINIDUMP_SIGNATURE) {
            return Err(DumpError::InvalidSignature { bytes: data[..4].to_vec() });
        }

        let reader = ByteReader::new(&data);
        let header = MinidumpHeader {
            version: reader.u32_at(0x04)?,
            stream_count: reader.u32_at(0x08)?,
            directory_rva: reader.u32_at(0x0c)?,
            time_date_stamp: reader.u32_at(0x14)?,
            flags: reader.u64_at(0x18)?,
        };

        let mut streams = Vec::new();
        for i in 0..u64::from(header.stream_count) {
            let offset = u64::from(header.directory_rva) + i * DIRECTORY_ENTRY_LEN;
            let entry = reader
                .u32_at(offset)
                .and_then(|stream_type| Ok((stream_type, reader.location_at(offset + 4)?)));
            match entry {
                Ok((stream_type, location)) => streams.push(StreamEntry { stream_type, location }),
                Err(err) => {
                    warn!(%err, index = i, "stream directory is truncated");
                    break;
                }
            }
        }
        debug!(
            version = format_args!("{:#x}", header.version),
            flags = format_args!("{:#x}", header.flags),
            streams = streams.len(),
            "parsed minidump header"
        );

        Ok(Self { data, header, streams })
    }

    fn reader(&self) -> ByteReader<'_> {
        ByteReader::new(&self.data)
    }

    /// Location of the first stream of the given type.
    fn stream(&self, stream_type: u32) -> Option<Location> {
        let found = self.streams.iter().find(|s| s.stream_type == stream_type);
        if found.is_none() {
            debug!(stream_type, "minidump stream absent");
        }
        found.map(|s| s.location)
    }

    fn capture_time(&self) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(i64::from(self.header.time_date_stamp), 0)
            .unwrap_or_default()
    }

    fn architecture(&self) -> CpuArchitecture {
        self.system_info().architecture
    }

    /// Offsets of the entries in a `u32 count` + fixed-size entry list. The
    /// count is clamped to what fits in both the declared stream and the file.
    fn list_entries(&self, location: Location, entry_len: u64) -> impl Iterator<Item = u64> {
        let reader = self.reader();
        let declared = match reader.u32_at(u64::from(location.rva)) {
            Ok(count) => u64::from(count),
            Err(err) => {
                warn!(%err, "list stream too short for its count");
                0
            }
        };
        let first = u64::from(location.rva) + 4;
        let in_stream = u64::from(location.size).saturating_sub(4);
        let in_file = (self.data.len() as u64).saturating_sub(first);
        let fits = in_stream.min(in_file) / entry_len;
        if declared > fits {
            warn!(declared, fits, "list stream declares more entries than it holds");
        }
        (0..declared.min(fits)).map(move |i| first + i * entry_len)
    }

    fn threads(&self) -> Vec<ThreadRecord> {
        let Some(location) = self.stream(THREAD_LIST_STREAM) else {
            return Vec::new();
        };
        let reader = self.reader();
        let mut threads = Vec::new();
        for offset in self.list_entries(location, THREAD_ENTRY_LEN) {
            let record = (|| {
                Ok::<_, DumpError>(ThreadRecord {
                    thread_id: reader.u32_at(offset)?,
                    stack_start: reader.u64_at(offset + 0x18)?,
                    stack: reader.location_at(offset + 0x20)?,
                    context: reader.location_at(offset + 0x28)?,
                })
            })();
            match record {
                Ok(record) => threads.push(record),
                Err(err) => {
                    warn!(%err, "thread entry truncated");
                    break;
                }
            }
        }
        threads
    }

    fn instruction_pointer(&self, context: Location, arch: CpuArchitecture) -> Option<u64> {
        let offset = match arch {
            CpuArchitecture::X64 => X64_RIP_OFFSET,
            CpuArchitecture::X86 => X86_EIP_OFFSET,
            _ => return None,
        };
        let width = arch.pointer_width() as u64;
        if u64::from(context.size) < offset + width {
            return None;
        }
        let reader = self.reader();
        let at = u64::from(context.rva) + offset;
        let ip = match arch {
            CpuArchitecture::X86 => reader.u32_at(at).map(u64::from),
            _ => reader.u64_at(at),
        };
        ip.ok().filter(|&ip| ip != 0)
    }
}

impl DumpDecoder for MinidumpDecoder {
    fn format(&self) -> DumpFormat {
        DumpFormat::StructuredMinidump
    }

    fn system_info(&self) -> SystemInfo {
        let timestamp = self.capture_time();
        let fallback = SystemInfo { timestamp, ..SystemInfo::default() };
        let Some(location) = self.stream(SYSTEM_INFO_STREAM) else {
            return fallback;
        };
        let stream = match self.reader().slice(location) {
            Ok(stream) if stream.len() >= SYSTEM_INFO_LEN => ByteReader::new(stream),
            Ok(_) | Err(_) => {
                warn!("system info stream is truncated");
                return fallback;
            }
        };
        let parsed = (|| {
            Ok::<_, DumpError>(SystemInfo {
                architecture: CpuArchitecture::from_minidump_code(stream.u16_at(0x00)?),
                processor_count: u32::from(stream.u8_at(0x06)?),
                os_version: OsVersion {
                    major: stream.u32_at(0x08)?,
                    minor: stream.u32_at(0x0c)?,
                    build: stream.u32_at(0x10)?,
                },
                computer_name: String::new(),
                physical_memory: 0,
                timestamp,
            })
        })();
        parsed.unwrap_or(fallback)
    }

    fn crash_info(&self, catalog: &dyn BugcheckCatalog) -> CrashInfo {
        let (code, parameters, crash_address, thread_id) = match self.exception() {
            Some(exception) => {
                let params =
                    exception.parameters.iter().take(CRASH_PARAMETER_COUNT).copied().collect();
                (exception.code, params, exception.address, exception.thread_id)
            }
            None => (0, Vec::new(), 0, 0),
        };
        let info = catalog.lookup(code);
        CrashInfo {
            bugcheck_code: code,
            bugcheck_name: info.name,
            description: info.description,
            parameters,
            crash_address,
            thread_id,
        }
    }

    fn modules(&self) -> Vec<Module> {
        let Some(location) = self.stream(MODULE_LIST_STREAM) else {
            return Vec::new();
        };
        let reader = self.reader();
        let mut modules = Vec::new();
        for offset in self.list_entries(location, MODULE_ENTRY_LEN) {
            let fields = (|| {
                Ok::<_, DumpError>((
                    reader.u64_at(offset)?,
                    reader.u32_at(offset + 0x08)?,
                    reader.u32_at(offset + 0x10)?,
                    reader.u32_at(offset + 0x14)?,
                ))
            })();
            let (base, size, timestamp, name_rva) = match fields {
                Ok(fields) => fields,
                Err(err) => {
                    warn!(%err, "module entry truncated");
                    break;
                }
            };
            let path = reader.utf16_string_at(u64::from(name_rva)).unwrap_or_else(|err| {
                warn!(%err, base = format_args!("{base:#x}"), "unreadable module name");
                format!("module@{base:#x}")
            });
            modules.push(Module::from_path(path, base, u64::from(size), timestamp));
        }
        modules
    }

    fn exception(&self) -> Option<ExceptionRecord> {
        let location = self.stream(EXCEPTION_STREAM)?;
        let stream = match self.reader().slice(location) {
            Ok(stream) if stream.len() >= EXCEPTION_STREAM_LEN => ByteReader::new(stream),
            Ok(_) | Err(_) => {
                warn!("exception stream is truncated");
                return None;
            }
        };
        let parsed = (|| {
            let count = (stream.u32_at(0x20)? as usize).min(MAX_EXCEPTION_PARAMETERS);
            let mut parameters = Vec::with_capacity(count);
            for i in 0..count {
                parameters.push(stream.u64_at(0x28 + 8 * i as u64)?);
            }
            Ok::<_, DumpError>(ExceptionRecord {
                thread_id: stream.u32_at(0x00)?,
                code: stream.u32_at(0x08)?,
                flags: stream.u32_at(0x0c)?,
                address: stream.u64_at(0x18)?,
                parameters,
            })
        })();
        parsed.ok()
    }

    fn stack_traces(&self, index: &ModuleIndex, walker: &StackWalker) -> Vec<StackTrace> {
        let arch = self.architecture();
        let reader = self.reader();
        let mut traces = Vec::new();
        for thread in self.threads() {
            let memory: &[u8] = match reader.slice(thread.stack) {
                Ok(memory) => memory,
                Err(err) => {
                    warn!(%err, thread_id = thread.thread_id, "thread stack memory unavailable");
                    continue;
                }
            };
            let stack = ThreadStack {
                thread_id: thread.thread_id,
                stack_start: thread.stack_start,
                memory,
                instruction_pointer: self.instruction_pointer(thread.context, arch),
                pointer_width: arch.pointer_width(),
            };
            if let Some(trace) = walker.walk(&stack, index) {
                traces.push(trace);
            }
        }
        traces
    }
}
