//! Dump file detection and decoding.
//!
//! The entry point is [`open_dump`]: it sniffs the first bytes of the file,
//! picks the matching decoder and hands back a [`DumpDecoder`] trait object.
//! Decoders validate their own header up front; anything missing or damaged
//! past the header degrades to empty or default values instead of failing.

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::debug;

use crate::analysis::{ModuleIndex, StackWalker};
use crate::knowledge::BugcheckCatalog;
use crate::model::{CrashInfo, DumpFormat, ExceptionRecord, Module, StackTrace, SystemInfo};

pub mod kernel;
pub mod minidump;
pub mod reader;

pub use kernel::{KernelDumpDecoder, KernelHeader, RegisterContext};
pub use minidump::MinidumpDecoder;
pub use reader::{ByteReader, Location};

/// `MDMP` as the leading four bytes of a structured minidump.
pub const MINIDUMP_SIGNATURE: &[u8; 4] = b"MDMP";
/// Leading eight bytes of a 64-bit kernel memory dump.
pub const KERNEL_DUMP64_SIGNATURE: &[u8; 8] = b"PAGEDU64";
/// Leading eight bytes of a 32-bit kernel memory dump.
pub const KERNEL_DUMP32_SIGNATURE: &[u8; 8] = b"PAGEDU48";

/// Number of leading bytes inspected by format detection.
pub const SIGNATURE_LEN: usize = 8;

#[derive(Debug, Error)]
pub enum DumpError {
    #[error("Dump file not found at {}", .0.display())]
    NotFound(PathBuf),
    #[error("Dump file is empty: {}", .0.display())]
    EmptyFile(PathBuf),
    #[error("Invalid dump signature: {}", format_signature(.bytes))]
    InvalidSignature { bytes: Vec<u8> },
    #[error("Unsupported dump format: {0}")]
    UnsupportedFormat(String),
    #[error("Dump truncated: needed {needed} bytes at offset {offset:#x} but only {available} available")]
    Truncated { offset: u64, needed: usize, available: usize },
    #[error("Failed to read dump: {0}")]
    Io(#[from] io::Error),
}

fn format_signature(bytes: &[u8]) -> String {
    let hex: Vec<String> = bytes.iter().map(|b| format!("{b:02x}")).collect();
    let ascii: String =
        bytes.iter().map(|&b| if b.is_ascii_graphic() { b as char } else { '.' }).collect();
    format!("{} ({ascii})", hex.join(" "))
}

/// Decoder over one dump image.
///
/// Implementations own the bytes they decode and are immutable after
/// construction, so a decoder can be shared across threads.
pub trait DumpDecoder: Send + Sync {
    fn format(&self) -> DumpFormat;
    fn system_info(&self) -> SystemInfo;
    /// Crash summary; names and descriptions are filled from `catalog`.
    fn crash_info(&self, catalog: &dyn BugcheckCatalog) -> CrashInfo;
    /// Loaded modules in the order the dump lists them.
    fn modules(&self) -> Vec<Module>;
    fn exception(&self) -> Option<ExceptionRecord>;
    /// One trace per thread that produced at least one frame.
    fn stack_traces(&self, index: &ModuleIndex, walker: &StackWalker) -> Vec<StackTrace>;
}

/// Classify a file by its leading signature bytes.
pub fn detect_format(path: &Path) -> Result<DumpFormat, DumpError> {
    let signature = read_signature(path)?;
    let format = detect_signature(&signature)?;
    debug!(path = %path.display(), %format, "detected dump format");
    Ok(format)
}

/// Classify an in-memory signature (up to [`SIGNATURE_LEN`] bytes).
pub fn detect_signature(bytes: &[u8]) -> Result<DumpFormat, DumpError> {
    if bytes.starts_with(MINIDUMP_SIGNATURE) {
        Ok(DumpFormat::StructuredMinidump)
    } else if bytes.starts_with(KERNEL_DUMP64_SIGNATURE) {
        Ok(DumpFormat::KernelDump64)
    } else if bytes.starts_with(KERNEL_DUMP32_SIGNATURE) {
        Ok(DumpFormat::KernelDump32)
    } else {
        let len = bytes.len().min(SIGNATURE_LEN);
        Err(DumpError::InvalidSignature { bytes: bytes[..len].to_vec() })
    }
}

fn check_file(path: &Path) -> Result<fs::Metadata, DumpError> {
    let metadata = match fs::metadata(path) {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            return Err(DumpError::NotFound(path.to_path_buf()))
        }
        Err(err) => return Err(err.into()),
    };
    if metadata.is_file() && metadata.len() == 0 {
        return Err(DumpError::EmptyFile(path.to_path_buf()));
    }
    Ok(metadata)
}

fn read_prefix(path: &Path, limit: u64) -> Result<Vec<u8>, DumpError> {
    let mut buf = Vec::new();
    fs::File::open(path)?.take(limit).read_to_end(&mut buf)?;
    Ok(buf)
}

fn read_signature(path: &Path) -> Result<Vec<u8>, DumpError> {
    check_file(path)?;
    read_prefix(path, SIGNATURE_LEN as u64)
}

/// Build the decoder matching `format` over an in-memory image.
///
/// `modified` is the file modification time, used by formats that do not
/// record a capture time of their own.
pub fn decoder_for(
    format: DumpFormat,
    data: Vec<u8>,
    modified: Option<DateTime<Utc>>,
) -> Result<Box<dyn DumpDecoder>, DumpError> {
    match format {
        DumpFormat::StructuredMinidump => Ok(Box::new(MinidumpDecoder::new(data)?)),
        DumpFormat::KernelDump64 => Ok(Box::new(KernelDumpDecoder::new(data, modified)?)),
        DumpFormat::KernelDump32 => Err(DumpError::UnsupportedFormat(
            "32-bit kernel memory dumps (PAGEDU48) are not supported".to_string(),
        )),
    }
}

/// A dump file opened for decoding.
pub struct OpenedDump {
    pub path: PathBuf,
    pub file_size: u64,
    pub decoder: Box<dyn DumpDecoder>,
}

/// Detect the format of `path`, load the bytes the decoder needs and build it.
///
/// Kernel dumps only have their header page loaded; the physical memory that
/// follows is never read.
pub fn open_dump(path: &Path) -> Result<OpenedDump, DumpError> {
    let metadata = check_file(path)?;
    let format = detect_format(path)?;
    let data = match format {
        DumpFormat::StructuredMinidump => fs::read(path)?,
        DumpFormat::KernelDump64 | DumpFormat::KernelDump32 => {
            read_prefix(path, kernel::HEADER_PAGE_LEN as u64)?
        }
    };
    let modified = metadata.modified().ok().map(DateTime::<Utc>::from);
    let decoder = decoder_for(format, data, modified)?;
    Ok(OpenedDump { path: path.to_path_buf(), file_size: metadata.len(), decoder })
}
