//! Byte-level builders for synthetic dump files used across the core tests.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

pub const ARCH_X86: u16 = 0;
pub const ARCH_X64: u16 = 9;

const CONTEXT_LEN: usize = 0x4d0;

fn put_u16(buf: &mut [u8], offset: usize, value: u16) {
    buf[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

fn put_u32(buf: &mut [u8], offset: usize, value: u32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

fn put_u64(buf: &mut [u8], offset: usize, value: u64) {
    buf[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
}

/// Append `bytes` to `buf` and return their offset.
fn append(buf: &mut Vec<u8>, bytes: &[u8]) -> u32 {
    let rva = buf.len() as u32;
    buf.extend_from_slice(bytes);
    rva
}

#[derive(Debug, Clone)]
pub struct TestThread {
    pub id: u32,
    pub stack_start: u64,
    pub words: Vec<u64>,
    pub ip: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct TestException {
    pub thread_id: u32,
    pub code: u32,
    pub flags: u32,
    pub address: u64,
    pub params: Vec<u64>,
}

/// Builds a minimal `MDMP` image with optional sysinfo, module, thread and
/// exception streams.
#[derive(Debug, Clone)]
pub struct MinidumpBuilder {
    pub arch: Option<u16>,
    pub processors: u8,
    pub version: (u32, u32, u32),
    pub timestamp: u32,
    pub modules: Vec<(String, u64, u32)>,
    pub threads: Vec<TestThread>,
    pub exception: Option<TestException>,
}

impl Default for MinidumpBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl MinidumpBuilder {
    pub fn new() -> Self {
        Self {
            arch: Some(ARCH_X64),
            processors: 8,
            version: (10, 0, 19045),
            timestamp: 1_700_000_000,
            modules: Vec::new(),
            threads: Vec::new(),
            exception: None,
        }
    }

    pub fn arch(mut self, arch: Option<u16>) -> Self {
        self.arch = arch;
        self
    }

    pub fn timestamp(mut self, timestamp: u32) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn module(mut self, path: &str, base: u64, size: u32) -> Self {
        self.modules.push((path.to_string(), base, size));
        self
    }

    pub fn thread(mut self, id: u32, stack_start: u64, words: &[u64]) -> Self {
        self.threads.push(TestThread { id, stack_start, words: words.to_vec(), ip: None });
        self
    }

    pub fn thread_with_ip(mut self, id: u32, stack_start: u64, words: &[u64], ip: u64) -> Self {
        self.threads.push(TestThread { id, stack_start, words: words.to_vec(), ip: Some(ip) });
        self
    }

    pub fn exception(mut self, code: u32, address: u64, thread_id: u32, params: &[u64]) -> Self {
        self.exception =
            Some(TestException { thread_id, code, flags: 0, address, params: params.to_vec() });
        self
    }

    fn word_width(&self) -> usize {
        match self.arch {
            Some(ARCH_X86) => 4,
            _ => 8,
        }
    }

    pub fn build(&self) -> Vec<u8> {
        let stream_count = usize::from(self.arch.is_some())
            + usize::from(!self.modules.is_empty())
            + usize::from(!self.threads.is_empty())
            + usize::from(self.exception.is_some());
        let dir_rva = 0x20usize;
        let mut buf = vec![0u8; dir_rva + 12 * stream_count];
        buf[..4].copy_from_slice(b"MDMP");
        put_u32(&mut buf, 0x04, 0xa793);
        put_u32(&mut buf, 0x08, stream_count as u32);
        put_u32(&mut buf, 0x0c, dir_rva as u32);
        put_u32(&mut buf, 0x14, self.timestamp);

        let mut directory: Vec<(u32, u32, u32)> = Vec::new();

        if let Some(arch) = self.arch {
            let mut body = vec![0u8; 0x38];
            put_u16(&mut body, 0x00, arch);
            body[0x06] = self.processors;
            put_u32(&mut body, 0x08, self.version.0);
            put_u32(&mut body, 0x0c, self.version.1);
            put_u32(&mut body, 0x10, self.version.2);
            put_u32(&mut body, 0x14, 2);
            let rva = append(&mut buf, &body);
            directory.push((7, body.len() as u32, rva));
        }

        if !self.modules.is_empty() {
            let mut name_rvas = Vec::new();
            for (name, _, _) in &self.modules {
                let units: Vec<u8> = name.encode_utf16().flat_map(|u| u.to_le_bytes()).collect();
                let mut blob = (units.len() as u32).to_le_bytes().to_vec();
                blob.extend_from_slice(&units);
                name_rvas.push(append(&mut buf, &blob));
            }
            let mut body = vec![0u8; 4 + 0x6c * self.modules.len()];
            put_u32(&mut body, 0, self.modules.len() as u32);
            for (i, ((_, base, size), name_rva)) in self.modules.iter().zip(&name_rvas).enumerate() {
                let at = 4 + 0x6c * i;
                put_u64(&mut body, at, *base);
                put_u32(&mut body, at + 0x08, *size);
                put_u32(&mut body, at + 0x10, 0x5f00_0000);
                put_u32(&mut body, at + 0x14, *name_rva);
            }
            let rva = append(&mut buf, &body);
            directory.push((4, body.len() as u32, rva));
        }

        if !self.threads.is_empty() {
            let width = self.word_width();
            let mut locations = Vec::new();
            for thread in &self.threads {
                let stack: Vec<u8> = thread
                    .words
                    .iter()
                    .flat_map(|w| w.to_le_bytes()[..width].to_vec())
                    .collect();
                let stack_rva = append(&mut buf, &stack);
                let context = thread.ip.map(|ip| {
                    let mut ctx = vec![0u8; CONTEXT_LEN];
                    if width == 4 {
                        put_u32(&mut ctx, 0xb8, ip as u32);
                    } else {
                        put_u64(&mut ctx, 0xf8, ip);
                    }
                    (CONTEXT_LEN as u32, append(&mut buf, &ctx))
                });
                locations.push(((stack.len() as u32, stack_rva), context.unwrap_or((0, 0))));
            }
            let mut body = vec![0u8; 4 + 0x30 * self.threads.len()];
            put_u32(&mut body, 0, self.threads.len() as u32);
            for (i, (thread, (stack, context))) in self.threads.iter().zip(&locations).enumerate() {
                let at = 4 + 0x30 * i;
                put_u32(&mut body, at, thread.id);
                put_u64(&mut body, at + 0x18, thread.stack_start);
                put_u32(&mut body, at + 0x20, stack.0);
                put_u32(&mut body, at + 0x24, stack.1);
                put_u32(&mut body, at + 0x28, context.0);
                put_u32(&mut body, at + 0x2c, context.1);
            }
            let rva = append(&mut buf, &body);
            directory.push((3, body.len() as u32, rva));
        }

        if let Some(exception) = &self.exception {
            let mut body = vec![0u8; 0xa8];
            put_u32(&mut body, 0x00, exception.thread_id);
            put_u32(&mut body, 0x08, exception.code);
            put_u32(&mut body, 0x0c, exception.flags);
            put_u64(&mut body, 0x18, exception.address);
            put_u32(&mut body, 0x20, exception.params.len() as u32);
            for (i, param) in exception.params.iter().take(15).enumerate() {
                put_u64(&mut body, 0x28 + 8 * i, *param);
            }
            let rva = append(&mut buf, &body);
            directory.push((6, body.len() as u32, rva));
        }

        for (i, (stream_type, size, rva)) in directory.into_iter().enumerate() {
            let at = dir_rva + 12 * i;
            put_u32(&mut buf, at, stream_type);
            put_u32(&mut buf, at + 4, size);
            put_u32(&mut buf, at + 8, rva);
        }
        buf
    }

    pub fn write(&self, dir: &Path, name: &str) -> PathBuf {
        write_bytes(dir, name, &self.build())
    }
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(bytes[offset..offset + 4].try_into().expect("four bytes"))
}

/// Offset of the directory entry describing `stream_type` in a minidump image.
pub fn stream_entry(bytes: &[u8], stream_type: u32) -> usize {
    let count = read_u32(bytes, 0x08) as usize;
    let dir = read_u32(bytes, 0x0c) as usize;
    (0..count)
        .map(|i| dir + 12 * i)
        .find(|&at| read_u32(bytes, at) == stream_type)
        .expect("stream present in directory")
}

/// `(size, rva)` of a stream in a minidump image.
pub fn stream_location(bytes: &[u8], stream_type: u32) -> (usize, usize) {
    let entry = stream_entry(bytes, stream_type);
    (read_u32(bytes, entry + 4) as usize, read_u32(bytes, entry + 8) as usize)
}

pub fn patch_u32(bytes: &mut [u8], offset: usize, value: u32) {
    put_u32(bytes, offset, value);
}

/// Builds the header page of a `PAGEDU64` kernel dump.
#[derive(Debug, Clone)]
pub struct KernelDumpBuilder {
    pub bugcheck_code: u32,
    pub parameters: [u64; 4],
    pub processors: u32,
    pub machine: u32,
    pub version: (u32, u32),
    /// `(rip, rsp)` written into the context block when set.
    pub registers: Option<(u64, u64)>,
    pub system_time: Option<u64>,
}

impl KernelDumpBuilder {
    pub fn new(bugcheck_code: u32) -> Self {
        Self {
            bugcheck_code,
            parameters: [0; 4],
            processors: 4,
            machine: 0x8664,
            version: (15, 19041),
            registers: None,
            system_time: None,
        }
    }

    pub fn parameters(mut self, parameters: [u64; 4]) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn registers(mut self, rip: u64, rsp: u64) -> Self {
        self.registers = Some((rip, rsp));
        self
    }

    pub fn system_time(mut self, filetime: u64) -> Self {
        self.system_time = Some(filetime);
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut buf = b"PAGE".repeat(0x2000 / 4);
        buf[..8].copy_from_slice(b"PAGEDU64");
        put_u32(&mut buf, 0x08, self.version.0);
        put_u32(&mut buf, 0x0c, self.version.1);
        put_u64(&mut buf, 0x10, 0x1aa000);
        put_u32(&mut buf, 0x30, self.machine);
        put_u32(&mut buf, 0x34, self.processors);
        put_u32(&mut buf, 0x40, self.bugcheck_code);
        for (i, param) in self.parameters.iter().enumerate() {
            put_u64(&mut buf, 0x44 + 8 * i, *param);
        }
        if let Some((rip, rsp)) = self.registers {
            buf[0x200..0x200 + CONTEXT_LEN].fill(0);
            put_u64(&mut buf, 0x200 + 0x78, 0x1111);
            put_u64(&mut buf, 0x200 + 0x98, rsp);
            put_u64(&mut buf, 0x200 + 0xf0, 0xf15);
            put_u64(&mut buf, 0x200 + 0xf8, rip);
        }
        if let Some(filetime) = self.system_time {
            put_u64(&mut buf, 0xfa8, filetime);
        }
        buf
    }

    pub fn write(&self, dir: &Path, name: &str) -> PathBuf {
        write_bytes(dir, name, &self.build())
    }
}

pub fn write_bytes(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, bytes).expect("write dump fixture");
    path
}

/// FILETIME for a Unix timestamp in seconds.
pub fn filetime_from_unix(secs: u64) -> u64 {
    secs * 10_000_000 + 116_444_736_000_000_000
}
