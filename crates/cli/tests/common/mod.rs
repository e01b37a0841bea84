//! Tiny dump writers for driving the binary end to end.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

fn put_u32(buf: &mut [u8], offset: usize, value: u32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

fn put_u64(buf: &mut [u8], offset: usize, value: u64) {
    buf[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
}

/// Kernel dump header page with the given bugcheck code.
pub fn kernel_dump(code: u32) -> Vec<u8> {
    let mut buf = b"PAGE".repeat(0x800);
    buf[..8].copy_from_slice(b"PAGEDU64");
    put_u32(&mut buf, 0x08, 15);
    put_u32(&mut buf, 0x0c, 19041);
    put_u32(&mut buf, 0x30, 0x8664);
    put_u32(&mut buf, 0x34, 4);
    put_u32(&mut buf, 0x40, code);
    put_u64(&mut buf, 0x44, 0xffff_8000_0000_1000);
    buf
}

/// x64 minidump with one `nvlddmkm.sys` module at 0x1000 and one thread
/// whose stack holds a return address inside it.
pub fn nvidia_minidump() -> Vec<u8> {
    // Layout: header, 3 directory entries, then name, stack, and stream bodies.
    let dir_rva = 0x20;
    let mut buf = vec![0u8; dir_rva + 3 * 12];
    buf[..4].copy_from_slice(b"MDMP");
    put_u32(&mut buf, 0x04, 0xa793);
    put_u32(&mut buf, 0x08, 3);
    put_u32(&mut buf, 0x0c, dir_rva as u32);
    put_u32(&mut buf, 0x14, 1_700_000_000);

    let name: Vec<u8> = "nvlddmkm.sys".encode_utf16().flat_map(|u| u.to_le_bytes()).collect();
    let name_rva = buf.len();
    buf.extend_from_slice(&(name.len() as u32).to_le_bytes());
    buf.extend_from_slice(&name);

    let stack_rva = buf.len();
    for word in [0u64, 0x1200, 0x7] {
        buf.extend_from_slice(&word.to_le_bytes());
    }

    let sys_rva = buf.len();
    buf.resize(sys_rva + 0x38, 0);
    buf[sys_rva] = 9;
    buf[sys_rva + 6] = 8;
    put_u32(&mut buf, sys_rva + 0x08, 10);
    put_u32(&mut buf, sys_rva + 0x10, 19045);

    let modules_rva = buf.len();
    buf.resize(modules_rva + 4 + 0x6c, 0);
    put_u32(&mut buf, modules_rva, 1);
    put_u64(&mut buf, modules_rva + 4, 0x1000);
    put_u32(&mut buf, modules_rva + 4 + 0x08, 0x500);
    put_u32(&mut buf, modules_rva + 4 + 0x14, name_rva as u32);

    let threads_rva = buf.len();
    buf.resize(threads_rva + 4 + 0x30, 0);
    put_u32(&mut buf, threads_rva, 1);
    put_u32(&mut buf, threads_rva + 4, 1);
    put_u64(&mut buf, threads_rva + 4 + 0x18, 0x7000);
    put_u32(&mut buf, threads_rva + 4 + 0x20, 24);
    put_u32(&mut buf, threads_rva + 4 + 0x24, stack_rva as u32);

    for (i, (kind, size, rva)) in [
        (7u32, 0x38u32, sys_rva),
        (4, 4 + 0x6c, modules_rva),
        (3, 4 + 0x30, threads_rva),
    ]
    .into_iter()
    .enumerate()
    {
        let at = dir_rva + 12 * i;
        put_u32(&mut buf, at, kind);
        put_u32(&mut buf, at + 4, size);
        put_u32(&mut buf, at + 8, rva as u32);
    }
    buf
}

pub fn write(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, bytes).expect("write fixture");
    path
}
