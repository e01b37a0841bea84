use tracing::debug;

use super::ModuleIndex;
use crate::model::{StackFrame, StackTrace, UNKNOWN_MODULE};

/// Hard upper bound on frames recovered per thread.
pub const MAX_STACK_FRAMES: usize = 50;

/// Raw inputs for walking one thread.
#[derive(Debug, Clone, Copy)]
pub struct ThreadStack<'a> {
    pub thread_id: u32,
    /// Virtual address of the first byte of `memory`.
    pub stack_start: u64,
    /// Captured stack bytes, lowest address first.
    pub memory: &'a [u8],
    /// Instruction pointer from the thread context, if one was captured.
    pub instruction_pointer: Option<u64>,
    /// Stack slot width: 4 on 32-bit targets, 8 otherwise.
    pub pointer_width: usize,
}

/// Heuristic stack walker.
///
/// Without unwind data the walker seeds the trace with the context's
/// instruction pointer, then scans pointer-aligned stack slots and keeps every
/// value that lands inside a loaded module as a return-address candidate.
#[derive(Debug, Clone, Copy)]
pub struct StackWalker {
    max_frames: usize,
}

impl Default for StackWalker {
    fn default() -> Self {
        Self { max_frames: MAX_STACK_FRAMES }
    }
}

impl StackWalker {
    /// Walker producing at most `max_frames` frames, clamped to `1..=MAX_STACK_FRAMES`.
    pub fn new(max_frames: usize) -> Self {
        Self { max_frames: max_frames.clamp(1, MAX_STACK_FRAMES) }
    }

    pub fn max_frames(&self) -> usize {
        self.max_frames
    }

    /// Walk one thread. Returns `None` when no frame could be produced.
    pub fn walk(&self, stack: &ThreadStack<'_>, index: &ModuleIndex) -> Option<StackTrace> {
        let mut frames = Vec::new();
        if let Some(ip) = stack.instruction_pointer {
            frames.push(make_frame(ip, index));
        }

        let width = match stack.pointer_width {
            4 | 8 => stack.pointer_width,
            _ => 8,
        };
        // Slots are aligned on the virtual address, not on the buffer start.
        let skew = (width - (stack.stack_start % width as u64) as usize) % width;
        let slots = stack.memory.get(skew..).unwrap_or(&[]).chunks_exact(width);
        for slot in slots {
            if frames.len() >= self.max_frames {
                break;
            }
            let value = match width {
                4 => u64::from(u32::from_le_bytes([slot[0], slot[1], slot[2], slot[3]])),
                _ => u64::from_le_bytes([
                    slot[0], slot[1], slot[2], slot[3], slot[4], slot[5], slot[6], slot[7],
                ]),
            };
            if index.lookup(value).is_some() {
                frames.push(make_frame(value, index));
            }
        }
        frames.truncate(self.max_frames);

        debug!(thread_id = stack.thread_id, frames = frames.len(), "walked thread stack");
        if frames.is_empty() {
            None
        } else {
            Some(StackTrace { thread_id: stack.thread_id, frames })
        }
    }
}

fn make_frame(address: u64, index: &ModuleIndex) -> StackFrame {
    match index.resolve(address) {
        Some((module, offset)) => {
            StackFrame { address, module: module.name.clone(), offset, symbol: None }
        }
        None => StackFrame { address, module: UNKNOWN_MODULE.to_string(), offset: 0, symbol: None },
    }
}
