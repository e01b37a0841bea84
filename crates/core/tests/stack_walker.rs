use bsod_core::analysis::{ModuleIndex, StackWalker, ThreadStack, MAX_STACK_FRAMES};
use bsod_core::model::{Module, UNKNOWN_MODULE};

fn words64(values: &[u64]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn index() -> ModuleIndex {
    ModuleIndex::new(&[
        Module::from_path("ntoskrnl.exe", 0x10000, 0x10000, 0),
        Module::from_path("storport.sys", 0x40000, 0x1000, 0),
    ])
}

fn stack(memory: &[u8]) -> ThreadStack<'_> {
    ThreadStack {
        thread_id: 9,
        stack_start: 0x7000,
        memory,
        instruction_pointer: None,
        pointer_width: 8,
    }
}

#[test]
fn keeps_only_slots_that_land_in_modules() {
    let memory = words64(&[0, 0x10010, 0x7fff, 0x40020, 0x50000]);
    let trace = StackWalker::default().walk(&stack(&memory), &index()).expect("trace");

    assert_eq!(trace.thread_id, 9);
    let resolved: Vec<(&str, u64)> =
        trace.frames.iter().map(|f| (f.module.as_str(), f.offset)).collect();
    assert_eq!(resolved, vec![("ntoskrnl.exe", 0x10), ("storport.sys", 0x20)]);
    assert!(trace.frames.iter().all(|f| f.symbol.is_none()));
}

#[test]
fn instruction_pointer_seeds_the_trace_even_when_unresolved() {
    let memory = words64(&[0x10020]);
    let mut thread = stack(&memory);
    thread.instruction_pointer = Some(0xdead_beef);

    let trace = StackWalker::default().walk(&thread, &index()).expect("trace");
    assert_eq!(trace.frames.len(), 2);
    assert_eq!(trace.frames[0].address, 0xdead_beef);
    assert_eq!(trace.frames[0].module, UNKNOWN_MODULE);
    assert_eq!(trace.frames[0].offset, 0);
    assert!(!trace.frames[0].is_resolved());
    assert!(trace.frames[1].is_resolved());
}

#[test]
fn frames_are_capped_at_the_hard_limit() {
    let memory = words64(&vec![0x10008; 200]);
    let trace = StackWalker::new(500).walk(&stack(&memory), &index()).expect("trace");
    assert_eq!(trace.frames.len(), MAX_STACK_FRAMES);

    let trace = StackWalker::new(3).walk(&stack(&memory), &index()).expect("trace");
    assert_eq!(trace.frames.len(), 3);

    assert_eq!(StackWalker::new(0).max_frames(), 1);
}

#[test]
fn thread_without_resolvable_data_yields_no_trace() {
    let memory = words64(&[1, 2, 3]);
    assert!(StackWalker::default().walk(&stack(&memory), &index()).is_none());
    assert!(StackWalker::default().walk(&stack(&[]), &index()).is_none());
}

#[test]
fn slots_follow_virtual_address_alignment() {
    // Stack starts 4 bytes into an 8-byte slot: the first 4 bytes are skipped.
    let mut memory = vec![0xaa; 4];
    memory.extend(words64(&[0x40010]));
    let thread = ThreadStack { stack_start: 0x7004, ..stack(&memory) };

    let trace = StackWalker::default().walk(&thread, &index()).expect("trace");
    assert_eq!(trace.frames.len(), 1);
    assert_eq!(trace.frames[0].address, 0x40010);
}

#[test]
fn thirty_two_bit_stacks_use_four_byte_slots() {
    let memory: Vec<u8> =
        [0x10004u32, 0x9, 0x40008].iter().flat_map(|v| v.to_le_bytes()).collect();
    let thread = ThreadStack { pointer_width: 4, ..stack(&memory) };

    let trace = StackWalker::default().walk(&thread, &index()).expect("trace");
    let addresses: Vec<u64> = trace.frames.iter().map(|f| f.address).collect();
    assert_eq!(addresses, vec![0x10004, 0x40008]);
}
