//! OOM victim probe
//!
//! Attaches to the `oom/mark_victim` tracepoint. Each firing records
//! `pid -> ktime` in `KILL_LEDGER` and pushes one `OomKillEvent` into the
//! `EVENTS` ring buffer. If the ring buffer is full the event is dropped; the
//! program always returns 0.
//!
//! `TASK_OFFSETS` is filled in by the loader from the running kernel's BTF.

#![no_std]
#![no_main]

use aya_ebpf::{
    macros::{map, tracepoint},
    maps::{HashMap, RingBuf},
    programs::TracePointContext,
};
use oomkill_common::{
    probe::handle_mark_victim, TaskOffsets, KILL_LEDGER_CAPACITY, RING_BUF_SIZE,
};
use oomkill_probes::{CurrentTask, HashMapLedger, RingBufChannel};

// Some kernel helpers are only available to GPL-compatible programs.
#[link_section = "license"]
#[no_mangle]
static LICENSE: [u8; 13] = *b"Dual BSD/GPL\0";

#[map]
static KILL_LEDGER: HashMap<u32, u64> = HashMap::with_max_entries(KILL_LEDGER_CAPACITY, 0);

#[map]
static EVENTS: RingBuf = RingBuf::with_byte_size(RING_BUF_SIZE, 0);

#[no_mangle]
static TASK_OFFSETS: TaskOffsets = TaskOffsets::zeroed();

#[tracepoint]
pub fn oomkill(_ctx: TracePointContext) -> u32 {
    // SAFETY: read-only global patched by the loader before the program is
    // loaded; the volatile read keeps the compiler from folding the zeroes.
    let offsets = unsafe { core::ptr::read_volatile(&TASK_OFFSETS) };

    handle_mark_victim(
        &CurrentTask,
        &HashMapLedger(&KILL_LEDGER),
        &RingBufChannel(&EVENTS),
        &offsets,
    )
}

#[cfg(not(test))]
#[panic_handler]
fn panic(_info: &core::panic::PanicInfo) -> ! {
    loop {}
}
