//! eBPF side of oomkill
//!
//! Adapts aya's helpers and maps to the traits the mark-victim handler in
//! `oomkill-common` is written against:
//! - `CurrentTask`: pid_tgid, ktime, current task and `bpf_probe_read_kernel`
//! - `HashMapLedger`: the `KILL_LEDGER` hash map
//! - `RingBufChannel`: the `EVENTS` ring buffer
//!
//! The program itself lives in src/bin/oomkill.rs and must be built for the
//! bpfel-unknown-none target (the root crate's build.rs does that).

#![no_std]

use aya_ebpf::{
    bindings::BPF_ANY,
    helpers::{
        bpf_get_current_pid_tgid, bpf_get_current_task, bpf_ktime_get_ns, bpf_probe_read_kernel,
    },
    maps::{ring_buf::RingBufEntry, HashMap, RingBuf},
};
use oomkill_common::{
    probe::{EventChannel, EventSlot, KernelContext, KillLedger, LedgerFull},
    task::KernelMemory,
    OomKillEvent,
};

/// The task executing the tracepoint.
pub struct CurrentTask;

impl KernelMemory for CurrentTask {
    #[inline(always)]
    fn read<T: Copy>(&self, addr: u64) -> Option<T> {
        // SAFETY: bpf_probe_read_kernel validates the address and fails
        // instead of faulting.
        unsafe { bpf_probe_read_kernel(addr as *const T).ok() }
    }
}

impl KernelContext for CurrentTask {
    #[inline(always)]
    fn pid_tgid(&self) -> u64 {
        bpf_get_current_pid_tgid()
    }

    #[inline(always)]
    fn ktime_ns(&self) -> u64 {
        // SAFETY: bpf_ktime_get_ns is always safe to call from eBPF context
        unsafe { bpf_ktime_get_ns() }
    }

    #[inline(always)]
    fn current_task(&self) -> u64 {
        // SAFETY: returns the address of the current task_struct; it is only
        // ever dereferenced through bpf_probe_read_kernel.
        unsafe { bpf_get_current_task() }
    }
}

/// `pid -> ktime` hash map, written with `BPF_ANY`.
pub struct HashMapLedger<'a>(pub &'a HashMap<u32, u64>);

impl KillLedger for HashMapLedger<'_> {
    #[inline(always)]
    fn upsert(&self, pid: u32, timestamp_ns: u64) -> Result<(), LedgerFull> {
        self.0
            .insert(&pid, &timestamp_ns, BPF_ANY as u64)
            .map_err(|_| LedgerFull)
    }
}

/// Ring buffer carrying `OomKillEvent` records.
pub struct RingBufChannel<'a>(pub &'a RingBuf);

pub struct RingBufSlot(RingBufEntry<OomKillEvent>);

impl EventSlot for RingBufSlot {
    #[inline(always)]
    fn commit(mut self, event: OomKillEvent) {
        self.0.write(event);
        self.0.submit(0);
    }
}

impl EventChannel for RingBufChannel<'_> {
    type Slot = RingBufSlot;

    #[inline(always)]
    fn reserve(&self) -> Option<RingBufSlot> {
        self.0.reserve::<OomKillEvent>(0).map(RingBufSlot)
    }
}
