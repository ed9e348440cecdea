//! Shared types between the eBPF (kernel) program and userspace
//!
//! This crate defines:
//! - `OomKillEvent`, the fixed-size record exported through the ring buffer
//! - `TaskOffsets`, the kernel struct layout table resolved from BTF
//! - the mark-victim handler, written against small traits so the same
//!   logic runs inside the eBPF program and in userspace tests
//!
//! Everything here is `no_std` unless the `userspace` feature is enabled.

#![cfg_attr(not(feature = "userspace"), no_std)]

pub mod offsets;
pub mod probe;
pub mod task;

pub use offsets::TaskOffsets;

/// Ring buffer size in bytes. One record costs 32 bytes including the ring
/// header, so a full buffer holds 8192 undrained events.
pub const RING_BUF_SIZE: u32 = 256 * 1024;

/// Maximum number of live entries in the kill ledger map.
pub const KILL_LEDGER_CAPACITY: u32 = 8192;

/// Name of the eBPF program, as seen by the loader.
pub const PROGRAM_NAME: &str = "oomkill";

/// Tracepoint category and name the program attaches to.
pub const TRACEPOINT_CATEGORY: &str = "oom";
pub const TRACEPOINT_NAME: &str = "mark_victim";

/// Map and global names shared with the loader.
pub const EVENTS_MAP: &str = "EVENTS";
pub const KILL_LEDGER_MAP: &str = "KILL_LEDGER";
pub const TASK_OFFSETS_GLOBAL: &str = "TASK_OFFSETS";

/// Record emitted when the kernel marks a task as the OOM victim.
///
/// Layout (24 bytes total, 8-byte aligned, native endian):
/// - pid: tgid of the task running the tracepoint (upper half of pid_tgid)
/// - ppid: tgid of `task->real_parent`
/// - highwater_rss: `task->mm->hiwater_rss`, in pages
/// - exit_code: `task->exit_code`, raw bit pattern of the kernel `int`
#[repr(C)]
#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "userspace", derive(PartialEq, Eq))]
pub struct OomKillEvent {
    pub pid: u32,
    pub ppid: u32,
    pub highwater_rss: u64,
    pub exit_code: u32,
    pub _padding: u32,
}

impl OomKillEvent {
    pub const SIZE: usize = core::mem::size_of::<OomKillEvent>();

    pub const fn new(pid: u32, ppid: u32, highwater_rss: u64, exit_code: u32) -> Self {
        Self {
            pid,
            ppid,
            highwater_rss,
            exit_code,
            _padding: 0,
        }
    }

    /// Encode in the in-memory layout the kernel side writes.
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out[0..4].copy_from_slice(&self.pid.to_ne_bytes());
        out[4..8].copy_from_slice(&self.ppid.to_ne_bytes());
        out[8..16].copy_from_slice(&self.highwater_rss.to_ne_bytes());
        out[16..20].copy_from_slice(&self.exit_code.to_ne_bytes());
        out[20..24].copy_from_slice(&self._padding.to_ne_bytes());
        out
    }

    /// Decode a raw ring buffer item. Returns `None` unless `raw` is exactly
    /// one record long.
    pub fn from_bytes(raw: &[u8]) -> Option<Self> {
        if raw.len() != Self::SIZE {
            return None;
        }
        let u32_at = |at: usize| {
            let mut word = [0u8; 4];
            word.copy_from_slice(&raw[at..at + 4]);
            u32::from_ne_bytes(word)
        };
        let mut rss = [0u8; 8];
        rss.copy_from_slice(&raw[8..16]);

        Some(Self {
            pid: u32_at(0),
            ppid: u32_at(4),
            highwater_rss: u64::from_ne_bytes(rss),
            exit_code: u32_at(16),
            _padding: u32_at(20),
        })
    }

    /// `exit_code` as the signed value the kernel stores.
    pub fn exit_code_signed(&self) -> i32 {
        self.exit_code as i32
    }
}

/// Extract the process id (tgid) from a `bpf_get_current_pid_tgid` value.
/// The thread id in the lower half is discarded.
#[inline(always)]
pub const fn tgid_of(pid_tgid: u64) -> u32 {
    (pid_tgid >> 32) as u32
}

#[cfg(all(feature = "userspace", target_os = "linux"))]
unsafe impl aya::Pod for OomKillEvent {}

const _: () = {
    assert!(
        core::mem::size_of::<OomKillEvent>() == 24,
        "OomKillEvent must be exactly 24 bytes"
    );
    assert!(
        core::mem::align_of::<OomKillEvent>() == 8,
        "OomKillEvent must be 8-byte aligned"
    );
};
