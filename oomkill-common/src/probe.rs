//! The `oom/mark_victim` handler
//!
//! Per firing:
//! 1. pid = upper half of the current pid_tgid
//! 2. upsert `pid -> ktime` into the kill ledger (overwrite, errors ignored)
//! 3. reserve one record in the event channel, or return if it is full
//! 4. read ppid, hiwater_rss and exit_code from the current task
//! 5. commit the record
//!
//! The handler never waits, never retries and always returns 0: it observes
//! the OOM killer, it must not slow it down or fail it.

use crate::offsets::TaskOffsets;
use crate::task::{KernelMemory, TaskView};
use crate::{tgid_of, OomKillEvent};

/// Execution context of the tracepoint firing.
pub trait KernelContext: KernelMemory {
    /// `bpf_get_current_pid_tgid`
    fn pid_tgid(&self) -> u64;

    /// `bpf_ktime_get_ns`
    fn ktime_ns(&self) -> u64;

    /// Address of the current `task_struct`.
    fn current_task(&self) -> u64;
}

/// The ledger rejected a new key because it is at capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerFull;

/// Bounded `pid -> latest kill timestamp` table.
///
/// `upsert` overwrites unconditionally. A new key on a full table may fail;
/// callers treat that as best effort.
pub trait KillLedger {
    fn upsert(&self, pid: u32, timestamp_ns: u64) -> Result<(), LedgerFull>;
}

/// A slot handed out by `EventChannel::reserve`, exclusively owned until
/// committed.
pub trait EventSlot {
    /// Write the whole record and publish it to the consumer.
    fn commit(self, event: OomKillEvent);
}

/// Bounded reserve/commit queue towards userspace.
pub trait EventChannel {
    type Slot: EventSlot;

    /// Reserve space for one `OomKillEvent`. `None` means the channel is full
    /// and the event must be dropped.
    fn reserve(&self) -> Option<Self::Slot>;
}

/// Handle one mark-victim firing. Always returns 0.
#[inline(always)]
pub fn handle_mark_victim<K, L, C>(
    kernel: &K,
    ledger: &L,
    channel: &C,
    offsets: &TaskOffsets,
) -> u32
where
    K: KernelContext,
    L: KillLedger,
    C: EventChannel,
{
    let pid = tgid_of(kernel.pid_tgid());
    let timestamp_ns = kernel.ktime_ns();

    // A full ledger loses the entry, not the event.
    let _ = ledger.upsert(pid, timestamp_ns);

    let slot = match channel.reserve() {
        Some(slot) => slot,
        None => return 0,
    };

    let task = TaskView::new(kernel, kernel.current_task(), offsets);
    slot.commit(OomKillEvent::new(
        pid,
        task.parent_tgid(),
        task.hiwater_rss(),
        task.exit_code(),
    ));

    0
}
