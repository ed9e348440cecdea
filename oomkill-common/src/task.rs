//! Reads of the current task's process descriptor
//!
//! All reads go through `KernelMemory`, which never faults: a failed read is
//! `None`. `TaskView` turns failed reads, null pointers and unresolved
//! offsets into 0 so a half torn-down task still yields a record.

use crate::offsets::TaskOffsets;

/// Non-faulting access to kernel memory.
///
/// In the eBPF program this is `bpf_probe_read_kernel`; in userspace tests it
/// is a synthetic address space.
pub trait KernelMemory {
    fn read<T: Copy>(&self, addr: u64) -> Option<T>;
}

/// A `task_struct` address plus the layout needed to walk it.
pub struct TaskView<'a, M: KernelMemory> {
    memory: &'a M,
    task: u64,
    offsets: &'a TaskOffsets,
}

impl<'a, M: KernelMemory> TaskView<'a, M> {
    pub fn new(memory: &'a M, task: u64, offsets: &'a TaskOffsets) -> Self {
        Self {
            memory,
            task,
            offsets,
        }
    }

    /// `task->real_parent->tgid`
    #[inline(always)]
    pub fn parent_tgid(&self) -> u32 {
        self.read_ptr(self.task, self.offsets.task_real_parent)
            .and_then(|parent| self.read_field::<i32>(parent, self.offsets.task_tgid))
            .map(|tgid| tgid as u32)
            .unwrap_or(0)
    }

    /// `task->mm->hiwater_rss`, 0 for tasks without an mm.
    #[inline(always)]
    pub fn hiwater_rss(&self) -> u64 {
        self.read_ptr(self.task, self.offsets.task_mm)
            .and_then(|mm| self.read_field::<u64>(mm, self.offsets.mm_hiwater_rss))
            .unwrap_or(0)
    }

    /// `task->exit_code`
    #[inline(always)]
    pub fn exit_code(&self) -> u32 {
        self.read_field::<i32>(self.task, self.offsets.task_exit_code)
            .map(|code| code as u32)
            .unwrap_or(0)
    }

    #[inline(always)]
    fn read_field<T: Copy>(&self, base: u64, offset: u32) -> Option<T> {
        if base == 0 || offset == 0 {
            return None;
        }
        self.memory.read(base.checked_add(offset as u64)?)
    }

    #[inline(always)]
    fn read_ptr(&self, base: u64, offset: u32) -> Option<u64> {
        match self.read_field::<u64>(base, offset)? {
            0 => None,
            addr => Some(addr),
        }
    }
}
