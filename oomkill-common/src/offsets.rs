//! Kernel struct layout table
//!
//! The eBPF program cannot hardcode `task_struct`/`mm_struct` field offsets:
//! they differ between kernel builds. Userspace resolves them from the running
//! kernel's BTF and writes this table into the program's read-only
//! `TASK_OFFSETS` global before load.
//!
//! An offset of 0 means "not resolved"; the probe publishes 0 for any field
//! whose offset is missing instead of guessing.

/// Byte offsets of the fields the mark-victim handler reads.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
#[cfg_attr(feature = "userspace", derive(PartialEq, Eq))]
pub struct TaskOffsets {
    /// `task_struct.real_parent` (`struct task_struct *`)
    pub task_real_parent: u32,
    /// `task_struct.tgid` (`pid_t`)
    pub task_tgid: u32,
    /// `task_struct.mm` (`struct mm_struct *`)
    pub task_mm: u32,
    /// `task_struct.exit_code` (`int`)
    pub task_exit_code: u32,
    /// `mm_struct.hiwater_rss` (`unsigned long`)
    pub mm_hiwater_rss: u32,
    pub _padding: u32,
}

impl TaskOffsets {
    pub const fn zeroed() -> Self {
        Self {
            task_real_parent: 0,
            task_tgid: 0,
            task_mm: 0,
            task_exit_code: 0,
            mm_hiwater_rss: 0,
            _padding: 0,
        }
    }

    /// True once every field offset has been filled in.
    pub const fn is_resolved(&self) -> bool {
        self.task_real_parent != 0
            && self.task_tgid != 0
            && self.task_mm != 0
            && self.task_exit_code != 0
            && self.mm_hiwater_rss != 0
    }
}

#[cfg(all(feature = "userspace", target_os = "linux"))]
unsafe impl aya::Pod for TaskOffsets {}

const _: () = {
    assert!(
        core::mem::size_of::<TaskOffsets>() == 24,
        "TaskOffsets must be exactly 24 bytes"
    );
};
