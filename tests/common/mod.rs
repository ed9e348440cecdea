//! Synthetic kernel address space for driving the mark-victim handler

#![allow(dead_code)]

use oomkill::common::probe::KernelContext;
use oomkill::common::task::KernelMemory;
use oomkill::common::TaskOffsets;

pub const OFFSETS: TaskOffsets = TaskOffsets {
    task_real_parent: 16,
    task_tgid: 8,
    task_mm: 24,
    task_exit_code: 4,
    mm_hiwater_rss: 16,
    _padding: 0,
};

const TASK_SIZE: usize = 40;
const MM_SIZE: usize = 24;

pub const TASK_ADDR: u64 = 0xffff_8880_0000_1000;
pub const PARENT_ADDR: u64 = 0xffff_8880_0000_2000;
pub const MM_ADDR: u64 = 0xffff_8880_0000_3000;

/// One victim task, its parent and its mm, laid out per `OFFSETS`.
pub struct FakeTask {
    pub pid: u32,
    pub now: u64,
    task: [u8; TASK_SIZE],
    parent: [u8; TASK_SIZE],
    mm: [u8; MM_SIZE],
}

impl FakeTask {
    pub fn new(pid: u32, ppid: u32, hiwater_rss: u64, exit_code: i32) -> Self {
        let mut fake = Self {
            pid,
            now: 0,
            task: [0; TASK_SIZE],
            parent: [0; TASK_SIZE],
            mm: [0; MM_SIZE],
        };

        put(&mut fake.task, OFFSETS.task_tgid, &(pid as i32).to_ne_bytes());
        put(&mut fake.task, OFFSETS.task_exit_code, &exit_code.to_ne_bytes());
        put(&mut fake.task, OFFSETS.task_real_parent, &PARENT_ADDR.to_ne_bytes());
        put(&mut fake.task, OFFSETS.task_mm, &MM_ADDR.to_ne_bytes());
        put(&mut fake.parent, OFFSETS.task_tgid, &(ppid as i32).to_ne_bytes());
        put(&mut fake.mm, OFFSETS.mm_hiwater_rss, &hiwater_rss.to_ne_bytes());
        fake
    }

    pub fn at(mut self, now: u64) -> Self {
        self.now = now;
        self
    }

    /// Drop `task->mm`, as for a task whose address space is already gone.
    pub fn without_mm(mut self) -> Self {
        put(&mut self.task, OFFSETS.task_mm, &0u64.to_ne_bytes());
        self
    }

    fn region(&self, addr: u64) -> Option<(&[u8], usize)> {
        for (base, bytes) in [
            (TASK_ADDR, &self.task[..]),
            (PARENT_ADDR, &self.parent[..]),
            (MM_ADDR, &self.mm[..]),
        ] {
            if addr >= base && addr < base + bytes.len() as u64 {
                return Some((bytes, (addr - base) as usize));
            }
        }
        None
    }
}

fn put(buf: &mut [u8], offset: u32, bytes: &[u8]) {
    let offset = offset as usize;
    buf[offset..offset + bytes.len()].copy_from_slice(bytes);
}

impl KernelMemory for FakeTask {
    fn read<T: Copy>(&self, addr: u64) -> Option<T> {
        let (bytes, start) = self.region(addr)?;
        let end = start.checked_add(std::mem::size_of::<T>())?;
        if end > bytes.len() {
            return None;
        }
        // SAFETY: the range was bounds checked and T is plain data in every caller
        Some(unsafe { std::ptr::read_unaligned(bytes[start..end].as_ptr() as *const T) })
    }
}

impl KernelContext for FakeTask {
    fn pid_tgid(&self) -> u64 {
        ((self.pid as u64) << 32) | (self.pid as u64 + 7)
    }

    fn ktime_ns(&self) -> u64 {
        self.now
    }

    fn current_task(&self) -> u64 {
        TASK_ADDR
    }
}
