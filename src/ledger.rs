//! Bounded kill ledger
//!
//! Userspace counterpart of the probe's `KILL_LEDGER` hash map: a concurrent
//! `pid -> timestamp` table with a hard capacity. It follows the kernel map's
//! `BPF_ANY` behaviour: existing keys are always overwritten, a new key on a
//! full table is rejected, nothing is evicted.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use oomkill_common::probe::{KillLedger, LedgerFull};
use oomkill_common::KILL_LEDGER_CAPACITY;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Thread-safe bounded map from pid to kill timestamp (ns)
#[derive(Clone)]
pub struct BoundedLedger {
    inner: Arc<DashMap<u32, u64>>,
    len: Arc<AtomicUsize>,
    capacity: usize,
}

impl BoundedLedger {
    /// Create a ledger sized like the kernel map
    pub fn new() -> Self {
        Self::with_capacity(KILL_LEDGER_CAPACITY as usize)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::new(DashMap::with_capacity(capacity)),
            len: Arc::new(AtomicUsize::new(0)),
            capacity,
        }
    }

    /// Insert or overwrite `pid`. Fails only for a new pid on a full ledger.
    pub fn upsert(&self, pid: u32, timestamp_ns: u64) -> Result<(), LedgerFull> {
        match self.inner.entry(pid) {
            Entry::Occupied(mut entry) => {
                entry.insert(timestamp_ns);
                Ok(())
            }
            Entry::Vacant(entry) => {
                if self.len.fetch_add(1, Ordering::AcqRel) >= self.capacity {
                    self.len.fetch_sub(1, Ordering::AcqRel);
                    return Err(LedgerFull);
                }
                entry.insert(timestamp_ns);
                Ok(())
            }
        }
    }

    /// Look up the timestamp recorded for `pid`
    pub fn get(&self, pid: u32) -> Option<u64> {
        self.inner.get(&pid).map(|r| *r)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Snapshot of all entries, ordered by pid
    pub fn entries(&self) -> Vec<(u32, u64)> {
        let mut entries: Vec<_> = self.inner.iter().map(|r| (*r.key(), *r.value())).collect();
        entries.sort_unstable();
        entries
    }
}

impl Default for BoundedLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl KillLedger for BoundedLedger {
    fn upsert(&self, pid: u32, timestamp_ns: u64) -> Result<(), LedgerFull> {
        BoundedLedger::upsert(self, pid, timestamp_ns)
    }
}
