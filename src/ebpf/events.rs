//! Decoding of records drained from the `EVENTS` ring buffer

use oomkill_common::OomKillEvent;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use tracing::warn;

/// Maximum number of ring buffer items handled per poll.
pub const MAX_BATCH_SIZE: usize = 1024;

/// Userspace view of one OOM victim record
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OomKill {
    pub pid: u32,
    pub ppid: u32,
    pub highwater_rss_pages: u64,
    pub highwater_rss_bytes: u64,
    pub exit_code: i32,
}

impl OomKill {
    pub fn from_event(event: &OomKillEvent, page_size: u64) -> Self {
        Self {
            pid: event.pid,
            ppid: event.ppid,
            highwater_rss_pages: event.highwater_rss,
            highwater_rss_bytes: event.highwater_rss.saturating_mul(page_size),
            exit_code: event.exit_code_signed(),
        }
    }

    pub const TEXT_HEADER: &'static str = "    PID    PPID  HIWATER_RSS        BYTES  EXIT_CODE";
}

impl fmt::Display for OomKill {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:>7} {:>7} {:>12} {:>12} {:>10}",
            self.pid,
            self.ppid,
            self.highwater_rss_pages,
            format_bytes(self.highwater_rss_bytes),
            self.exit_code
        )
    }
}

/// Events decoded from one poll of the ring buffer
#[derive(Debug, Default)]
pub struct EventBatch {
    events: Vec<OomKillEvent>,
    malformed: u64,
}

impl EventBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the batch reached `MAX_BATCH_SIZE` items
    pub fn is_full(&self) -> bool {
        self.events.len() + self.malformed as usize >= MAX_BATCH_SIZE
    }

    /// Decode one raw ring buffer item, skipping it if it has the wrong size
    pub fn push_raw(&mut self, raw: &[u8]) {
        match OomKillEvent::from_bytes(raw) {
            Some(event) => self.events.push(event),
            None => {
                self.malformed += 1;
                warn!(
                    "Malformed event: expected {} bytes, got {} bytes - skipping",
                    OomKillEvent::SIZE,
                    raw.len()
                );
            }
        }
    }

    pub fn events(&self) -> &[OomKillEvent] {
        &self.events
    }

    pub fn malformed(&self) -> u64 {
        self.malformed
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty() && self.malformed == 0
    }
}

/// Running totals over a trace session
#[derive(Debug, Default)]
pub struct TraceSummary {
    pub events: u64,
    pub malformed: u64,
    pub max_highwater_rss_pages: u64,
    victims: HashSet<u32>,
}

impl TraceSummary {
    pub fn record(&mut self, batch: &EventBatch) {
        self.malformed += batch.malformed();
        for event in batch.events() {
            self.events += 1;
            self.max_highwater_rss_pages = self.max_highwater_rss_pages.max(event.highwater_rss);
            self.victims.insert(event.pid);
        }
    }

    pub fn distinct_victims(&self) -> usize {
        self.victims.len()
    }
}

impl fmt::Display for TraceSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} OOM kill event(s), {} distinct victim(s), peak hiwater_rss {} pages, {} malformed",
            self.events,
            self.distinct_victims(),
            self.max_highwater_rss_pages,
            self.malformed
        )
    }
}

/// System page size, used to turn `hiwater_rss` pages into bytes
pub fn page_size() -> u64 {
    #[cfg(unix)]
    {
        // SAFETY: sysconf has no preconditions
        let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        if size > 0 {
            return size as u64;
        }
    }
    4096
}

pub fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{}B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1}KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1}MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.1}GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}
