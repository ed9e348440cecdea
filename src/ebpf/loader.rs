//! eBPF probe loader and lifecycle management

use super::events::EventBatch;
use crate::btf::{KernelBtf, VMLINUX_BTF};
use crate::{OomKillError, Result};
use aya::{
    include_bytes_aligned,
    maps::{HashMap, MapData, RingBuf},
    programs::TracePoint,
    Ebpf, EbpfLoader,
};
use oomkill_common::{
    TaskOffsets, EVENTS_MAP, KILL_LEDGER_MAP, PROGRAM_NAME, TASK_OFFSETS_GLOBAL,
    TRACEPOINT_CATEGORY, TRACEPOINT_NAME,
};
use std::path::Path;
use tracing::{info, warn};

/// Oldest kernel with BPF ring buffers.
pub const MIN_KERNEL_VERSION: (u32, u32) = (5, 8);

/// Manages the mark-victim probe lifecycle
pub struct ProbeManager {
    bpf: Ebpf,
    offsets: TaskOffsets,
}

impl ProbeManager {
    /// Resolve kernel offsets and load the probe with them baked in.
    ///
    /// `btf_path` overrides the running kernel's BTF.
    pub fn new(btf_path: Option<&str>) -> Result<Self> {
        run_preflight_checks(btf_path)?;

        let btf = match btf_path {
            Some(path) => KernelBtf::from_file(path)?,
            None => KernelBtf::from_sys_fs()?,
        };
        let offsets = btf.task_offsets()?;

        info!("Loading {} probe...", PROGRAM_NAME);
        let bpf = EbpfLoader::new()
            .set_global(TASK_OFFSETS_GLOBAL, &offsets, true)
            .load(include_bytes_aligned!(concat!(env!("OUT_DIR"), "/oomkill")))
            .map_err(|e| OomKillError::ProgramLoadFailed(e.to_string()))?;

        Ok(Self { bpf, offsets })
    }

    /// Attach the probe to `oom/mark_victim`
    pub fn attach(&mut self) -> Result<()> {
        info!(
            "Attaching probe to tracepoint {}/{}...",
            TRACEPOINT_CATEGORY, TRACEPOINT_NAME
        );

        let program: &mut TracePoint = self
            .bpf
            .program_mut(PROGRAM_NAME)
            .ok_or_else(|| {
                OomKillError::ProgramLoadFailed(format!(
                    "{} program not found in eBPF object",
                    PROGRAM_NAME
                ))
            })?
            .try_into()
            .map_err(|e: aya::programs::ProgramError| OomKillError::EbpfError(e.to_string()))?;

        program
            .load()
            .map_err(|e| OomKillError::ProgramLoadFailed(e.to_string()))?;

        program
            .attach(TRACEPOINT_CATEGORY, TRACEPOINT_NAME)
            .map_err(|e| OomKillError::AttachFailed(e.to_string()))?;

        info!("Probe attached");
        Ok(())
    }

    pub fn offsets(&self) -> &TaskOffsets {
        &self.offsets
    }

    /// Get the events ring buffer for polling OOM kill records
    pub fn events_ring_buf(&mut self) -> Result<RingBuf<&mut MapData>> {
        let available = self.map_names();
        let map = self
            .bpf
            .map_mut(EVENTS_MAP)
            .ok_or_else(|| OomKillError::MapNotFound {
                name: EVENTS_MAP.to_string(),
                available,
            })?;
        RingBuf::try_from(map).map_err(|e| OomKillError::EbpfError(e.to_string()))
    }

    /// Snapshot of the kill ledger, ordered by pid
    pub fn kill_ledger(&self) -> Result<Vec<(u32, u64)>> {
        let map = self
            .bpf
            .map(KILL_LEDGER_MAP)
            .ok_or_else(|| OomKillError::MapNotFound {
                name: KILL_LEDGER_MAP.to_string(),
                available: self.map_names(),
            })?;
        let ledger: HashMap<_, u32, u64> =
            HashMap::try_from(map).map_err(|e| OomKillError::EbpfError(e.to_string()))?;

        let mut entries = ledger
            .iter()
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| OomKillError::EbpfError(e.to_string()))?;
        entries.sort_unstable();
        Ok(entries)
    }

    /// Detach and unload the probe
    pub fn unload(self) {
        info!("Unloading eBPF probe...");
        drop(self.bpf);
        info!("Probe unloaded");
    }

    fn map_names(&self) -> Vec<String> {
        self.bpf.maps().map(|(name, _)| name.to_string()).collect()
    }
}

/// Drain up to `MAX_BATCH_SIZE` records from the ring buffer
pub fn poll_events(ring_buf: &mut RingBuf<&mut MapData>) -> EventBatch {
    let mut batch = EventBatch::new();

    while !batch.is_full() {
        let Some(item) = ring_buf.next() else {
            return batch;
        };
        batch.push_raw(&item);
    }

    warn!(
        "Hit maximum batch size ({}), stopping poll",
        super::events::MAX_BATCH_SIZE
    );
    batch
}

/// Run pre-flight checks to validate the system can run the probe
fn run_preflight_checks(btf_path: Option<&str>) -> Result<()> {
    info!("Running pre-flight checks...");

    check_kernel_version()?;
    check_btf(btf_path)?;
    check_capabilities();

    info!("Pre-flight checks passed");
    Ok(())
}

fn check_kernel_version() -> Result<()> {
    let release = std::fs::read_to_string("/proc/sys/kernel/osrelease")?;
    let release = release.trim();
    let (major, minor) = parse_kernel_version(release)?;

    if (major, minor) < MIN_KERNEL_VERSION {
        return Err(OomKillError::KernelVersionTooOld {
            version: release.to_string(),
            min_version: format!("{}.{}", MIN_KERNEL_VERSION.0, MIN_KERNEL_VERSION.1),
        });
    }

    info!("Kernel version: {} (supported)", release);
    Ok(())
}

/// Parse "major.minor" out of a kernel release string such as "6.8.0-45-generic"
pub fn parse_kernel_version(release: &str) -> Result<(u32, u32)> {
    let invalid = || OomKillError::UnsupportedFeature(format!("unparseable kernel version '{}'", release));

    let mut parts = release.trim().split('.');
    let major = parts
        .next()
        .and_then(|p| p.parse().ok())
        .ok_or_else(invalid)?;
    let minor = parts
        .next()
        .and_then(|p| {
            let digits: String = p.chars().take_while(|c| c.is_ascii_digit()).collect();
            digits.parse().ok()
        })
        .ok_or_else(invalid)?;

    Ok((major, minor))
}

fn check_btf(btf_path: Option<&str>) -> Result<()> {
    match btf_path {
        Some(path) if !Path::new(path).exists() => Err(OomKillError::BtfError(format!(
            "BTF file {} does not exist",
            path
        ))),
        Some(path) => {
            info!("Using BTF from {}", path);
            Ok(())
        }
        None if !Path::new(VMLINUX_BTF).exists() => {
            warn!("BTF not found at {}", VMLINUX_BTF);
            Err(OomKillError::BtfNotAvailable)
        }
        None => {
            info!("BTF available");
            Ok(())
        }
    }
}

fn check_capabilities() {
    // SAFETY: geteuid cannot fail
    let euid = unsafe { libc::geteuid() };

    if euid != 0 {
        warn!(
            "Not running as root (euid={}). Ensure CAP_BPF and CAP_PERFMON are granted.",
            euid
        );
    } else {
        info!("Running with root privileges");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_kernel_version() {
        assert_eq!(parse_kernel_version("6.8.0-45-generic").unwrap(), (6, 8));
        assert_eq!(parse_kernel_version("5.15.153.1-microsoft-standard-WSL2").unwrap(), (5, 15));
        assert_eq!(parse_kernel_version("6.1-rc3").unwrap(), (6, 1));
        assert!(parse_kernel_version("garbage").is_err());
        assert!(parse_kernel_version("6").is_err());
    }

    #[test]
    fn test_version_ordering() {
        assert!((5, 4) < MIN_KERNEL_VERSION);
        assert!((5, 8) >= MIN_KERNEL_VERSION);
        assert!((6, 0) >= MIN_KERNEL_VERSION);
    }

    #[test]
    fn test_missing_explicit_btf_file() {
        let err = check_btf(Some("/nonexistent/vmlinux")).unwrap_err();
        assert!(matches!(err, OomKillError::BtfError(_)));
    }
}
