use crate::btf::KernelBtf;
use crate::cli::Commands;
use crate::config::{OutputFormat, TraceConfig};
use crate::ebpf::OomKill;
use crate::Result;
use oomkill_common::TaskOffsets;
use std::future::Future;
use std::time::Duration;
use tokio::time::{self, Instant};
use tracing::info;

pub async fn handle_command(command: Commands) -> Result<()> {
    match command {
        Commands::Trace {
            format,
            duration,
            btf,
            poll_interval_ms,
        } => {
            let config = TraceConfig::new(btf, format, duration.as_deref(), poll_interval_ms)?;
            handle_trace(config).await
        }
        Commands::Offsets { btf } => handle_offsets(btf.as_deref()),
    }
}

/// Render one victim in the requested format
pub fn render_kill(kill: &OomKill, format: OutputFormat) -> Result<String> {
    Ok(match format {
        OutputFormat::Text => kill.to_string(),
        OutputFormat::Json => serde_json::to_string(kill)?,
    })
}

pub fn render_offsets(offsets: &TaskOffsets) -> String {
    [
        ("task_struct.real_parent", offsets.task_real_parent),
        ("task_struct.tgid", offsets.task_tgid),
        ("task_struct.mm", offsets.task_mm),
        ("task_struct.exit_code", offsets.task_exit_code),
        ("mm_struct.hiwater_rss", offsets.mm_hiwater_rss),
    ]
    .iter()
    .map(|(field, offset)| format!("{:<26} {:>6}", field, offset))
    .collect::<Vec<_>>()
    .join("\n")
}

fn handle_offsets(btf: Option<&str>) -> Result<()> {
    let btf = match btf {
        Some(path) => KernelBtf::from_file(path)?,
        None => KernelBtf::from_sys_fs()?,
    };
    println!("{}", render_offsets(&btf.task_offsets()?));
    Ok(())
}

/// Why a trace loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Shutdown,
    DurationElapsed,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopReason::Shutdown => write!(f, "shutdown signal received"),
            StopReason::DurationElapsed => write!(f, "trace duration elapsed"),
        }
    }
}

/// Call `on_tick` every `interval` until `shutdown` resolves or `duration`
/// elapses.
///
/// `shutdown` is polled as one future for the whole loop, so a signal that
/// arrives while `on_tick` runs is seen on the next turn.
pub async fn run_until_stopped<S, F>(
    shutdown: S,
    duration: Option<Duration>,
    interval: Duration,
    mut on_tick: F,
) -> Result<StopReason>
where
    S: Future,
    F: FnMut() -> Result<()>,
{
    let deadline = duration.map(|d| Instant::now() + d);
    let stop = async {
        match deadline {
            Some(deadline) => time::sleep_until(deadline).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(stop);
    tokio::pin!(shutdown);
    let mut ticker = time::interval(interval);

    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown => return Ok(StopReason::Shutdown),
            _ = &mut stop => return Ok(StopReason::DurationElapsed),
            _ = ticker.tick() => on_tick()?,
        }
    }
}

#[cfg(not(target_os = "linux"))]
async fn handle_trace(_config: TraceConfig) -> Result<()> {
    Err(crate::OomKillError::UnsupportedFeature(
        "tracing requires Linux to run eBPF programs".to_string(),
    ))
}

#[cfg(target_os = "linux")]
async fn handle_trace(config: TraceConfig) -> Result<()> {
    use crate::ebpf::events::page_size;
    use crate::ebpf::loader::{poll_events, ProbeManager};
    use crate::ebpf::TraceSummary;
    use tokio::signal;

    let mut manager = ProbeManager::new(config.btf_path.as_deref())?;
    manager.attach()?;

    let page_size = page_size();
    let mut summary = TraceSummary::default();

    {
        let mut ring_buf = manager.events_ring_buf()?;

        info!("Tracing OOM kills. Press Ctrl+C to exit.");
        if config.format == OutputFormat::Text {
            println!("{}", OomKill::TEXT_HEADER);
        }

        let reason = run_until_stopped(
            signal::ctrl_c(),
            config.duration,
            config.poll_interval,
            || {
                let batch = poll_events(&mut ring_buf);
                for event in batch.events() {
                    let kill = OomKill::from_event(event, page_size);
                    println!("{}", render_kill(&kill, config.format)?);
                }
                summary.record(&batch);
                Ok(())
            },
        )
        .await?;
        info!("Stopping: {}", reason);

        // Pick up anything committed after the last tick.
        let batch = poll_events(&mut ring_buf);
        for event in batch.events() {
            println!("{}", render_kill(&OomKill::from_event(event, page_size), config.format)?);
        }
        summary.record(&batch);
    }

    let ledger = manager.kill_ledger()?;
    info!("{}", summary);
    info!("Kill ledger holds {} pid(s)", ledger.len());
    for (pid, timestamp_ns) in &ledger {
        info!("  pid={} last_kill_ktime={}ns", pid, timestamp_ns);
    }

    manager.unload();
    Ok(())
}
