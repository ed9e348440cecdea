pub mod commands;

use crate::config::{OutputFormat, TraceConfig};
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "oomkill")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Trace processes chosen as victims by the kernel OOM killer", long_about = None)]
pub struct Cli {
    #[arg(short, long, global = true, help = "Enable verbose logging")]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Attach to oom/mark_victim and print every victim")]
    Trace {
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text, help = "Output format")]
        format: OutputFormat,

        #[arg(short, long, help = "Stop after this long (e.g. 30s, 5m, 1h)")]
        duration: Option<String>,

        #[arg(long, help = "Read kernel struct layouts from this BTF file")]
        btf: Option<String>,

        #[arg(
            long,
            default_value_t = TraceConfig::DEFAULT_POLL_INTERVAL_MS,
            help = "Ring buffer poll interval in milliseconds"
        )]
        poll_interval_ms: u64,
    },
    #[command(about = "Print the kernel struct offsets the probe would use")]
    Offsets {
        #[arg(long, help = "Read kernel struct layouts from this BTF file")]
        btf: Option<String>,
    },
}
