//! Userspace side of oomkill
//!
//! - `btf`: resolves the kernel struct offsets the probe needs
//! - `ebpf`: loads and attaches the probe, decodes ring buffer records
//! - `channel`, `ledger`: host implementations of the probe's event channel
//!   and kill ledger, with the same bounded semantics as the kernel maps
//! - `cli`, `config`: the `oomkill` command line

pub mod btf;
pub mod channel;
pub mod cli;
pub mod config;
pub mod ebpf;
pub mod error;
pub mod ledger;

pub use error::{OomKillError, Result};
pub use oomkill_common as common;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
