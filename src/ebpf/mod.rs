pub mod events;
#[cfg(target_os = "linux")]
pub mod loader;

pub use events::{EventBatch, OomKill, TraceSummary, MAX_BATCH_SIZE};
