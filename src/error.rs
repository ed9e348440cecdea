use thiserror::Error;

#[derive(Error, Debug)]
pub enum OomKillError {
    #[error("eBPF error: {0}")]
    EbpfError(String),

    #[error("Failed to load eBPF program: {0}")]
    ProgramLoadFailed(String),

    #[error("Failed to attach eBPF program: {0}")]
    AttachFailed(String),

    #[error("Map {name} not found in eBPF object. Available maps: {available:?}")]
    MapNotFound {
        name: String,
        available: Vec<String>,
    },

    #[error("BTF error: {0}")]
    BtfError(String),

    #[error("Type {0} not found in BTF")]
    BtfTypeNotFound(String),

    #[error("Member {member} not found in {type_name}")]
    BtfMemberNotFound { type_name: String, member: String },

    #[error("Member {member} of {type_name} is a bitfield or not byte aligned")]
    BtfMemberUnaligned { type_name: String, member: String },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Kernel version {version} is too old. Minimum required: {min_version}")]
    KernelVersionTooOld {
        version: String,
        min_version: String,
    },

    #[error("BTF not available. Ensure kernel is compiled with CONFIG_DEBUG_INFO_BTF or pass --btf")]
    BtfNotAvailable,

    #[error("Unsupported feature on this system: {0}")]
    UnsupportedFeature(String),
}

pub type Result<T> = std::result::Result<T, OomKillError>;
