//! Error types for each component of the harness.
//!
//! Each component gets its own enum rather than one crate-wide catch-all, so
//! a caller can match on exactly the failures that component can produce.

use thiserror::Error;

/// Failures acquiring or releasing the four external resources in [`crate::device`].
///
/// These are the only errors that abort a run outright (§7 "Setup errors").
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("failed to insert cow_brd module")]
    CowInsert,
    #[error("failed to insert disk_wrapper module")]
    WrapperInsert,
    #[error("failed to open wrapper ioctl device")]
    WrapperOpenDev,
    #[error("mount failed: device not ready")]
    MntBadDev,
    #[error("mount failed")]
    MntMnt,
    #[error("partitioning the drive failed")]
    PartPart,
    #[error("formatting the drive failed")]
    FmtFmt,
    #[error("lvm physical volume initialization failed")]
    LvmPvInit,
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Nix(#[from] nix::Error),
}

/// Failures draining the in-kernel log or persisting a [`crate::epoch::DiskLog`] to disk.
#[derive(Debug, Error)]
pub enum LogIoError {
    /// `GET_LOG_META` faulted (`EFAULT`) — the partial log must be discarded.
    #[error("wrapper log metadata fetch faulted")]
    WrapperData,
    /// `GET_LOG_DATA` faulted (`EFAULT`) — the partial log must be discarded.
    #[error("wrapper log payload fetch faulted")]
    WrapperMem,
    #[error("log record truncated or malformed")]
    Malformed,
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Nix(#[from] nix::Error),
}

/// Failures in the plug-in registry (§4.3).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PluginError {
    #[error("no plug-in registered under name {0:?}")]
    NotFound(String),
    #[error("loader already holds an active instance")]
    AlreadyActive,
    #[error("loader has no active instance to unload")]
    NotActive,
}

/// Top-level error for the CLI binary; everything below this flattens into `anyhow`.
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error(transparent)]
    Device(#[from] DeviceError),
    #[error(transparent)]
    LogIo(#[from] LogIoError),
    #[error(transparent)]
    Plugin(#[from] PluginError),
    #[error("no workload registered under name {0:?}")]
    UnknownWorkload(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Failures loading or validating a [`crate::config::HarnessConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Toml(#[from] toml::de::Error),
}
