//! `crashmonkey`: a crash-consistency testing harness for file systems.
//!
//! Exercises a file system under arbitrary reorderings of recorded
//! block-layer writes and checks whether, after any such reordering, the
//! file system and the running workload's own invariants hold. See
//! [`epoch`] for how a recorded log is partitioned, [`random_permuter`] for
//! how crash states are generated, and [`testloop`] for how a single round
//! is executed end to end.

pub mod checkpoint;
pub mod config;
pub mod device;
pub mod diskwrite;
pub mod epoch;
pub mod error;
pub mod ioctl;
#[cfg(target_os = "linux")]
pub mod linux;
pub mod logio;
pub mod permuter;
pub mod plugin;
pub mod random_permuter;
pub mod results;
pub mod testloop;
pub mod workloads;
