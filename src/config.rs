//! Harness configuration (§3 "HarnessConfig", §6 "Configuration file").

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Everything a run needs beyond the workload/permuter selection, loadable
/// from a TOML file or built programmatically for tests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    pub cow_module_path: String,
    pub wrapper_module_path: String,
    pub target_device: String,
    pub flags_device: String,
    pub mount_point: String,
    pub fs_type: String,
    pub num_rounds: usize,
    pub seed: u64,
    pub num_disks: u32,
    pub num_snapshots: u32,
    pub disk_size: u64,
}

impl HarnessConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        // `toml::ser::Error` has no `From` on `ConfigError` since it can only
        // arise from a malformed `HarnessConfig`, never from the file system;
        // an invalid struct should fail loudly rather than turn into an I/O
        // error kind.
        let rendered = toml::to_string_pretty(self).expect("HarnessConfig always serializes");
        std::fs::write(path, rendered)?;
        Ok(())
    }
}

impl Default for HarnessConfig {
    /// Matches the literal device/module paths and seed from §4.4/§6/§9.
    fn default() -> Self {
        Self {
            cow_module_path: "cow_brd.ko".to_string(),
            wrapper_module_path: "disk_wrapper.ko".to_string(),
            target_device: "/dev/cow_ram_snapshot1_0".to_string(),
            flags_device: "/dev/cow_ram0".to_string(),
            mount_point: "/mnt/snapshot".to_string(),
            fs_type: "ext4".to_string(),
            num_rounds: 1000,
            seed: crate::random_permuter::DEFAULT_SEED,
            num_disks: 1,
            num_snapshots: 1,
            disk_size: 1 << 20,
        }
    }
}
