//! Bundled reference workloads (§4.3 "Bundled reference workload").

pub mod generic_090;

use crate::plugin::{PluginRegistry, Workload};

/// Builds a [`PluginRegistry`] with every bundled workload registered.
pub fn bundled_workloads() -> PluginRegistry<dyn Workload> {
    let mut registry = PluginRegistry::new();
    registry.register("generic_090", || Box::new(generic_090::Generic090::new()));
    registry
}
