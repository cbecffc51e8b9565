//! Plug-in contract and registry (§4.3, §9 "Dynamic plug-in dispatch").
//!
//! The original resolves workloads and permuters from a shared library via
//! `dlopen`/`dlsym` against two named C-linkage factory symbols. §9 sanctions
//! a safe alternative as long as both contracts stay swappable by name; the
//! teacher workspace's `unsafe_code = "deny"` lint and the absence of
//! `libloading`/`dlopen` anywhere in the retrieved corpus rule out reproducing
//! `dlopen` itself. This registers `fn() -> Box<dyn T>` factories by name
//! instead and enforces the same one-active-instance-per-loader contract.

use std::collections::HashMap;

use crate::checkpoint::CheckpointRecorder;
use crate::error::PluginError;
use crate::results::DataTestResult;

/// A workload plug-in (§4.3, §6 "Plug-in surface").
pub trait Workload: Send {
    /// Runs before logging is enabled; establishes the disk state every
    /// crash state is evaluated against. Returns 0 on success.
    fn setup(&mut self) -> i32;

    /// The recorded workload. May call `checkpoints.checkpoint()` to mark a
    /// point the replayed prefix can be measured against. Returns 0 on
    /// success.
    fn run(&mut self, checkpoints: &mut dyn CheckpointRecorder) -> i32;

    /// Judges one replayed crash state. `last_checkpoint` is the largest
    /// checkpoint number whose preceding ops are all present in the prefix
    /// (see [`crate::checkpoint::last_checkpoint`]). Returns 0 for
    /// consistent, < 0 for bad data, and populates `out.error_kind`.
    fn check_test(&mut self, last_checkpoint: u32, out: &mut DataTestResult) -> i32;
}

/// A factory registered under a name, called fresh each time the name is
/// loaded.
type Factory<T> = fn() -> Box<T>;

/// A name-keyed registry with at most one active instance at a time (§4.3).
pub struct PluginRegistry<T: ?Sized> {
    factories: HashMap<String, Factory<T>>,
    active: Option<(String, Box<T>)>,
}

impl<T: ?Sized> PluginRegistry<T> {
    pub fn new() -> Self {
        Self { factories: HashMap::new(), active: None }
    }

    /// Registers a factory under `name`, overwriting any previous
    /// registration for that name.
    pub fn register(&mut self, name: impl Into<String>, factory: Factory<T>) {
        self.factories.insert(name.into(), factory);
    }

    pub fn registered_names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// Constructs and activates the plug-in registered under `name`.
    /// Errors if another instance is already active, or if `name` is
    /// unregistered.
    pub fn load(&mut self, name: &str) -> Result<(), PluginError> {
        if self.active.is_some() {
            return Err(PluginError::AlreadyActive);
        }
        let factory = self.factories.get(name).ok_or_else(|| PluginError::NotFound(name.to_string()))?;
        self.active = Some((name.to_string(), factory()));
        Ok(())
    }

    pub fn active_name(&self) -> Option<&str> {
        self.active.as_ref().map(|(name, _)| name.as_str())
    }

    pub fn instance_mut(&mut self) -> Option<&mut T> {
        self.active.as_mut().map(|(_, instance)| instance.as_mut())
    }

    /// Deactivates the current instance, dropping it before returning.
    /// Errors if nothing is active.
    pub fn unload(&mut self) -> Result<(), PluginError> {
        self.active.take().map(|_| ()).ok_or(PluginError::NotActive)
    }
}

impl<T: ?Sized> Default for PluginRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::results::DataTestErrorKind;

    struct NoopWorkload;

    impl Workload for NoopWorkload {
        fn setup(&mut self) -> i32 {
            0
        }

        fn run(&mut self, checkpoints: &mut dyn CheckpointRecorder) -> i32 {
            checkpoints.checkpoint();
            0
        }

        fn check_test(&mut self, _last_checkpoint: u32, out: &mut DataTestResult) -> i32 {
            *out = DataTestResult::clean();
            0
        }
    }

    fn registry_with_noop() -> PluginRegistry<dyn Workload> {
        let mut registry = PluginRegistry::new();
        registry.register("noop", || Box::new(NoopWorkload));
        registry
    }

    #[test]
    fn load_then_unload_round_trips() {
        let mut registry = registry_with_noop();
        registry.load("noop").unwrap();
        assert_eq!(registry.active_name(), Some("noop"));
        registry.unload().unwrap();
        assert_eq!(registry.active_name(), None);
    }

    #[test]
    fn loading_twice_without_unload_is_rejected() {
        let mut registry = registry_with_noop();
        registry.load("noop").unwrap();
        assert_eq!(registry.load("noop"), Err(PluginError::AlreadyActive));
    }

    #[test]
    fn loading_unknown_name_is_rejected() {
        let mut registry = registry_with_noop();
        assert_eq!(registry.load("missing"), Err(PluginError::NotFound("missing".to_string())));
    }

    #[test]
    fn unloading_without_an_active_instance_is_rejected() {
        let mut registry = registry_with_noop();
        assert_eq!(registry.unload(), Err(PluginError::NotActive));
    }

    #[test]
    fn active_instance_runs_through_its_contract() {
        let mut registry = registry_with_noop();
        registry.load("noop").unwrap();
        let instance = registry.instance_mut().unwrap();
        assert_eq!(instance.setup(), 0);
        let mut out = DataTestResult::failed(DataTestErrorKind::Other, "placeholder");
        assert_eq!(instance.check_test(0, &mut out), 0);
        assert_eq!(out.error_kind, DataTestErrorKind::Clean);
    }
}
