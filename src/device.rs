//! Device control (§4.4, §5): acquisition and teardown of the four external
//! resources the harness shares with the kernel — the CoW module, the
//! wrapper module, the wrapper ioctl fd, and the mount point.
//!
//! The actual syscalls/exec calls are behind [`RawDevice`] so
//! [`DeviceController`]'s acquire/release ordering and idempotent-teardown
//! behavior can be exercised in tests without root or the kernel modules
//! present, the same split `kimberlite-io`'s `IoBackend` makes between a real
//! backend and a test double.

use crate::error::DeviceError;

/// Parameters for inserting `cow_brd`.
#[derive(Debug, Clone, Copy)]
pub struct CowParams {
    pub num_disks: u32,
    pub num_snapshots: u32,
    pub disk_size: u64,
}

/// The host operations the device controller drives. A production
/// implementation shells out to `insmod`/`rmmod`/`mount`/`umount` and issues
/// the ioctls in [`crate::ioctl`]; [`FakeDevice`] below stands in for tests.
pub trait RawDevice {
    fn insert_cow_module(&mut self, params: CowParams) -> Result<(), DeviceError>;
    fn remove_cow_module(&mut self) -> Result<(), DeviceError>;

    fn insert_wrapper_module(&mut self, target: &str, flags_device: &str) -> Result<(), DeviceError>;
    fn remove_wrapper_module(&mut self) -> Result<(), DeviceError>;

    fn open_wrapper_ioctl(&mut self) -> Result<(), DeviceError>;
    fn close_wrapper_ioctl(&mut self);

    fn mount(&mut self, device: &str, mount_point: &str, opts: Option<&str>) -> Result<(), DeviceError>;
    fn umount(&mut self, mount_point: &str) -> Result<(), DeviceError>;

    fn snapshot(&mut self) -> Result<(), DeviceError>;
    /// Restores the last snapshot. If `reread`, re-reads the partition table,
    /// retrying on `EBUSY` — the harness's one explicit retry loop (§5).
    fn restore_snapshot(&mut self, reread: bool) -> Result<(), DeviceError>;
    fn wipe_snapshot(&mut self) -> Result<(), DeviceError>;
}

/// Manages the four resources with strict acquire/release pairing (§4.4,
/// §5). Each resource has a boolean "active" flag; teardown releases in
/// reverse acquisition order and is idempotent.
pub struct DeviceController<D: RawDevice> {
    device: D,
    cow_active: bool,
    wrapper_module_active: bool,
    wrapper_fd_active: bool,
    mount_active: bool,
    mount_point: String,
}

impl<D: RawDevice> DeviceController<D> {
    pub fn new(device: D, mount_point: impl Into<String>) -> Self {
        Self {
            device,
            cow_active: false,
            wrapper_module_active: false,
            wrapper_fd_active: false,
            mount_active: false,
            mount_point: mount_point.into(),
        }
    }

    /// Acquires all four resources in order. On any failure, already-acquired
    /// resources are torn down best-effort before the error propagates.
    pub fn acquire(
        &mut self,
        cow_params: CowParams,
        target_device: &str,
        flags_device: &str,
    ) -> Result<(), DeviceError> {
        if let Err(e) = self.device.insert_cow_module(cow_params) {
            return Err(e);
        }
        self.cow_active = true;

        if let Err(e) = self.device.insert_wrapper_module(target_device, flags_device) {
            self.teardown();
            return Err(e);
        }
        self.wrapper_module_active = true;

        if let Err(e) = self.device.open_wrapper_ioctl() {
            self.teardown();
            return Err(e);
        }
        self.wrapper_fd_active = true;

        Ok(())
    }

    /// The underlying device backend, for callers that need backend-specific
    /// operations beyond the [`RawDevice`] trait (e.g. the real fd behind a
    /// wrapper ioctl channel).
    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn snapshot(&mut self) -> Result<(), DeviceError> {
        self.device.snapshot()
    }

    pub fn restore_snapshot(&mut self, reread: bool) -> Result<(), DeviceError> {
        self.device.restore_snapshot(reread)
    }

    pub fn wipe_snapshot(&mut self) -> Result<(), DeviceError> {
        self.device.wipe_snapshot()
    }

    pub fn mount(&mut self, device_path: &str, opts: Option<&str>) -> Result<(), DeviceError> {
        let mount_point = self.mount_point.clone();
        self.device.mount(device_path, &mount_point, opts)?;
        self.mount_active = true;
        Ok(())
    }

    pub fn umount(&mut self) -> Result<(), DeviceError> {
        if !self.mount_active {
            return Ok(());
        }
        let mount_point = self.mount_point.clone();
        self.device.umount(&mount_point)?;
        self.mount_active = false;
        Ok(())
    }

    /// Idempotent, best-effort, bottom-up teardown: unmount, then remove the
    /// wrapper module, then the CoW module. Each step's failure is swallowed
    /// so later steps still run (§5 "cleanup_harness").
    pub fn teardown(&mut self) {
        if self.mount_active {
            let mount_point = self.mount_point.clone();
            let _ = self.device.umount(&mount_point);
            self.mount_active = false;
        }
        if self.wrapper_fd_active {
            self.device.close_wrapper_ioctl();
            self.wrapper_fd_active = false;
        }
        if self.wrapper_module_active {
            let _ = self.device.remove_wrapper_module();
            self.wrapper_module_active = false;
        }
        if self.cow_active {
            let _ = self.device.remove_cow_module();
            self.cow_active = false;
        }
    }
}

/// An in-memory [`RawDevice`] for tests: no real module, mount, or ioctl
/// activity, just bookkeeping of what was called and in what state.
#[derive(Debug, Default)]
pub struct FakeDevice {
    pub cow_inserted: bool,
    pub wrapper_inserted: bool,
    pub wrapper_fd_open: bool,
    pub mounted: bool,
    pub snapshot_taken: bool,
    pub fail_wrapper_insert: bool,
}

impl RawDevice for FakeDevice {
    fn insert_cow_module(&mut self, _params: CowParams) -> Result<(), DeviceError> {
        self.cow_inserted = true;
        Ok(())
    }

    fn remove_cow_module(&mut self) -> Result<(), DeviceError> {
        self.cow_inserted = false;
        Ok(())
    }

    fn insert_wrapper_module(&mut self, _target: &str, _flags_device: &str) -> Result<(), DeviceError> {
        if self.fail_wrapper_insert {
            return Err(DeviceError::WrapperInsert);
        }
        self.wrapper_inserted = true;
        Ok(())
    }

    fn remove_wrapper_module(&mut self) -> Result<(), DeviceError> {
        self.wrapper_inserted = false;
        Ok(())
    }

    fn open_wrapper_ioctl(&mut self) -> Result<(), DeviceError> {
        self.wrapper_fd_open = true;
        Ok(())
    }

    fn close_wrapper_ioctl(&mut self) {
        self.wrapper_fd_open = false;
    }

    fn mount(&mut self, _device: &str, _mount_point: &str, _opts: Option<&str>) -> Result<(), DeviceError> {
        self.mounted = true;
        Ok(())
    }

    fn umount(&mut self, _mount_point: &str) -> Result<(), DeviceError> {
        self.mounted = false;
        Ok(())
    }

    fn snapshot(&mut self) -> Result<(), DeviceError> {
        self.snapshot_taken = true;
        Ok(())
    }

    fn restore_snapshot(&mut self, _reread: bool) -> Result<(), DeviceError> {
        Ok(())
    }

    fn wipe_snapshot(&mut self) -> Result<(), DeviceError> {
        self.snapshot_taken = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> CowParams {
        CowParams { num_disks: 1, num_snapshots: 1, disk_size: 1 << 20 }
    }

    #[test]
    fn acquire_sets_flags_in_order() {
        let mut ctrl = DeviceController::new(FakeDevice::default(), "/mnt/snapshot");
        ctrl.acquire(params(), "/dev/cow_ram_snapshot1_0", "/dev/cow_ram0").unwrap();
        assert!(ctrl.cow_active);
        assert!(ctrl.wrapper_module_active);
        assert!(ctrl.wrapper_fd_active);
    }

    #[test]
    fn failed_wrapper_insert_tears_down_cow() {
        let mut device = FakeDevice::default();
        device.fail_wrapper_insert = true;
        let mut ctrl = DeviceController::new(device, "/mnt/snapshot");
        let err = ctrl.acquire(params(), "/dev/cow_ram_snapshot1_0", "/dev/cow_ram0");
        assert!(err.is_err());
        assert!(!ctrl.cow_active);
        assert!(!ctrl.wrapper_module_active);
    }

    #[test]
    fn teardown_is_idempotent() {
        let mut ctrl = DeviceController::new(FakeDevice::default(), "/mnt/snapshot");
        ctrl.acquire(params(), "/dev/cow_ram_snapshot1_0", "/dev/cow_ram0").unwrap();
        ctrl.mount("/dev/cow_ram_snapshot1_0", None).unwrap();

        ctrl.teardown();
        let after_first = (ctrl.cow_active, ctrl.wrapper_module_active, ctrl.mount_active);
        ctrl.teardown();
        let after_second = (ctrl.cow_active, ctrl.wrapper_module_active, ctrl.mount_active);

        assert_eq!(after_first, after_second);
        assert_eq!(after_first, (false, false, false));
    }

    #[test]
    fn umount_without_mount_is_a_noop() {
        let mut ctrl = DeviceController::new(FakeDevice::default(), "/mnt/snapshot");
        assert!(ctrl.umount().is_ok());
    }
}
