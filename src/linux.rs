//! The real [`RawDevice`](crate::device::RawDevice) backend: `insmod`/`rmmod`
//! via `std::process::Command`, `mount(2)`/`umount(2)` and the ioctl contract
//! in [`crate::ioctl`] via `nix`.
//!
//! The ioctl bindings `nix` generates are `unsafe fn`s, which the crate's
//! `unsafe_code = "deny"` lint would otherwise reject everywhere; this is the
//! one module where that's unavoidable, so it carries its own allow rather
//! than weakening the crate-wide lint.
#![allow(unsafe_code)]

use std::fs::OpenOptions;
use std::os::fd::{AsRawFd, RawFd};
use std::process::Command;

use nix::errno::Errno;
use nix::mount::{MsFlags, mount, umount};

use crate::device::{CowParams, RawDevice};
use crate::diskwrite::DiskWriteFlags;
use crate::error::{DeviceError, LogIoError};
use crate::ioctl;
use crate::logio::{LogChannel, LogEntryMeta};

const MAX_BLKRRPART_RETRIES: u32 = 1000;

/// Bit positions within `bi_rw`/`bi_flags` this harness assigns meaning to.
/// The actual wrapper module is an out-of-scope external collaborator (§1
/// "Out of scope"); this mapping is this crate's own stable adapter between
/// the kernel-local wire words and [`DiskWriteFlags`], modeled on the
/// standard Linux block-layer `REQ_*` bit layout.
mod bits {
    pub const WRITE: u64 = 1 << 0;
    pub const FLUSH: u64 = 1 << 1;
    pub const FUA: u64 = 1 << 2;
    pub const SYNC: u64 = 1 << 3;
    pub const META: u64 = 1 << 4;
    pub const DISCARD: u64 = 1 << 5;
    pub const BARRIER: u64 = 1 << 6;
}

fn decode_flags(bi_rw: u64, bi_flags: u64) -> DiskWriteFlags {
    let word = bi_rw | bi_flags;
    DiskWriteFlags {
        write: word & bits::WRITE != 0,
        flush: word & bits::FLUSH != 0,
        fua: word & bits::FUA != 0,
        sync: word & bits::SYNC != 0,
        meta: word & bits::META != 0,
        discard: word & bits::DISCARD != 0,
        barrier: word & bits::BARRIER != 0,
        checkpoint: false,
    }
}

/// The real [`LogChannel`](crate::logio::LogChannel): issues the wrapper
/// ioctls in [`crate::ioctl`] against an already-open `/dev/hwm` fd (§4.5,
/// §6).
pub struct RealLogChannel {
    fd: RawFd,
}

impl RealLogChannel {
    pub fn new(fd: RawFd) -> Self {
        Self { fd }
    }
}

impl LogChannel for RealLogChannel {
    fn get_log_meta(&mut self) -> Result<Option<LogEntryMeta>, LogIoError> {
        let mut raw = ioctl::DiskWriteOpMeta::default();
        match unsafe { ioctl::hwm_get_log_meta(self.fd, &mut raw) } {
            Ok(_) => Ok(Some(LogEntryMeta {
                flags: decode_flags(raw.bi_rw, raw.bi_flags),
                sector: raw.write_sector,
                size: raw.size,
            })),
            Err(Errno::ENODATA) => Ok(None),
            Err(Errno::EFAULT) => Err(LogIoError::WrapperData),
            Err(e) => Err(LogIoError::from(e)),
        }
    }

    fn get_log_data(&mut self, size: usize) -> Result<Vec<u8>, LogIoError> {
        let mut buf = vec![0u8; size];
        match unsafe { ioctl::hwm_get_log_data(self.fd, &mut buf) } {
            Ok(_) => Ok(buf),
            Err(Errno::EFAULT) => Err(LogIoError::WrapperMem),
            Err(e) => Err(LogIoError::from(e)),
        }
    }

    fn next_entry(&mut self) -> Result<(), LogIoError> {
        match unsafe { ioctl::hwm_next_ent(self.fd) } {
            Ok(_) | Err(Errno::ENODATA) => Ok(()),
            Err(e) => Err(LogIoError::from(e)),
        }
    }
}

/// Enables or disables log recording on `/dev/hwm` (§6 `LOG_ON`/`LOG_OFF`).
pub fn set_logging(fd: RawFd, enabled: bool) -> Result<(), LogIoError> {
    let result = if enabled { unsafe { ioctl::hwm_log_on(fd) } } else { unsafe { ioctl::hwm_log_off(fd) } };
    result.map(|_| ()).map_err(LogIoError::from)
}

pub struct LinuxDevice {
    cow_fd: Option<std::fs::File>,
    wrapper_fd: Option<std::fs::File>,
    cow_device_path: String,
    wrapper_ioctl_path: String,
}

impl LinuxDevice {
    pub fn new(cow_device_path: impl Into<String>, wrapper_ioctl_path: impl Into<String>) -> Self {
        Self {
            cow_fd: None,
            wrapper_fd: None,
            cow_device_path: cow_device_path.into(),
            wrapper_ioctl_path: wrapper_ioctl_path.into(),
        }
    }

    fn run(cmd: &str, args: &[&str]) -> Result<(), DeviceError> {
        let status = Command::new(cmd).args(args).status()?;
        if status.success() { Ok(()) } else { Err(DeviceError::Io(std::io::Error::other(format!("{cmd} exited with {status}")))) }
    }

    /// The open wrapper ioctl fd, for constructing a [`RealLogChannel`].
    pub fn wrapper_raw_fd(&self) -> Option<RawFd> {
        self.wrapper_fd.as_ref().map(AsRawFd::as_raw_fd)
    }
}

impl RawDevice for LinuxDevice {
    fn insert_cow_module(&mut self, params: CowParams) -> Result<(), DeviceError> {
        Self::run(
            "insmod",
            &[
                "cow_brd.ko",
                &format!("cow_brd_nr={}", params.num_disks),
                &format!("max_snapshots={}", params.num_snapshots),
                &format!("size={}", params.disk_size),
            ],
        )?;
        let fd = OpenOptions::new().read(true).write(true).open(&self.cow_device_path)?;
        self.cow_fd = Some(fd);
        Ok(())
    }

    fn remove_cow_module(&mut self) -> Result<(), DeviceError> {
        self.cow_fd = None;
        Self::run("rmmod", &["cow_brd"])
    }

    fn insert_wrapper_module(&mut self, target: &str, flags_device: &str) -> Result<(), DeviceError> {
        Self::run(
            "insmod",
            &["disk_wrapper.ko", &format!("target_device={target}"), &format!("flags_device={flags_device}")],
        )
    }

    fn remove_wrapper_module(&mut self) -> Result<(), DeviceError> {
        Self::run("rmmod", &["disk_wrapper"])
    }

    fn open_wrapper_ioctl(&mut self) -> Result<(), DeviceError> {
        let fd = OpenOptions::new().read(true).write(true).open(&self.wrapper_ioctl_path)?;
        self.wrapper_fd = Some(fd);
        Ok(())
    }

    fn close_wrapper_ioctl(&mut self) {
        self.wrapper_fd = None;
    }

    fn mount(&mut self, device: &str, mount_point: &str, opts: Option<&str>) -> Result<(), DeviceError> {
        mount(Some(device), mount_point, Option::<&str>::None, MsFlags::empty(), opts)
            .map_err(DeviceError::from)
    }

    fn umount(&mut self, mount_point: &str) -> Result<(), DeviceError> {
        umount(mount_point).map_err(DeviceError::from)
    }

    fn snapshot(&mut self) -> Result<(), DeviceError> {
        let fd = self.cow_fd.as_ref().ok_or(DeviceError::CowInsert)?;
        unsafe { ioctl::cow_brd_snapshot(fd.as_raw_fd()) }?;
        Ok(())
    }

    fn restore_snapshot(&mut self, reread: bool) -> Result<(), DeviceError> {
        let fd = self.cow_fd.as_ref().ok_or(DeviceError::CowInsert)?;
        let raw_fd: RawFd = fd.as_raw_fd();
        let arg: i32 = 0;
        unsafe { ioctl::cow_brd_restore_snapshot(raw_fd, &arg) }?;

        if reread {
            // The only explicit retry loop in the harness (§5): re-reading the
            // partition table can race a still-settling snapshot restore.
            for _ in 0..MAX_BLKRRPART_RETRIES {
                match unsafe { ioctl::blkrrpart(raw_fd) } {
                    Ok(_) => break,
                    Err(Errno::EBUSY) => continue,
                    Err(e) => return Err(DeviceError::from(e)),
                }
            }
        }
        Ok(())
    }

    fn wipe_snapshot(&mut self) -> Result<(), DeviceError> {
        let fd = self.cow_fd.as_ref().ok_or(DeviceError::CowInsert)?;
        unsafe { ioctl::cow_brd_wipe(fd.as_raw_fd()) }?;
        Ok(())
    }
}

/// Scoped acquisition of `/proc/sys/vm/dirty_expire_centisecs` (§9): reads
/// the prior value on construction, restores it on drop on every exit path,
/// including error/panic unwind.
pub struct DirtyExpireGuard {
    path: &'static str,
    previous: String,
}

impl DirtyExpireGuard {
    const PATH: &'static str = "/proc/sys/vm/dirty_expire_centisecs";

    pub fn acquire(new_value: &str) -> std::io::Result<Self> {
        let previous = std::fs::read_to_string(Self::PATH)?;
        std::fs::write(Self::PATH, new_value)?;
        Ok(Self { path: Self::PATH, previous })
    }
}

impl Drop for DirtyExpireGuard {
    fn drop(&mut self) {
        let _ = std::fs::write(self.path, self.previous.trim());
    }
}

/// `sync()` then write `"3"` to `/proc/sys/vm/drop_caches`, forcing reads to
/// come from the snapshot rather than the page cache.
pub fn clear_caches() -> std::io::Result<()> {
    nix::unistd::sync();
    std::fs::write("/proc/sys/vm/drop_caches", "3")
}
