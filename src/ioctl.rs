//! Literal ioctl contract consumed on `/dev/hwm` and the CoW block device
//! (§6). Codes and the wire layout of `DiskWriteOpMeta` are fixed by the
//! in-kernel collaborators this harness drives; they are not configurable.

use nix::{ioctl_none, ioctl_read, ioctl_read_buf, ioctl_write_ptr};

/// Wire layout of one log entry's metadata, as written by `GET_LOG_META`.
/// Native byte order; this is a kernel-local interface, not a network wire
/// format.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct DiskWriteOpMeta {
    pub bi_flags: u64,
    pub bi_rw: u64,
    pub write_sector: u64,
    pub size: u32,
}

const HWM_IOCTL_MAGIC: u8 = 0xff;

ioctl_none!(hwm_log_off, HWM_IOCTL_MAGIC, 0x00);
ioctl_none!(hwm_log_on, HWM_IOCTL_MAGIC, 0x01);
ioctl_read!(hwm_get_log_meta, HWM_IOCTL_MAGIC, 0x02, DiskWriteOpMeta);
// Variable-length payload read: `meta.size` bytes into a caller-provided buffer.
ioctl_read_buf!(hwm_get_log_data, HWM_IOCTL_MAGIC, 0x03, u8);
ioctl_none!(hwm_next_ent, HWM_IOCTL_MAGIC, 0x04);
ioctl_none!(hwm_clr_log, HWM_IOCTL_MAGIC, 0x05);

const COW_IOCTL_MAGIC: u8 = 0xc0;

ioctl_none!(cow_brd_snapshot, COW_IOCTL_MAGIC, 0x00);
ioctl_write_ptr!(cow_brd_restore_snapshot, COW_IOCTL_MAGIC, 0x01, i32);
ioctl_none!(cow_brd_wipe, COW_IOCTL_MAGIC, 0x02);

/// `BLKRRPART` — re-read the partition table. Standard Linux block-ioctl
/// magic/number (`linux/fs.h`), not specific to this harness's kernel
/// modules; retried on `EBUSY` after a snapshot restore (§5, §9).
ioctl_none!(blkrrpart, 0x12, 95);
