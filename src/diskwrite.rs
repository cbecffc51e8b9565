//! The recorded-I/O model: one [`DiskWrite`] per intercepted bio.

use serde::{Deserialize, Serialize};

/// The sector size assumed throughout the harness, in bytes.
pub const SECTOR_SIZE: u64 = 512;

/// Flags drawn from the bio's `bi_rw`/`bi_flags`, mirrored into a plain struct
/// (the teacher's `OpenFlags` pattern) rather than a bitmask type, since the
/// set is small and fixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DiskWriteFlags {
    pub write: bool,
    pub flush: bool,
    pub fua: bool,
    pub sync: bool,
    pub meta: bool,
    pub discard: bool,
    pub barrier: bool,
    /// Set on the pseudo-ops [`crate::checkpoint`] inserts into the log;
    /// never set by the kernel collaborators themselves.
    pub checkpoint: bool,
}

impl DiskWriteFlags {
    pub fn write() -> Self {
        Self { write: true, ..Self::default() }
    }

    pub fn flush() -> Self {
        Self { flush: true, ..Self::default() }
    }

    pub fn discard() -> Self {
        Self { discard: true, ..Self::default() }
    }

    /// True for FLUSH/FUA or an explicit barrier flag: ops that must be durable
    /// before anything after them may be observed.
    pub fn is_barrier(self) -> bool {
        self.flush || self.fua || self.barrier
    }
}

/// One recorded bio.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskWrite {
    pub flags: DiskWriteFlags,
    /// 64-bit LBA at 512-byte sectors.
    pub sector: u64,
    /// Byte count; a multiple of [`SECTOR_SIZE`] unless `flags.discard`.
    pub size: u32,
    /// Owned payload of `size` bytes; absent for metadata-only ops.
    pub payload: Option<Vec<u8>>,
}

impl DiskWrite {
    pub fn new(flags: DiskWriteFlags, sector: u64, payload: Vec<u8>) -> Self {
        let size = payload.len() as u32;
        Self { flags, sector, size, payload: Some(payload) }
    }

    /// A metadata-only op: DISCARD or a pure FLUSH with no payload.
    pub fn meta_only(flags: DiskWriteFlags, sector: u64, size: u32) -> Self {
        Self { flags, sector, size, payload: None }
    }

    pub fn has_write_flag(&self) -> bool {
        self.flags.write
    }

    pub fn is_barrier(&self) -> bool {
        self.flags.is_barrier()
    }

    pub fn is_async(&self) -> bool {
        !self.flags.sync && !self.flags.fua
    }

    /// `[sector, sector + size/SECTOR_SIZE)`, used for overlap detection.
    pub fn sector_range(&self) -> (u64, u64) {
        let sectors = u64::from(self.size).div_ceil(SECTOR_SIZE).max(1);
        (self.sector, self.sector + sectors)
    }

    /// A DiskWrite either carries a payload whose length equals `size`, or is
    /// metadata-only (DISCARD/pure FLUSH) with no payload.
    pub fn is_well_formed(&self) -> bool {
        match &self.payload {
            Some(p) => p.len() as u32 == self.size,
            None => {
                self.flags.discard
                    || (self.flags.flush && !self.flags.write)
                    || self.flags.checkpoint
            }
        }
    }
}
