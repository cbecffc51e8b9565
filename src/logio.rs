//! Log I/O (§4.5): draining the in-kernel wrapper log into a [`DiskLog`], and
//! persisting a log or raw snapshot image to a file.

use std::io::{Read, Write};

use crate::diskwrite::{DiskWrite, DiskWriteFlags};
use crate::epoch::DiskLog;
use crate::error::LogIoError;

/// The wrapper ioctl channel, abstracted so [`drain_log`] is testable without
/// `/dev/hwm` actually existing. A real implementation issues the ioctls in
/// [`crate::ioctl`] against an open fd.
pub trait LogChannel {
    /// `GET_LOG_META`: `Ok(None)` on `ENODATA` (normal end of log).
    fn get_log_meta(&mut self) -> Result<Option<LogEntryMeta>, LogIoError>;
    /// `GET_LOG_DATA`: copies the head entry's payload.
    fn get_log_data(&mut self, size: usize) -> Result<Vec<u8>, LogIoError>;
    /// `NEXT_ENT`: advances the head.
    fn next_entry(&mut self) -> Result<(), LogIoError>;
}

/// In-process mirror of [`crate::ioctl::DiskWriteOpMeta`], decoded into the
/// flag set [`DiskWriteFlags`] understands.
#[derive(Debug, Clone, Copy)]
pub struct LogEntryMeta {
    pub flags: DiskWriteFlags,
    pub sector: u64,
    pub size: u32,
}

/// Drains the channel until `ENODATA`, building a [`DiskLog`]. `EFAULT` from
/// either the metadata or the payload fetch is fatal: the partial log is
/// discarded (§4.5, §7 "Log drain errors").
pub fn drain_log(channel: &mut dyn LogChannel) -> Result<DiskLog, LogIoError> {
    let mut ops = Vec::new();

    loop {
        let meta = match channel.get_log_meta() {
            Ok(Some(meta)) => meta,
            Ok(None) => break,
            Err(e @ LogIoError::WrapperData) => return Err(e),
            Err(e) => return Err(e),
        };

        let payload = if meta.flags.discard || (meta.flags.flush && !meta.flags.write) {
            None
        } else {
            match channel.get_log_data(meta.size as usize) {
                Ok(data) => Some(data),
                Err(e) => return Err(e),
            }
        };

        channel.next_entry()?;

        ops.push(DiskWrite { flags: meta.flags, sector: meta.sector, size: meta.size, payload });
    }

    Ok(DiskLog::from_ops(ops))
}

/// Concatenates length-prefixed `DiskWrite` records: a `u32` little-endian
/// record length followed by its `serde_json`-encoded bytes. Not a
/// performance-sensitive path, so a human-inspectable codec is preferred over
/// a binary one.
pub fn save_log(log: &DiskLog, out: &mut impl Write) -> Result<(), LogIoError> {
    for op in &log.ops {
        let encoded = serde_json::to_vec(op).map_err(|_| LogIoError::Malformed)?;
        out.write_all(&(encoded.len() as u32).to_le_bytes())?;
        out.write_all(&encoded)?;
    }
    Ok(())
}

pub fn load_log(input: &mut impl Read) -> Result<DiskLog, LogIoError> {
    let mut ops = Vec::new();
    loop {
        let mut len_buf = [0u8; 4];
        match input.read_exact(&mut len_buf) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e.into()),
        }
        let len = u32::from_le_bytes(len_buf) as usize;
        let mut buf = vec![0u8; len];
        input.read_exact(&mut buf)?;
        let op: DiskWrite = serde_json::from_slice(&buf).map_err(|_| LogIoError::Malformed)?;
        ops.push(op);
    }
    Ok(DiskLog::from_ops(ops))
}
