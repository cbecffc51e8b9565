//! Reference workload `generic_090` (§4.3, §8 scenario S3), ported from
//! `generic_090.cpp`: create a file, write 32KiB, fsync, hardlink it, sync
//! the filesystem, then write another 32KiB and fsync, checking afterward
//! that the full 64KiB is recovered intact.

use std::fs::OpenOptions;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::PathBuf;

use crate::checkpoint::CheckpointRecorder;
use crate::plugin::Workload;
use crate::results::{DataTestErrorKind, DataTestResult};

const CHUNK_SIZE: usize = 32 * 1024;
const TOTAL_SIZE: usize = CHUNK_SIZE * 2;

pub struct Generic090 {
    mount_point: PathBuf,
    recorded: Vec<u8>,
}

impl Generic090 {
    pub fn new() -> Self {
        Self::with_mount_point("/mnt/snapshot")
    }

    pub fn with_mount_point(mount_point: impl Into<PathBuf>) -> Self {
        Self { mount_point: mount_point.into(), recorded: Vec::new() }
    }

    fn foo_path(&self) -> PathBuf {
        self.mount_point.join("foo")
    }

    fn bar_path(&self) -> PathBuf {
        self.mount_point.join("bar")
    }
}

impl Default for Generic090 {
    fn default() -> Self {
        Self::new()
    }
}

impl Workload for Generic090 {
    fn setup(&mut self) -> i32 {
        let mut file = match OpenOptions::new().read(true).write(true).create(true).open(self.foo_path()) {
            Ok(f) => f,
            Err(_) => return -1,
        };

        if file.write_all(&vec![0xa5u8; CHUNK_SIZE]).is_err() {
            return -2;
        }
        if file.sync_all().is_err() {
            return -3;
        }
        if std::fs::hard_link(self.foo_path(), self.bar_path()).is_err() {
            return -4;
        }

        nix::unistd::sync();
        0
    }

    fn run(&mut self, checkpoints: &mut dyn CheckpointRecorder) -> i32 {
        let mut file = match OpenOptions::new().read(true).write(true).open(self.foo_path()) {
            Ok(f) => f,
            Err(_) => return -1,
        };

        if file.seek(SeekFrom::Start(CHUNK_SIZE as u64)).is_err() {
            return -2;
        }
        if file.write_all(&vec![0x5au8; CHUNK_SIZE]).is_err() {
            return -2;
        }
        if file.sync_all().is_err() {
            return -3;
        }

        let mut contents = Vec::with_capacity(TOTAL_SIZE);
        if file.seek(SeekFrom::Start(0)).is_err() {
            return -4;
        }
        if file.read_to_end(&mut contents).is_err() {
            return -4;
        }
        self.recorded = contents;

        checkpoints.checkpoint();
        0
    }

    fn check_test(&mut self, last_checkpoint: u32, out: &mut DataTestResult) -> i32 {
        // Never made it to the enlargement-and-fsync-and-copy checkpoint.
        if last_checkpoint < 1 {
            return -1;
        }

        let Ok(contents) = std::fs::read(self.foo_path()) else {
            *out = DataTestResult::failed(DataTestErrorKind::FileMissing, "foo missing after recovery");
            return 0;
        };

        if contents.len() != TOTAL_SIZE {
            *out = DataTestResult::failed(
                DataTestErrorKind::FileDataCorrupted,
                "addition to file not persisted after fsync",
            );
            return 0;
        }

        if contents != self.recorded {
            *out = DataTestResult::failed(
                DataTestErrorKind::FileDataCorrupted,
                "addition to file not persisted after fsync",
            );
            return 0;
        }

        *out = DataTestResult::clean();
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::SessionCheckpointRecorder;

    #[test]
    fn full_lifecycle_against_a_real_temp_directory() {
        let dir = tempfile::tempdir().unwrap();
        let mut workload = Generic090::with_mount_point(dir.path());

        assert_eq!(workload.setup(), 0);
        assert!(dir.path().join("bar").exists());

        let mut recorder = SessionCheckpointRecorder::new();
        assert_eq!(workload.run(&mut recorder), 0);

        let mut out = DataTestResult::clean();
        assert_eq!(workload.check_test(1, &mut out), 0);
        assert_eq!(out.error_kind, DataTestErrorKind::Clean);
    }

    /// S3: before the checkpoint is reached, `check_test` reports "not yet".
    #[test]
    fn check_test_before_checkpoint_is_not_yet_reached() {
        let dir = tempfile::tempdir().unwrap();
        let mut workload = Generic090::with_mount_point(dir.path());
        workload.setup();
        let mut recorder = SessionCheckpointRecorder::new();
        workload.run(&mut recorder);

        let mut out = DataTestResult::clean();
        assert_eq!(workload.check_test(0, &mut out), -1);
    }

    /// S3: a truncated recovery (first 32KiB only) is reported as corrupted,
    /// not as a crash.
    #[test]
    fn truncated_file_is_reported_as_corrupted() {
        let dir = tempfile::tempdir().unwrap();
        let mut workload = Generic090::with_mount_point(dir.path());
        workload.setup();
        let mut recorder = SessionCheckpointRecorder::new();
        workload.run(&mut recorder);

        std::fs::write(dir.path().join("foo"), vec![0xa5u8; CHUNK_SIZE]).unwrap();

        let mut out = DataTestResult::clean();
        workload.check_test(1, &mut out);
        assert_eq!(out.error_kind, DataTestErrorKind::FileDataCorrupted);
    }
}
