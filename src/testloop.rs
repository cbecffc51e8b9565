//! Crash-state test loop (§4.6): permute, restore, replay, mount/fsck/mount,
//! check, classify — the core orchestration loop.

use std::io::{Seek, SeekFrom, Write};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::checkpoint::{self, SessionCheckpointRecorder};
use crate::config::HarnessConfig;
use crate::device::{DeviceController, RawDevice};
use crate::diskwrite::{DiskWrite, SECTOR_SIZE};
use crate::epoch::DiskLog;
use crate::permuter::Permuter;
use crate::plugin::Workload;
use crate::results::{DataTestErrorKind, DataTestResult, FileSystemTestResult, SingleTestInfo, TestSuiteResult};

/// Writes the permuted subset of a crash state's write ops onto the snapshot
/// device (§4.6 step 4). Abstracted so the loop is testable without a real
/// block device.
pub trait SnapshotIo {
    fn write_ops(&mut self, device_path: &str, ops: &[DiskWrite]) -> std::io::Result<()>;
}

pub struct RealSnapshotIo;

impl SnapshotIo for RealSnapshotIo {
    fn write_ops(&mut self, device_path: &str, ops: &[DiskWrite]) -> std::io::Result<()> {
        let mut file = std::fs::OpenOptions::new().write(true).open(device_path)?;
        for op in ops {
            if !op.has_write_flag() {
                continue;
            }
            let Some(payload) = &op.payload else { continue };
            file.seek(SeekFrom::Start(op.sector * SECTOR_SIZE))?;
            file.write_all(payload)?;
        }
        Ok(())
    }
}

/// Runs `fsck` against the snapshot device (§4.6 step 6). Abstracted for the
/// same reason as [`SnapshotIo`].
pub trait FsckRunner {
    /// Returns the exit status code, not a `Result` — a nonzero `fsck` exit
    /// is an ordinary outcome, not a process failure.
    fn run(&mut self, device: &str, fs_type: &str) -> std::io::Result<i32>;
}

pub struct RealFsckRunner;

impl FsckRunner for RealFsckRunner {
    fn run(&mut self, device: &str, fs_type: &str) -> std::io::Result<i32> {
        let status = std::process::Command::new("fsck")
            .args(["-T", "-t", fs_type, device, "--", "-yf"])
            .status()?;
        Ok(status.code().unwrap_or(-1))
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RoundTimings {
    pub snapshot: Duration,
    pub bio_write: Duration,
    pub fsck: Duration,
    pub test_case: Duration,
    pub total: Duration,
}

pub struct TestLoop<D: RawDevice, S: SnapshotIo, F: FsckRunner> {
    device: DeviceController<D>,
    snapshot_io: S,
    fsck: F,
    config: HarnessConfig,
}

impl<D: RawDevice, S: SnapshotIo, F: FsckRunner> TestLoop<D, S, F> {
    /// Builds a loop around an already-acquired [`DeviceController`] — the
    /// same controller the caller used for the workload's `setup`/`run`
    /// phases, so the CoW and wrapper modules are acquired exactly once per
    /// invocation (§4.4, §5).
    pub fn new(device: DeviceController<D>, snapshot_io: S, fsck: F, config: HarnessConfig) -> Self {
        Self { device, snapshot_io, fsck, config }
    }

    pub fn teardown(&mut self) {
        self.device.teardown();
    }

    /// Runs up to `config.num_rounds` rounds against `log`, using `permuter`
    /// and `workload`, accumulating results into a [`TestSuiteResult`].
    pub fn run(
        &mut self,
        log: &DiskLog,
        permuter: &mut dyn Permuter,
        workload: &mut dyn Workload,
    ) -> TestSuiteResult {
        permuter.init(log);
        let mut suite = TestSuiteResult::new();

        for round in 0..self.config.num_rounds {
            let Some(state) = permuter.generate_crash_state() else {
                debug!(round, "permuter exhausted, stopping early");
                break;
            };

            let started = Instant::now();
            let info = self.run_one_round(log, &state, workload);
            let elapsed = started.elapsed();
            debug!(round, ?elapsed, fs_test = ?info.fs_test, "round complete");
            suite.add_completed(info);
        }

        if let Some(message) = suite.report_if_short(self.config.num_rounds) {
            info!("{message}");
        }
        info!("{suite}");
        suite
    }

    fn run_one_round(
        &mut self,
        log: &DiskLog,
        state: &crate::permuter::CrashState,
        workload: &mut dyn Workload,
    ) -> SingleTestInfo {
        let _ = self.device.wipe_snapshot();

        if self.device.restore_snapshot(true).is_err() {
            return SingleTestInfo {
                fs_test: FileSystemTestResult::SnapshotRestore,
                data_test: DataTestResult::clean(),
            };
        }

        let ops: Vec<DiskWrite> = state
            .iter()
            .map(|op| log.epochs[op.epoch_index].ops[op.op_index].clone())
            .collect();
        if self.snapshot_io.write_ops(&self.config.target_device, &ops).is_err() {
            return SingleTestInfo {
                fs_test: FileSystemTestResult::BioWrite,
                data_test: DataTestResult::clean(),
            };
        }

        let mount_opts = Some("errors=remount-ro");
        if self.device.mount(&self.config.target_device, mount_opts).is_err() {
            warn!("mount for journal recovery failed, continuing");
            return SingleTestInfo {
                fs_test: FileSystemTestResult::KernelMount,
                data_test: DataTestResult::clean(),
            };
        }
        let _ = self.device.umount();

        let fsck_status = match self.fsck.run(&self.config.target_device, &self.config.fs_type) {
            Ok(code) => code,
            Err(_) => {
                return SingleTestInfo {
                    fs_test: FileSystemTestResult::Check,
                    data_test: DataTestResult::clean(),
                };
            }
        };
        if fsck_status != 0 && fsck_status != 1 {
            return SingleTestInfo {
                fs_test: FileSystemTestResult::Check,
                data_test: DataTestResult::clean(),
            };
        }

        if self.device.mount(&self.config.target_device, None).is_err() {
            return SingleTestInfo {
                fs_test: FileSystemTestResult::Unmountable,
                data_test: DataTestResult::clean(),
            };
        }

        let last_checkpoint = checkpoint::last_checkpoint(log, state);
        let mut data_test = DataTestResult::clean();
        let check_status = workload.check_test(last_checkpoint, &mut data_test);

        let fs_test = if check_status == 0 && fsck_status != 0 {
            FileSystemTestResult::Fixed
        } else {
            FileSystemTestResult::Clean
        };
        if check_status != 0 && data_test.error_kind == DataTestErrorKind::Clean {
            data_test = DataTestResult::failed(DataTestErrorKind::Other, "check_test returned a nonzero status with no error kind set");
        }

        let _ = self.device.umount();
        SingleTestInfo { fs_test, data_test }
    }
}

/// Runs a workload's `setup` (unlogged) then `run` (logged via the returned
/// recorder), for callers that drive their own device acquisition/draining
/// around this (§2 "Data flow").
pub fn record_workload(workload: &mut dyn Workload) -> (i32, i32, SessionCheckpointRecorder) {
    let setup_status = workload.setup();
    let mut recorder = SessionCheckpointRecorder::new();
    let run_status = workload.run(&mut recorder);
    (setup_status, run_status, recorder)
}
