//! Result classification and aggregation (§3, §4.7).

use std::fmt;

/// Outcome of the file-system-level checks (mount/fsck) for one round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileSystemTestResult {
    Clean,
    SnapshotRestore,
    BioWrite,
    KernelMount,
    Check,
    /// `fsck` returned nonzero but successfully repaired the file system.
    Fixed,
    Unmountable,
}

/// Outcome of the workload's own `check_test` for one round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataTestErrorKind {
    Clean,
    OldFilePersisted,
    FileMissing,
    FileDataCorrupted,
    FileMetadataCorrupted,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataTestResult {
    pub error_kind: DataTestErrorKind,
    pub description: Option<String>,
}

impl DataTestResult {
    pub fn clean() -> Self {
        Self { error_kind: DataTestErrorKind::Clean, description: None }
    }

    pub fn failed(kind: DataTestErrorKind, description: impl Into<String>) -> Self {
        Self { error_kind: kind, description: Some(description.into()) }
    }
}

impl Default for DataTestResult {
    fn default() -> Self {
        Self::clean()
    }
}

/// The combined result of one round of the crash-state test loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SingleTestInfo {
    pub fs_test: FileSystemTestResult,
    pub data_test: DataTestResult,
}

/// Append-only collection of per-round results plus a summary renderer,
/// ported line-for-line from the original `TestSuiteResult::PrintResults`.
#[derive(Debug, Default)]
pub struct TestSuiteResult {
    completed: Vec<SingleTestInfo>,
}

impl TestSuiteResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_completed(&mut self, info: SingleTestInfo) {
        self.completed.push(info);
    }

    pub fn completed_count(&self) -> usize {
        self.completed.len()
    }

    pub fn completed(&self) -> &[SingleTestInfo] {
        &self.completed
    }

    /// §4.7: "A suite shorter than `num_rounds` is explicitly reported as
    /// unable to find new unique state."
    pub fn report_if_short(&self, num_rounds: usize) -> Option<String> {
        if self.completed.len() < num_rounds {
            Some(format!(
                "Unable to find new unique state, stopping at {} tests",
                self.completed.len()
            ))
        } else {
            None
        }
    }
}

impl fmt::Display for TestSuiteResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut num_passed = 0u32;
        let mut num_passed_fixed = 0u32;
        let mut num_failed = 0u32;

        let mut old_file_persisted = 0u32;
        let mut file_missing = 0u32;
        let mut file_data_corrupted = 0u32;
        let mut file_metadata_corrupted = 0u32;
        let mut other = 0u32;

        for result in &self.completed {
            match (result.fs_test, result.data_test.error_kind) {
                (FileSystemTestResult::Clean, DataTestErrorKind::Clean) => num_passed += 1,
                (FileSystemTestResult::Fixed, DataTestErrorKind::Clean) => num_passed_fixed += 1,
                (_, data_kind) => {
                    num_failed += 1;
                    match data_kind {
                        DataTestErrorKind::OldFilePersisted => old_file_persisted += 1,
                        DataTestErrorKind::FileMissing => file_missing += 1,
                        DataTestErrorKind::FileDataCorrupted => file_data_corrupted += 1,
                        DataTestErrorKind::FileMetadataCorrupted => file_metadata_corrupted += 1,
                        DataTestErrorKind::Other | DataTestErrorKind::Clean => other += 1,
                    }
                }
            }
        }

        writeln!(f, "Ran {} tests with", num_failed + num_passed_fixed + num_passed)?;
        writeln!(f, "\tpassed cleanly: {num_passed}")?;
        writeln!(f, "\tpassed fixed: {num_passed_fixed}")?;
        writeln!(f, "\tfailed: {num_failed}")?;
        writeln!(f, "\t\told file persisted: {old_file_persisted}")?;
        writeln!(f, "\t\tfile missing: {file_missing}")?;
        writeln!(f, "\t\tfile data corrupted: {file_data_corrupted}")?;
        writeln!(f, "\t\tfile metadata corrupted: {file_metadata_corrupted}")?;
        write!(f, "\t\tother: {other}")
    }
}
