//! Epoch partitioning: grouping the linear log into ordering epochs (§4.1).

use crate::diskwrite::DiskWrite;

/// A back-reference to one op: `(epoch_index, op_index)`, never an owning
/// reference (§9 "Cyclic ownership between epochs and ops").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EpochOp {
    pub epoch_index: usize,
    pub op_index: usize,
}

impl EpochOp {
    pub fn new(epoch_index: usize, op_index: usize) -> Self {
        Self { epoch_index, op_index }
    }
}

/// A contiguous slice of the log between two barriers.
#[derive(Debug, Clone)]
pub struct Epoch {
    pub ops: Vec<DiskWrite>,
    /// Whether this epoch ends in a barrier op (placed last in `ops`).
    pub has_barrier: bool,
    /// True iff any two ops in the epoch write to overlapping sector ranges.
    pub overlaps: bool,
}

impl Epoch {
    fn new() -> Self {
        Self { ops: Vec::new(), has_barrier: false, overlaps: false }
    }

    fn compute_overlaps(&mut self) {
        let mut ranges: Vec<(u64, u64)> = self
            .ops
            .iter()
            .filter(|op| op.has_write_flag())
            .map(DiskWrite::sector_range)
            .collect();
        ranges.sort_unstable();
        self.overlaps = ranges.windows(2).any(|w| w[0].1 > w[1].0);
    }
}

/// The log plus its derived epoch partition. The partition is pure and total:
/// rebuilding it from the same ops always yields the same epochs.
#[derive(Debug, Clone)]
pub struct DiskLog {
    pub ops: Vec<DiskWrite>,
    pub epochs: Vec<Epoch>,
}

impl DiskLog {
    /// Builds a log from a flat, linear sequence of recorded ops.
    pub fn from_ops(ops: Vec<DiskWrite>) -> Self {
        let epochs = build_epochs(&ops);
        Self { ops, epochs }
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Scan left-to-right, closing the current epoch whenever a barrier op is
/// seen, then computing overlap per epoch. Pure and repeatable.
fn build_epochs(ops: &[DiskWrite]) -> Vec<Epoch> {
    let mut epochs = Vec::new();
    let mut current = Epoch::new();

    for op in ops {
        current.ops.push(op.clone());
        if op.is_barrier() {
            current.has_barrier = true;
            current.compute_overlaps();
            epochs.push(std::mem::replace(&mut current, Epoch::new()));
        }
    }

    if !current.ops.is_empty() {
        current.compute_overlaps();
        epochs.push(current);
    }

    epochs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diskwrite::DiskWriteFlags;

    fn write_at(sector: u64, size: usize) -> DiskWrite {
        DiskWrite::new(DiskWriteFlags::write(), sector, vec![0u8; size])
    }

    fn flush() -> DiskWrite {
        DiskWrite::meta_only(DiskWriteFlags::flush(), 0, 0)
    }

    /// S1: two writes separated by a flush produce two epochs, the first
    /// barrier-terminated and non-overlapping, the second open.
    #[test]
    fn s1_two_epochs_from_one_barrier() {
        let ops = vec![write_at(0, 4096), flush(), write_at(8, 4096)];
        let log = DiskLog::from_ops(ops);

        assert_eq!(log.epochs.len(), 2);
        assert!(log.epochs[0].has_barrier);
        assert!(!log.epochs[0].overlaps);
        assert_eq!(log.epochs[0].ops.len(), 2);
        assert!(!log.epochs[1].has_barrier);
        assert_eq!(log.epochs[1].ops.len(), 1);
    }

    /// S2: two overwrites of the same sector followed by a flush form one
    /// overlapping, barrier-terminated epoch.
    #[test]
    fn s2_overlap_detected_same_sector() {
        let ops = vec![write_at(0, 512), write_at(0, 512), flush()];
        let log = DiskLog::from_ops(ops);

        assert_eq!(log.epochs.len(), 1);
        assert!(log.epochs[0].overlaps);
        assert!(log.epochs[0].has_barrier);
    }

    #[test]
    fn totality_concatenation_equals_log() {
        let ops = vec![write_at(0, 512), flush(), write_at(8, 512), write_at(16, 512)];
        let log = DiskLog::from_ops(ops.clone());
        let flattened: Vec<DiskWrite> =
            log.epochs.iter().flat_map(|e| e.ops.iter().cloned()).collect();
        assert_eq!(flattened, ops);
    }

    #[test]
    fn barrier_is_always_last_in_its_epoch() {
        let ops = vec![write_at(0, 512), write_at(8, 512), flush()];
        let log = DiskLog::from_ops(ops);
        let epoch = &log.epochs[0];
        assert!(epoch.has_barrier);
        assert!(epoch.ops.last().unwrap().is_barrier());
    }

    #[test]
    fn non_overlapping_epoch_without_barrier() {
        let ops = vec![write_at(0, 512), write_at(8, 512)];
        let log = DiskLog::from_ops(ops);
        assert_eq!(log.epochs.len(), 1);
        assert!(!log.epochs[0].has_barrier);
        assert!(!log.epochs[0].overlaps);
    }
}
