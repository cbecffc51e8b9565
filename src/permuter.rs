//! Permuter interface (§4.2): produces legal crash-state prefixes of a log.

use crate::epoch::{DiskLog, EpochOp};

/// A prefix of some legal reordering of the log (§3 "CrashState").
pub type CrashState = Vec<EpochOp>;

/// Implemented by both the bundled random permuter and any other ordering
/// strategy that respects epoch boundaries.
pub trait Permuter: Send {
    /// Binds the permuter to a log. Called once before the first
    /// `generate_crash_state` call.
    fn init(&mut self, log: &DiskLog);

    /// Produces the next crash state, or `None` once no further distinct
    /// states will be produced. The test loop treats `None` as early
    /// termination of the round loop, not an error.
    fn generate_crash_state(&mut self) -> Option<CrashState>;
}

/// Checks the legality invariants of a single crash state against the log it
/// was generated from (§8 invariant 4). Exposed for property tests and for
/// permuter implementations that want to self-check in debug builds.
pub fn is_legal_crash_state(log: &DiskLog, state: &CrashState) -> bool {
    if state.is_empty() {
        return true;
    }

    let last_epoch = state.last().unwrap().epoch_index;
    // every op must belong to one of the first `last_epoch + 1` epochs, in
    // non-decreasing epoch order.
    let mut prev_epoch = 0usize;
    for (i, op) in state.iter().enumerate() {
        if op.epoch_index < prev_epoch {
            return false;
        }
        prev_epoch = op.epoch_index;
        if i > 0 && op.epoch_index == state[i - 1].epoch_index + 1 {
            // crossing into a new epoch is fine, nothing further to check here
        }
        if op.epoch_index > last_epoch {
            return false;
        }
    }

    // full epochs before the last one must be present in their entirety.
    for epoch_index in 0..last_epoch {
        let count = state.iter().filter(|op| op.epoch_index == epoch_index).count();
        if count != log.epochs[epoch_index].ops.len() {
            return false;
        }
    }

    // the partial (last) epoch must not contain its barrier unless it is
    // fully included, and if included the barrier must be last.
    let last = &log.epochs[last_epoch];
    let partial_ops: Vec<&EpochOp> =
        state.iter().filter(|op| op.epoch_index == last_epoch).collect();
    let barrier_index = last.ops.len().saturating_sub(1);
    let includes_barrier = partial_ops.iter().any(|op| op.op_index == barrier_index);
    if last.has_barrier && includes_barrier {
        let full = partial_ops.len() == last.ops.len();
        let barrier_last = partial_ops.last().map(|op| op.op_index) == Some(barrier_index);
        if !full || !barrier_last {
            return false;
        }
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diskwrite::{DiskWrite, DiskWriteFlags};

    fn write_at(sector: u64, size: usize) -> DiskWrite {
        DiskWrite::new(DiskWriteFlags::write(), sector, vec![0u8; size])
    }

    fn flush() -> DiskWrite {
        DiskWrite::meta_only(DiskWriteFlags::flush(), 0, 0)
    }

    #[test]
    fn empty_state_is_legal() {
        let log = DiskLog::from_ops(vec![write_at(0, 512)]);
        assert!(is_legal_crash_state(&log, &vec![]));
    }

    #[test]
    fn state_with_barrier_not_last_is_illegal() {
        let log = DiskLog::from_ops(vec![write_at(0, 512), write_at(8, 512), flush()]);
        let bad = vec![
            EpochOp::new(0, 2), // barrier
            EpochOp::new(0, 0),
            EpochOp::new(0, 1),
        ];
        assert!(!is_legal_crash_state(&log, &bad));
    }

    #[test]
    fn full_epoch_any_order_is_legal() {
        let log = DiskLog::from_ops(vec![write_at(0, 512), write_at(8, 512), flush()]);
        let good = vec![EpochOp::new(0, 1), EpochOp::new(0, 0), EpochOp::new(0, 2)];
        assert!(is_legal_crash_state(&log, &good));
    }
}
