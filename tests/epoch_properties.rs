//! Property tests for the epoch builder (§8 invariants 1-3).

use crashmonkey::diskwrite::{DiskWrite, DiskWriteFlags};
use crashmonkey::epoch::DiskLog;
use proptest::prelude::*;

fn arb_write() -> impl Strategy<Value = DiskWrite> {
    (0u64..64, 0usize..4, any::<bool>()).prop_map(|(sector, size_blocks, barrier)| {
        let size = (size_blocks * 512).max(512);
        let mut flags = DiskWriteFlags::write();
        flags.flush = barrier;
        DiskWrite::new(flags, sector, vec![0u8; size])
    })
}

proptest! {
    /// Invariant 1: concatenating every epoch's ops reproduces the log.
    #[test]
    fn totality_holds_for_any_log(ops in prop::collection::vec(arb_write(), 0..40)) {
        let log = DiskLog::from_ops(ops.clone());
        let flattened: Vec<DiskWrite> = log.epochs.iter().flat_map(|e| e.ops.iter().cloned()).collect();
        prop_assert_eq!(flattened, ops);
    }

    /// Invariant 2: every barrier-terminated epoch has the barrier last.
    #[test]
    fn barrier_is_always_last_when_present(ops in prop::collection::vec(arb_write(), 0..40)) {
        let log = DiskLog::from_ops(ops);
        for epoch in &log.epochs {
            if epoch.has_barrier {
                prop_assert!(epoch.ops.last().unwrap().is_barrier());
            }
        }
    }

    /// Invariant 3: `overlaps` agrees with a brute-force pairwise check.
    #[test]
    fn overlap_flag_matches_brute_force(ops in prop::collection::vec(arb_write(), 0..20)) {
        let log = DiskLog::from_ops(ops);
        for epoch in &log.epochs {
            let ranges: Vec<(u64, u64)> =
                epoch.ops.iter().filter(|op| op.has_write_flag()).map(DiskWrite::sector_range).collect();
            let brute_force = ranges.iter().enumerate().any(|(i, a)| {
                ranges.iter().skip(i + 1).any(|b| a.0 < b.1 && b.0 < a.1)
            });
            prop_assert_eq!(epoch.overlaps, brute_force);
        }
    }
}
