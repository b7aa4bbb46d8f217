//! Producer threads appending entries to the journal.

use crate::config::WorkloadConfig;
use crate::journal::{Journal, JournalError};
use std::time::Instant;
use tracing::debug;

/// Per-thread totals.
#[derive(Debug, Default, Clone, Copy)]
pub struct WorkerStats {
    pub entries: u64,
    pub bytes: u64,
}

impl std::ops::AddAssign for WorkerStats {
    fn add_assign(&mut self, other: Self) {
        self.entries += other.entries;
        self.bytes += other.bytes;
    }
}

/// Fill `buf` with the deterministic payload of `(ledger_id, entry_id)`.
pub fn fill_payload(buf: &mut Vec<u8>, ledger_id: i64, entry_id: i64, len: usize) {
    let seed = (ledger_id as u8).wrapping_mul(31) ^ (entry_id as u8);
    buf.clear();
    buf.extend((0..len).map(|i| (i as u8).wrapping_add(seed)));
}

/// Check a payload read back from the log.
pub fn payload_matches(ledger_id: i64, entry_id: i64, data: &[u8]) -> bool {
    let seed = (ledger_id as u8).wrapping_mul(31) ^ (entry_id as u8);
    data.iter()
        .enumerate()
        .all(|(i, &b)| b == (i as u8).wrapping_add(seed))
}

/// Run a single producer.
///
/// Thread `id` owns ledgers `[id * ledgers_per_thread, (id + 1) * ledgers_per_thread)`
/// and writes their entries round-robin until the workload is done or the
/// deadline passes.
pub fn run_worker(
    id: usize,
    workload: &WorkloadConfig,
    journal: &Journal,
    deadline: Option<Instant>,
) -> Result<WorkerStats, JournalError> {
    let ledgers = workload.ledgers_per_thread;
    let first_ledger = (id * ledgers) as i64;
    let mut stats = WorkerStats::default();
    let mut payload = Vec::with_capacity(workload.entry_size);

    for n in 0..workload.entries {
        if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            debug!(id, "worker reached deadline");
            break;
        }

        let ledger_id = first_ledger + (n % ledgers) as i64;
        let entry_id = (n / ledgers) as i64;
        fill_payload(&mut payload, ledger_id, entry_id, workload.entry_size);
        journal.append(ledger_id, entry_id, &payload)?;

        stats.entries += 1;
        stats.bytes += payload.len() as u64;
    }

    debug!(id, entries = stats.entries, "worker finished");
    Ok(stats)
}
