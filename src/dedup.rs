/// Signature Deduplication Store
///
/// Fast path of the exactly-once guarantee. Two bounded in-memory sets sit in
/// front of the relational unique constraint:
///
/// - **recent**: signatures seen in the current window, consulted before any
///   processing. False negatives are fine (the database catches them); false
///   positives are not, so entries are only added for signatures that were
///   actually driven through the pipeline.
/// - **processed**: long-term memory of persisted signatures, swept daily.
///
/// Both sets are halved when they exceed their caps; the periodic sweeps in
/// the dispatcher call `hourly_sweep` / `daily_sweep`, and operators can force
/// a cleanup at any time.
use crate::logger::{self, LogTag};
use std::collections::HashSet;
use std::sync::Mutex;

/// Hourly sweep halves the recent set above this size
const RECENT_SWEEP_THRESHOLD: usize = 5000;

/// Daily sweep halves the processed set above this size
const PROCESSED_SWEEP_THRESHOLD: usize = 50000;

/// Bounded recent/processed signature sets under one mutex each
pub struct SignatureDedup {
    recent: Mutex<HashSet<String>>,
    processed: Mutex<HashSet<String>>,
    recent_cap: usize,
    processed_cap: usize,
}

impl SignatureDedup {
    pub fn new(recent_cap: usize, processed_cap: usize) -> Self {
        Self {
            recent: Mutex::new(HashSet::new()),
            processed: Mutex::new(HashSet::new()),
            recent_cap,
            processed_cap,
        }
    }

    /// True iff the signature was already marked in the window
    pub fn seen_recently(&self, signature: &str) -> bool {
        let recent = self.recent.lock().unwrap();
        recent.contains(signature)
    }

    /// Record a signature in the recent window; halves the set at the cap
    pub fn mark_recent(&self, signature: &str) {
        let mut recent = self.recent.lock().unwrap();
        recent.insert(signature.to_string());
        if recent.len() > self.recent_cap {
            Self::halve(&mut recent);
        }
    }

    /// True iff the signature is in long-term memory
    pub fn processed(&self, signature: &str) -> bool {
        let processed = self.processed.lock().unwrap();
        processed.contains(signature)
    }

    /// Record a persisted signature in long-term memory
    pub fn mark_processed(&self, signature: &str) {
        let mut processed = self.processed.lock().unwrap();
        processed.insert(signature.to_string());
        if processed.len() > self.processed_cap {
            Self::halve(&mut processed);
        }
    }

    /// Hourly maintenance: halve the recent set when it grew past the sweep
    /// threshold. Returns the number of entries dropped.
    pub fn hourly_sweep(&self) -> usize {
        let mut recent = self.recent.lock().unwrap();
        if recent.len() > RECENT_SWEEP_THRESHOLD {
            let before = recent.len();
            Self::halve(&mut recent);
            before - recent.len()
        } else {
            0
        }
    }

    /// Daily maintenance: halve the processed set when it grew past the sweep
    /// threshold. Returns the number of entries dropped.
    pub fn daily_sweep(&self) -> usize {
        let mut processed = self.processed.lock().unwrap();
        if processed.len() > PROCESSED_SWEEP_THRESHOLD {
            let before = processed.len();
            Self::halve(&mut processed);
            before - processed.len()
        } else {
            0
        }
    }

    /// Operator-facing cleanup: halve both sets unconditionally.
    pub fn force_cleanup(&self) {
        let dropped_recent = {
            let mut recent = self.recent.lock().unwrap();
            let before = recent.len();
            Self::halve(&mut recent);
            before - recent.len()
        };
        let dropped_processed = {
            let mut processed = self.processed.lock().unwrap();
            let before = processed.len();
            Self::halve(&mut processed);
            before - processed.len()
        };
        logger::info(
            LogTag::Dedup,
            &format!(
                "Forced cleanup dropped {} recent / {} processed entries",
                dropped_recent, dropped_processed
            ),
        );
    }

    /// Current sizes (recent, processed) for health reporting
    pub fn sizes(&self) -> (usize, usize) {
        let recent = self.recent.lock().unwrap().len();
        let processed = self.processed.lock().unwrap().len();
        (recent, processed)
    }

    // Drop an arbitrary half of the set. Which half is dropped doesn't
    // matter: a false negative here is caught by the unique constraint.
    fn halve(set: &mut HashSet<String>) {
        let target = set.len() / 2;
        let keep: HashSet<String> = set.iter().take(target).cloned().collect();
        *set = keep;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recent_roundtrip() {
        let dedup = SignatureDedup::new(100, 100);
        assert!(!dedup.seen_recently("sig1"));
        dedup.mark_recent("sig1");
        assert!(dedup.seen_recently("sig1"));
        assert!(!dedup.seen_recently("sig2"));
    }

    #[test]
    fn marking_twice_is_idempotent() {
        let dedup = SignatureDedup::new(100, 100);
        dedup.mark_recent("sig1");
        dedup.mark_recent("sig1");
        let (recent, _) = dedup.sizes();
        assert_eq!(recent, 1);
    }

    #[test]
    fn cap_halves_recent_set() {
        let dedup = SignatureDedup::new(10, 100);
        for i in 0..20 {
            dedup.mark_recent(&format!("sig{}", i));
        }
        let (recent, _) = dedup.sizes();
        assert!(recent <= 11, "recent set not bounded: {}", recent);
    }

    #[test]
    fn processed_set_bounded() {
        let dedup = SignatureDedup::new(100, 10);
        for i in 0..50 {
            dedup.mark_processed(&format!("sig{}", i));
        }
        let (_, processed) = dedup.sizes();
        assert!(processed <= 11, "processed set not bounded: {}", processed);
    }

    #[test]
    fn sweeps_only_fire_above_thresholds() {
        let dedup = SignatureDedup::new(1_000_000, 1_000_000);
        for i in 0..100 {
            dedup.mark_recent(&format!("sig{}", i));
            dedup.mark_processed(&format!("sig{}", i));
        }
        assert_eq!(dedup.hourly_sweep(), 0);
        assert_eq!(dedup.daily_sweep(), 0);
    }

    #[test]
    fn force_cleanup_halves_both() {
        let dedup = SignatureDedup::new(1_000_000, 1_000_000);
        for i in 0..100 {
            dedup.mark_recent(&format!("sig{}", i));
            dedup.mark_processed(&format!("sig{}", i));
        }
        dedup.force_cleanup();
        let (recent, processed) = dedup.sizes();
        assert_eq!(recent, 50);
        assert_eq!(processed, 50);
    }
}
