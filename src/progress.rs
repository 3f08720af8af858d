//! Progress model
//!
//! Aggregates per-file byte counters into a single batch-wide progress value.
//! Aggregates are recomputed from the per-file counters on every update, so
//! repeated or out-of-order ticks for a file never double count.

use serde::Serialize;

/// Point-in-time view of batch progress
///
/// Snapshots are owned copies; mutating the tracker after a snapshot was
/// taken never changes it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSnapshot {
    pub total_bytes: u64,
    pub loaded_bytes: u64,
    pub loaded_percent: f64,
    pub files_bytes: Vec<u64>,
    pub files_loaded_bytes: Vec<u64>,
    pub files_loaded_percent: Vec<f64>,
}

/// Batch progress state owned by a running task
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    state: ProgressSnapshot,
}

impl ProgressTracker {
    /// Create a tracker for files of the given sizes, all at zero progress
    pub fn new(files_bytes: Vec<u64>) -> Self {
        let count = files_bytes.len();
        Self {
            state: ProgressSnapshot {
                total_bytes: files_bytes.iter().sum(),
                loaded_bytes: 0,
                loaded_percent: 0.0,
                files_bytes,
                files_loaded_bytes: vec![0; count],
                files_loaded_percent: vec![0.0; count],
            },
        }
    }

    /// Record that `loaded` bytes of file `index` have been sent so far
    ///
    /// Out-of-range indices are ignored.
    pub fn update(&mut self, index: usize, loaded: u64) {
        let Some(slot) = self.state.files_loaded_bytes.get_mut(index) else {
            return;
        };
        *slot = loaded;
        self.state.files_loaded_percent[index] = percent(loaded, self.state.files_bytes[index]);

        self.state.loaded_bytes = self.state.files_loaded_bytes.iter().sum();
        self.state.loaded_percent = percent(self.state.loaded_bytes, self.state.total_bytes);
    }

    pub fn total_bytes(&self) -> u64 {
        self.state.total_bytes
    }

    pub fn file_count(&self) -> usize {
        self.state.files_bytes.len()
    }

    /// Independent copy of the current state
    pub fn snapshot(&self) -> ProgressSnapshot {
        self.state.clone()
    }
}

/// `loaded / total * 100`, zero when there is nothing to load
fn percent(loaded: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        loaded as f64 / total as f64 * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_consistent(snapshot: &ProgressSnapshot) {
        assert_eq!(snapshot.total_bytes, snapshot.files_bytes.iter().sum::<u64>());
        assert_eq!(
            snapshot.loaded_bytes,
            snapshot.files_loaded_bytes.iter().sum::<u64>()
        );
        let expected = snapshot.loaded_bytes as f64 / snapshot.total_bytes as f64 * 100.0;
        assert!((snapshot.loaded_percent - expected).abs() < 1e-9);
    }

    #[test]
    fn test_initial_snapshot_is_zero() {
        let tracker = ProgressTracker::new(vec![100, 300]);
        let snapshot = tracker.snapshot();

        assert_eq!(snapshot.total_bytes, 400);
        assert_eq!(tracker.total_bytes(), 400);
        assert_eq!(tracker.file_count(), 2);
        assert_eq!(snapshot.loaded_bytes, 0);
        assert_eq!(snapshot.loaded_percent, 0.0);
        assert_eq!(snapshot.files_loaded_bytes, vec![0, 0]);
        assert_eq!(snapshot.files_loaded_percent, vec![0.0, 0.0]);
    }

    #[test]
    fn test_update_recomputes_aggregates() {
        let mut tracker = ProgressTracker::new(vec![100, 300]);

        tracker.update(0, 50);
        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.loaded_bytes, 50);
        assert_eq!(snapshot.files_loaded_percent[0], 50.0);
        assert_consistent(&snapshot);

        tracker.update(0, 100);
        tracker.update(1, 150);
        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.loaded_bytes, 250);
        assert_eq!(snapshot.files_loaded_percent[1], 50.0);
        assert!((snapshot.loaded_percent - 62.5).abs() < 1e-9);
        assert_consistent(&snapshot);
    }

    #[test]
    fn test_repeated_and_out_of_order_ticks_do_not_drift() {
        let mut tracker = ProgressTracker::new(vec![1000]);

        tracker.update(0, 600);
        tracker.update(0, 600);
        tracker.update(0, 400);

        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.loaded_bytes, 400);
        assert!((snapshot.loaded_percent - 40.0).abs() < 1e-9);
    }

    #[test]
    fn test_snapshot_is_independent_of_later_updates() {
        let mut tracker = ProgressTracker::new(vec![10, 10]);
        tracker.update(0, 5);

        let before = tracker.snapshot();
        tracker.update(0, 10);
        tracker.update(1, 10);

        assert_eq!(before.files_loaded_bytes, vec![5, 0]);
        assert_eq!(before.loaded_bytes, 5);
        assert_eq!(tracker.snapshot().loaded_bytes, 20);
    }

    #[test]
    fn test_zero_byte_batch_reports_zero_percent() {
        let mut tracker = ProgressTracker::new(vec![0]);
        tracker.update(0, 0);

        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.loaded_percent, 0.0);
        assert_eq!(snapshot.files_loaded_percent, vec![0.0]);
    }

    #[test]
    fn test_out_of_range_index_is_ignored() {
        let mut tracker = ProgressTracker::new(vec![10]);
        tracker.update(3, 10);
        assert_eq!(tracker.snapshot().loaded_bytes, 0);
    }

    #[test]
    fn test_snapshot_serializes_camel_case() {
        let tracker = ProgressTracker::new(vec![4]);
        let json = serde_json::to_value(tracker.snapshot()).unwrap();

        assert_eq!(json["totalBytes"], 4);
        assert!(json.get("filesLoadedPercent").is_some());
    }
}
