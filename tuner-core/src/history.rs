//! Bounded log of accepted detections, oldest first.

use serde::Serialize;
use std::collections::VecDeque;
use std::time::SystemTime;

/// Maximum number of records kept.
pub const HISTORY_CAPACITY: usize = 100;

/// One accepted detection, frozen at creation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionRecord {
    /// Display note, e.g. `"A2"`.
    pub note: String,
    pub frequency: f32,
    pub cents: f32,
    pub confidence: f32,
    pub timestamp: SystemTime,
}

/// FIFO of [`DetectionRecord`]s that evicts the oldest entry when full.
#[derive(Debug, Clone)]
pub struct DetectionHistory {
    records: VecDeque<DetectionRecord>,
    capacity: usize,
}

impl Default for DetectionHistory {
    fn default() -> Self {
        Self::with_capacity(HISTORY_CAPACITY)
    }
}

impl DetectionHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            records: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn append(&mut self, record: DetectionRecord) {
        self.records.push_back(record);
        while self.records.len() > self.capacity {
            self.records.pop_front();
        }
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// Copy of the records, newest last.
    pub fn snapshot(&self) -> Vec<DetectionRecord> {
        self.records.iter().cloned().collect()
    }

    pub fn latest(&self) -> Option<&DetectionRecord> {
        self.records.back()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(i: usize) -> DetectionRecord {
        DetectionRecord {
            note: format!("N{i}"),
            frequency: 100.0 + i as f32,
            cents: 0.0,
            confidence: 0.9,
            timestamp: SystemTime::now(),
        }
    }

    #[test]
    fn keeps_the_most_recent_hundred() {
        let mut history = DetectionHistory::new();
        for i in 0..105 {
            history.append(record(i));
        }
        assert_eq!(history.len(), HISTORY_CAPACITY);

        let notes: Vec<String> = history.snapshot().into_iter().map(|r| r.note).collect();
        let expected: Vec<String> = (5..105).map(|i| format!("N{i}")).collect();
        assert_eq!(notes, expected);
        assert_eq!(history.latest().unwrap().note, "N104");
    }

    #[test]
    fn snapshot_is_detached_from_the_log() {
        let mut history = DetectionHistory::with_capacity(3);
        history.append(record(1));
        let snapshot = history.snapshot();
        history.append(record(2));
        assert_eq!(snapshot.len(), 1);
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn clear_empties() {
        let mut history = DetectionHistory::new();
        history.append(record(1));
        history.clear();
        assert!(history.is_empty());
        assert!(history.snapshot().is_empty());
        assert!(history.latest().is_none());
    }

    #[test]
    fn records_serialize_for_export() {
        let json = serde_json::to_string(&record(7)).unwrap();
        assert!(json.contains(r#""note":"N7""#));
        assert!(json.contains("timestamp"));
    }
}
