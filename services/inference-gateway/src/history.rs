//! In-memory prediction history. Lives for the process; nothing is persisted.

use crate::model::Features;
use parking_lot::RwLock;
use serde::ser::{Serialize, SerializeMap, Serializer};

const PREDICTION_KEY: &str = "predicted_extraction_pct";
const TIMESTAMP_KEY: &str = "timestamp";

#[derive(Debug, Clone, PartialEq)]
pub struct PredictionRecord {
    pub features: Features,
    pub predicted_extraction_pct: f64,
    pub timestamp: String,
}

// One flat object: submitted features first, then the record's own fields, which shadow same-named features.
impl Serialize for PredictionRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let shadowed = self.features.keys().filter(|k| *k == PREDICTION_KEY || *k == TIMESTAMP_KEY).count();
        let mut map = serializer.serialize_map(Some(self.features.len() - shadowed + 2))?;
        for (k, v) in self.features.iter().filter(|(k, _)| *k != PREDICTION_KEY && *k != TIMESTAMP_KEY) {
            map.serialize_entry(k, v)?;
        }
        map.serialize_entry(PREDICTION_KEY, &self.predicted_extraction_pct)?;
        map.serialize_entry(TIMESTAMP_KEY, &self.timestamp)?;
        map.end()
    }
}

/// Insertion-ordered record log. Every operation holds the lock exactly once.
#[derive(Debug, Default)]
pub struct HistoryStore {
    records: RwLock<Vec<PredictionRecord>>,
}

impl HistoryStore {
    pub fn new() -> Self { Self::default() }

    pub fn append(&self, record: PredictionRecord) { self.records.write().push(record); }

    /// Snapshot copy; callers cannot reach the stored vector.
    pub fn list(&self) -> Vec<PredictionRecord> { self.records.read().clone() }

    /// Removes every record whose timestamp matches exactly. Timestamps are not unique, so this may remove several.
    pub fn delete(&self, timestamp: &str) -> usize {
        let mut records = self.records.write();
        let before = records.len();
        records.retain(|r| r.timestamp != timestamp);
        before - records.len()
    }

    pub fn clear(&self) -> usize {
        let mut records = self.records.write();
        let dropped = records.len();
        records.clear();
        dropped
    }

    pub fn len(&self) -> usize { self.records.read().len() }
    pub fn is_empty(&self) -> bool { self.records.read().is_empty() }
}
