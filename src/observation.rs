//! A single timestamped value for a data item (spec §3), plus the
//! DATA_SET merge/fold semantics used by the checkpoint (spec §4.5, §8 S1-S3).

use std::collections::BTreeMap;

use time::OffsetDateTime;

/// The value carried by an [`Observation`], shaped by the data item's
/// `Representation`.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Scalar(String),
    Numeric(f64),
    Vector(Vec<f64>),
    /// Ordered key/value map, the folded state of a DATA_SET data item.
    DataSet(BTreeMap<String, String>),
}

impl Value {
    pub fn sample_count(&self) -> usize {
        match self {
            Value::DataSet(map) => map.len(),
            _ => 1,
        }
    }
}

/// An immutable, sequenced observation (spec §3: "Observations are immutable
/// once inserted").
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub sequence: u64,
    pub data_item_id: String,
    pub timestamp: OffsetDateTime,
    pub value: Value,
    /// Set when this observation was a DATA_SET `RESET` (spec §8 S3).
    pub reset_triggered: bool,
}

impl Observation {
    pub fn new(data_item_id: impl Into<String>, timestamp: OffsetDateTime, value: Value) -> Self {
        Self {
            sequence: 0,
            data_item_id: data_item_id.into(),
            timestamp,
            value,
            reset_triggered: false,
        }
    }

    pub fn reset(mut self, reset: bool) -> Self {
        self.reset_triggered = reset;
        self
    }
}

/// Fold a new DATA_SET observation into the existing map per spec §4.5/§8:
/// a non-reset observation merges its entries into the existing map; a reset
/// observation clears the map first. `entries` is applied in order, later
/// keys overwriting earlier ones within the same observation.
pub fn merge_data_set(
    existing: &BTreeMap<String, String>,
    reset: bool,
    entries: &[(String, String)],
) -> BTreeMap<String, String> {
    let mut merged = if reset {
        BTreeMap::new()
    } else {
        existing.clone()
    };
    for (key, value) in entries {
        merged.insert(key.clone(), value.clone());
    }
    merged
}

#[cfg(test)]
mod test {
    use super::*;

    fn map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn s1_initial_set() {
        let merged = merge_data_set(
            &BTreeMap::new(),
            false,
            &[
                ("a".into(), "1".into()),
                ("b".into(), "2".into()),
                ("c".into(), "3".into()),
                ("d".into(), "4".into()),
            ],
        );
        assert_eq!(merged, map(&[("a", "1"), ("b", "2"), ("c", "3"), ("d", "4")]));
        assert_eq!(Value::DataSet(merged).sample_count(), 4);
    }

    #[test]
    fn s2_partial_merge() {
        let existing = map(&[("a", "1"), ("b", "2"), ("c", "3"), ("d", "4")]);
        let merged = merge_data_set(&existing, false, &[("c".into(), "5".into())]);
        assert_eq!(merged, map(&[("a", "1"), ("b", "2"), ("c", "5"), ("d", "4")]));
        assert_eq!(merged.len(), 4);
    }

    #[test]
    fn s3_reset() {
        let existing = map(&[("a", "1"), ("b", "2"), ("c", "5"), ("d", "4")]);
        let merged = merge_data_set(&existing, true, &[("e".into(), "6".into())]);
        assert_eq!(merged, map(&[("e", "6")]));
        assert_eq!(merged.len(), 1);
    }

    #[test]
    fn property_5_data_set_merge() {
        let after_initial = merge_data_set(&BTreeMap::new(), false, &[("a".into(), "1".into()), ("b".into(), "2".into())]);
        let after_second = merge_data_set(&after_initial, false, &[("c".into(), "3".into())]);
        assert_eq!(after_second, map(&[("a", "1"), ("b", "2"), ("c", "3")]));

        let after_reset = merge_data_set(&after_second, true, &[("c".into(), "3".into())]);
        assert_eq!(after_reset, map(&[("c", "3")]));
    }
}
