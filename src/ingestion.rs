//! The ingestion pipeline: resolve, normalize, validate, publish (spec §4.4).
//!
//! Each stage is a pure function over an observation-in-progress and the
//! adapter's options snapshot; nothing here touches a socket. The only
//! side effect anywhere in the chain is the final `buffer.append`.

use time::{Duration, OffsetDateTime};

use crate::adapter::AdapterOptions;
use crate::buffer::Buffer;
use crate::device_model::{Constraint, DataItem, DeviceModel, Representation};
use crate::observation::{Observation, Value};

#[derive(Debug, Clone, PartialEq)]
pub enum DropReason {
    UnknownDataItem(String),
    ConstraintViolation(String),
    ParseError(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    Accepted(u64),
    Dropped(DropReason),
}

/// A single `KEY|VALUE` pair as handed off by the SHDR parser, not yet
/// resolved against the device model.
pub struct RawObservation {
    pub key: String,
    pub raw_value: String,
    pub timestamp: Option<OffsetDateTime>,
    pub timestamp_was_malformed: bool,
}

/// Crude per-unit conversion table (spec §4.4 "apply unit conversion
/// table"); factors convert the adapter's native unit into the data item's
/// declared unit. Unrecognized units pass through unchanged.
fn convert_units(from_unit: &str, to_unit: &str, value: f64) -> f64 {
    match (from_unit, to_unit) {
        ("INCH", "MILLIMETER") => value * 25.4,
        ("MILLIMETER", "INCH") => value / 25.4,
        ("FAHRENHEIT", "CELSIUS") => (value - 32.0) * 5.0 / 9.0,
        ("CELSIUS", "FAHRENHEIT") => value * 9.0 / 5.0 + 32.0,
        _ => value,
    }
}

pub struct IngestionPipeline {
    model: DeviceModel,
    buffer: Buffer,
}

impl IngestionPipeline {
    pub fn new(model: DeviceModel, buffer: Buffer) -> Self {
        Self { model, buffer }
    }

    pub fn buffer(&self) -> &Buffer {
        &self.buffer
    }

    pub fn model(&self) -> &DeviceModel {
        &self.model
    }

    /// Run one raw observation through the full chain. `relative_base` is
    /// the adapter's connection-establishment time, used when `RelativeTime`
    /// is negotiated (timestamps on the wire are then offsets from it).
    pub fn process(
        &self,
        raw: RawObservation,
        receive_time: OffsetDateTime,
        options: &AdapterOptions,
        relative_base: Option<OffsetDateTime>,
    ) -> IngestOutcome {
        let Some(item) = self.model.get_data_item(&raw.key) else {
            tracing::warn!(key = %raw.key, "dropping observation for unknown data item");
            return IngestOutcome::Dropped(DropReason::UnknownDataItem(raw.key));
        };

        if raw.timestamp_was_malformed {
            tracing::warn!(key = %raw.key, "malformed timestamp, using receive time");
        }
        let timestamp = self.normalize_timestamp(raw.timestamp, receive_time, options, relative_base);

        match item.representation {
            Representation::DataSet => self.process_data_set(item, &raw.raw_value, timestamp),
            _ => self.process_scalar(item, &raw.raw_value, timestamp, options),
        }
    }

    fn normalize_timestamp(
        &self,
        timestamp: Option<OffsetDateTime>,
        receive_time: OffsetDateTime,
        options: &AdapterOptions,
        relative_base: Option<OffsetDateTime>,
    ) -> OffsetDateTime {
        let base = timestamp.unwrap_or(receive_time);
        if options.relative_time {
            if let Some(relative_base) = relative_base {
                let offset_ms = base.unix_timestamp_nanos() / 1_000_000;
                return relative_base + Duration::milliseconds(offset_ms as i64);
            }
        }
        base
    }

    fn process_scalar(
        &self,
        item: &DataItem,
        raw_value: &str,
        timestamp: OffsetDateTime,
        options: &AdapterOptions,
    ) -> IngestOutcome {
        let value = match raw_value.parse::<f64>() {
            Ok(n) => Value::Numeric(n),
            Err(_) => Value::Scalar(raw_value.to_string()),
        };
        let value = self.apply_unit_conversion(item, value, options);

        if let Some(constraint) = &item.constraint {
            let previous = self.buffer.latest().get(&item.id).cloned();
            if let Err(reason) = check_constraint(constraint, previous.as_ref(), &value) {
                tracing::warn!(data_item = %item.id, %reason, "dropping observation: constraint violation");
                return IngestOutcome::Dropped(DropReason::ConstraintViolation(reason));
            }
        }

        let observation = Observation::new(item.id.clone(), timestamp, value);
        IngestOutcome::Accepted(self.buffer.append(observation))
    }

    /// Convert a scalar value from the data item's declared native unit into
    /// its target unit, but only when the adapter negotiated
    /// `conversionRequired` (spec §4.4). Without a native/target unit pair on
    /// the data item, or with conversion not required, the value passes
    /// through unchanged.
    fn apply_unit_conversion(&self, item: &DataItem, value: Value, options: &AdapterOptions) -> Value {
        if !options.conversion_required {
            return value;
        }
        match (&item.native_units, &item.units, value) {
            (Some(native), Some(target), Value::Numeric(n)) => Value::Numeric(convert_units(native, target, n)),
            (_, _, other) => other,
        }
    }

    fn process_data_set(&self, item: &DataItem, raw_value: &str, timestamp: OffsetDateTime) -> IngestOutcome {
        let parsed = shdr::parse_data_set(raw_value);
        for malformed in &parsed.malformed {
            tracing::warn!(data_item = %item.id, pair = %malformed, "dropping malformed data-set pair");
        }
        let folded = self.buffer.fold_data_set(&item.id, parsed.reset, &parsed.entries);
        let observation = Observation::new(item.id.clone(), timestamp, Value::DataSet(folded)).reset(parsed.reset);
        IngestOutcome::Accepted(self.buffer.append(observation))
    }
}

fn check_constraint(constraint: &Constraint, previous: Option<&Observation>, value: &Value) -> Result<(), String> {
    match constraint {
        Constraint::Enum(allowed) => {
            if let Value::Scalar(s) = value {
                if !allowed.iter().any(|a| a == s) {
                    return Err(format!("{s:?} is not one of {allowed:?}"));
                }
            }
        }
        Constraint::Range { min, max } => {
            if let Value::Numeric(n) = value {
                if *n < *min || *n > *max {
                    return Err(format!("{n} outside range [{min}, {max}]"));
                }
            }
        }
        Constraint::Filter { minimum_delta } => {
            if let (Value::Numeric(n), Some(Observation { value: Value::Numeric(prev), .. })) = (value, previous) {
                if (n - prev).abs() < *minimum_delta {
                    return Err(format!("delta {} below filter threshold {minimum_delta}", (n - prev).abs()));
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::adapter::AdapterOptions;
    use crate::device_model::{Category, Component, DataItem};

    fn pipeline_with_item(item: DataItem) -> IngestionPipeline {
        let mut model = DeviceModel::new();
        let mut device = Component::new("d1", "Device1", "Device");
        device.add_data_item(item);
        model.add_device(device).unwrap();
        IngestionPipeline::new(model, Buffer::new(64, 8))
    }

    #[test]
    fn unknown_key_is_dropped() {
        let pipeline = pipeline_with_item(DataItem::new("known", "AVAILABILITY", Category::Event));
        let raw = RawObservation {
            key: "unknown".into(),
            raw_value: "AVAILABLE".into(),
            timestamp: None,
            timestamp_was_malformed: false,
        };
        let outcome = pipeline.process(raw, OffsetDateTime::now_utc(), &AdapterOptions::default(), None);
        assert_eq!(outcome, IngestOutcome::Dropped(DropReason::UnknownDataItem("unknown".into())));
    }

    #[test]
    fn scalar_observation_is_accepted() {
        let pipeline = pipeline_with_item(DataItem::new("avail", "AVAILABILITY", Category::Event));
        let raw = RawObservation {
            key: "avail".into(),
            raw_value: "AVAILABLE".into(),
            timestamp: None,
            timestamp_was_malformed: false,
        };
        let outcome = pipeline.process(raw, OffsetDateTime::now_utc(), &AdapterOptions::default(), None);
        assert!(matches!(outcome, IngestOutcome::Accepted(_)));
    }

    #[test]
    fn range_constraint_drops_out_of_bounds_value() {
        let item = DataItem::new("temp", "TEMPERATURE", Category::Sample)
            .with_constraint(Constraint::Range { min: 0.0, max: 100.0 });
        let pipeline = pipeline_with_item(item);
        let raw = RawObservation {
            key: "temp".into(),
            raw_value: "500".into(),
            timestamp: None,
            timestamp_was_malformed: false,
        };
        let outcome = pipeline.process(raw, OffsetDateTime::now_utc(), &AdapterOptions::default(), None);
        assert!(matches!(outcome, IngestOutcome::Dropped(DropReason::ConstraintViolation(_))));
    }

    #[test]
    fn conversion_required_converts_native_to_target_unit() {
        let item = DataItem::new("pos", "POSITION", Category::Sample).with_units("MILLIMETER", "INCH");
        let pipeline = pipeline_with_item(item);
        let raw = RawObservation {
            key: "pos".into(),
            raw_value: "2".into(),
            timestamp: None,
            timestamp_was_malformed: false,
        };
        let options = AdapterOptions { conversion_required: true, ..AdapterOptions::default() };
        pipeline.process(raw, OffsetDateTime::now_utc(), &options, None);
        let checkpoint = pipeline.buffer().latest();
        match checkpoint.get("pos").unwrap().value {
            Value::Numeric(n) => assert!((n - 50.8).abs() < 1e-9),
            _ => panic!("expected numeric value"),
        }
    }

    #[test]
    fn conversion_not_required_passes_value_through() {
        let item = DataItem::new("pos", "POSITION", Category::Sample).with_units("MILLIMETER", "INCH");
        let pipeline = pipeline_with_item(item);
        let raw = RawObservation {
            key: "pos".into(),
            raw_value: "2".into(),
            timestamp: None,
            timestamp_was_malformed: false,
        };
        let options = AdapterOptions { conversion_required: false, ..AdapterOptions::default() };
        pipeline.process(raw, OffsetDateTime::now_utc(), &options, None);
        let checkpoint = pipeline.buffer().latest();
        match checkpoint.get("pos").unwrap().value {
            Value::Numeric(n) => assert!((n - 2.0).abs() < 1e-9),
            _ => panic!("expected numeric value"),
        }
    }

    #[test]
    fn data_set_observation_folds_against_checkpoint() {
        let item = DataItem::new("v1", "VARIABLE", Category::Event).with_representation(Representation::DataSet);
        let pipeline = pipeline_with_item(item);
        let raw = RawObservation {
            key: "v1".into(),
            raw_value: "a:1 b:2 c:3 d:4".into(),
            timestamp: None,
            timestamp_was_malformed: false,
        };
        pipeline.process(raw, OffsetDateTime::now_utc(), &AdapterOptions::default(), None);
        let checkpoint = pipeline.buffer().latest();
        let value = &checkpoint.get("v1").unwrap().value;
        assert_eq!(value.sample_count(), 4);
    }
}
