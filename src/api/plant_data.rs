//! Extraction of the latest measurements from plant statistics.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use crate::fusion_solar::{FusionSolarError, FusionSolarResult};

use super::as_number;

/// Marker the portal uses for a missing sample.
const MISSING: &str = "--";

const IGNORED_KEYS: [&str; 4] = ["xAxis", "stationTimezone", "clientTimezone", "stationDn"];

/// Last valid sample of a series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LastValue {
    pub time: String,
    pub value: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PlantValue {
    Series(LastValue),
    Flag(bool),
    Number(f64),
    Missing,
}

/// Reduces the output of `get_plant_stats` to one value per key.
///
/// Series become their last non-missing sample, `exist*` keys become flags,
/// everything else is read as a number. Values that do not fit are reported
/// as [`PlantValue::Missing`].
pub fn get_last_plant_data(plant_data: &Value) -> FusionSolarResult<BTreeMap<String, PlantValue>> {
    let Some(measurement_times) = plant_data.get("xAxis") else {
        return Err(FusionSolarError::InvalidArgument(
            "Invalid plant_data object passed.".into(),
        ));
    };
    let measurement_times = measurement_times.as_array().map(Vec::as_slice).unwrap_or_default();
    let Some(fields) = plant_data.as_object() else {
        return Err(FusionSolarError::InvalidArgument(
            "Invalid plant_data object passed.".into(),
        ));
    };

    let mut extracted = BTreeMap::new();
    for (key, value) in fields {
        if IGNORED_KEYS.contains(&key.as_str()) {
            continue;
        }

        let parsed = match value {
            Value::Array(values) => last_value(values, measurement_times).map(PlantValue::Series),
            Value::String(text) if text == MISSING => None,
            _ if key.starts_with("exist") => Some(PlantValue::Flag(truthy(value))),
            _ => as_number(value).map(PlantValue::Number),
        };

        extracted.insert(
            key.clone(),
            parsed.unwrap_or_else(|| {
                log::debug!("Failed to parse {key} = {value}");
                PlantValue::Missing
            }),
        );
    }

    Ok(extracted)
}

/// `None` when a sample is unreadable or has no matching timepoint.
fn last_value(values: &[Value], measurement_times: &[Value]) -> Option<LastValue> {
    let mut last = None;
    for (index, value) in values.iter().enumerate() {
        if value.as_str() == Some(MISSING) {
            continue;
        }
        let time = measurement_times.get(index)?;
        let time = match time {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        };
        last = Some(LastValue {
            time,
            value: Some(as_number(value)?),
        });
    }

    Some(last.unwrap_or_else(|| LastValue {
        time: chrono::Local::now().format("%Y-%m-%d %H:%M").to_string(),
        value: None,
    }))
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        Value::String(text) => !text.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}
