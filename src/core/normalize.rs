/// Result normalization
///
/// Backend records become [`NormalizedRecord`]s: links collapse to their
/// handle string, binary payloads are omitted, containers keep their shape.
use super::record::{
    BackendRecord, BackendResult, BackendValue, NormalizedRecord, NormalizedResult,
    NormalizedValue,
};
use std::collections::BTreeMap;

/// Convert one backend record into its structured mapping.
pub fn normalize(raw: &BackendRecord) -> NormalizedRecord {
    NormalizedRecord {
        class: raw.class.clone(),
        rid: raw.rid.map(|rid| rid.handle()).unwrap_or_default(),
        version: raw.version,
        storage: normalize_map(&raw.properties),
    }
}

/// Normalize every element of an execution result, passing non-records through.
///
/// Binary scalar elements are omitted like any other binary payload.
pub fn normalize_many(raws: &[BackendResult]) -> Vec<NormalizedResult> {
    raws.iter()
        .filter(|raw| !matches!(raw, BackendResult::Scalar(BackendValue::Binary(_))))
        .map(normalize_result)
        .collect()
}

/// Normalize a single tagged result.
///
/// A lone binary scalar has nothing to be omitted from and becomes `Null`.
pub fn normalize_result(raw: &BackendResult) -> NormalizedResult {
    match raw {
        BackendResult::Record(record) => NormalizedResult::Record(normalize(record)),
        BackendResult::Scalar(value) => {
            NormalizedResult::Scalar(normalize_value(value).unwrap_or(NormalizedValue::Null))
        }
        BackendResult::Sequence(items) => NormalizedResult::Sequence(normalize_many(items)),
    }
}

/// `None` for binary payloads, which the caller omits.
pub fn normalize_value(value: &BackendValue) -> Option<NormalizedValue> {
    let normalized = match value {
        BackendValue::Binary(_) => return None,
        BackendValue::Null => NormalizedValue::Null,
        BackendValue::Bool(b) => NormalizedValue::Bool(*b),
        BackendValue::Integer(i) => NormalizedValue::Integer(*i),
        BackendValue::Float(f) => NormalizedValue::Float(*f),
        BackendValue::String(s) => NormalizedValue::String(s.clone()),
        BackendValue::Link(rid) => NormalizedValue::Reference(rid.handle()),
        BackendValue::List(items) => NormalizedValue::List(normalize_items(items)),
        BackendValue::Set(items) => NormalizedValue::Set(normalize_items(items)),
        BackendValue::Map(map) => NormalizedValue::Map(normalize_map(map)),
    };
    Some(normalized)
}

fn normalize_items(items: &[BackendValue]) -> Vec<NormalizedValue> {
    items.iter().filter_map(normalize_value).collect()
}

fn normalize_map(map: &BTreeMap<String, BackendValue>) -> BTreeMap<String, NormalizedValue> {
    map.iter()
        .filter_map(|(key, value)| normalize_value(value).map(|value| (key.clone(), value)))
        .collect()
}
