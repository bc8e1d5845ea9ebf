/// Backend result model and its normalized counterpart
use bytes::Bytes;
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Backend-assigned record identifier, `#cluster:position`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordId {
    pub cluster: i16,
    pub position: i64,
}

impl RecordId {
    pub fn new(cluster: i16, position: i64) -> Self {
        Self { cluster, position }
    }

    /// String handle standing in for the record in normalized output
    pub fn handle(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}:{}", self.cluster, self.position)
    }
}

impl FromStr for RecordId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let body = s
            .strip_prefix('#')
            .ok_or_else(|| format!("Record id must start with '#': {}", s))?;
        let (cluster, position) = body
            .split_once(':')
            .ok_or_else(|| format!("Record id must be #cluster:position: {}", s))?;
        let cluster = cluster
            .parse()
            .map_err(|_| format!("Invalid cluster in record id: {}", s))?;
        let position = position
            .parse()
            .map_err(|_| format!("Invalid position in record id: {}", s))?;
        Ok(Self { cluster, position })
    }
}

/// Property value as produced by the backend
#[derive(Debug, Clone, PartialEq)]
pub enum BackendValue {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    /// Opaque byte blob
    Binary(Bytes),
    /// Cross-record reference, never resolved eagerly
    Link(RecordId),
    List(Vec<BackendValue>),
    Set(Vec<BackendValue>),
    Map(BTreeMap<String, BackendValue>),
}

impl From<&str> for BackendValue {
    fn from(value: &str) -> Self {
        BackendValue::String(value.to_string())
    }
}

impl From<String> for BackendValue {
    fn from(value: String) -> Self {
        BackendValue::String(value)
    }
}

impl From<i64> for BackendValue {
    fn from(value: i64) -> Self {
        BackendValue::Integer(value)
    }
}

impl From<bool> for BackendValue {
    fn from(value: bool) -> Self {
        BackendValue::Bool(value)
    }
}

impl From<RecordId> for BackendValue {
    fn from(value: RecordId) -> Self {
        BackendValue::Link(value)
    }
}

/// A single structured result unit from the backend
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BackendRecord {
    /// Record type name, empty if untyped
    pub class: String,
    pub rid: Option<RecordId>,
    /// Monotonic revision counter
    pub version: i64,
    pub properties: BTreeMap<String, BackendValue>,
}

impl BackendRecord {
    pub fn new(class: &str) -> Self {
        Self {
            class: class.to_string(),
            ..Default::default()
        }
    }

    pub fn with_rid(mut self, rid: RecordId) -> Self {
        self.rid = Some(rid);
        self
    }

    pub fn with_version(mut self, version: i64) -> Self {
        self.version = version;
        self
    }

    pub fn with_property<V: Into<BackendValue>>(mut self, name: &str, value: V) -> Self {
        self.properties.insert(name.to_string(), value.into());
        self
    }
}

/// Tagged result shape returned by query, traversal and control paths
#[derive(Debug, Clone, PartialEq)]
pub enum BackendResult {
    Record(BackendRecord),
    Scalar(BackendValue),
    Sequence(Vec<BackendResult>),
}

/// Property value after normalization: no binaries, links as handles
#[derive(Debug, Clone, PartialEq)]
pub enum NormalizedValue {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    Reference(String),
    List(Vec<NormalizedValue>),
    Set(Vec<NormalizedValue>),
    Map(BTreeMap<String, NormalizedValue>),
}

impl NormalizedValue {
    /// Compact text used for table cells
    pub fn to_cell_text(&self) -> String {
        match self {
            NormalizedValue::Null => String::new(),
            NormalizedValue::Bool(b) => b.to_string(),
            NormalizedValue::Integer(i) => i.to_string(),
            NormalizedValue::Float(f) => f.to_string(),
            NormalizedValue::String(s) | NormalizedValue::Reference(s) => s.clone(),
            other => serde_json::to_string(other).unwrap_or_default(),
        }
    }
}

impl Serialize for NormalizedValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            NormalizedValue::Null => serializer.serialize_unit(),
            NormalizedValue::Bool(b) => serializer.serialize_bool(*b),
            NormalizedValue::Integer(i) => serializer.serialize_i64(*i),
            NormalizedValue::Float(f) => serializer.serialize_f64(*f),
            NormalizedValue::String(s) | NormalizedValue::Reference(s) => {
                serializer.serialize_str(s)
            }
            NormalizedValue::List(items) | NormalizedValue::Set(items) => {
                items.serialize(serializer)
            }
            NormalizedValue::Map(map) => map.serialize(serializer),
        }
    }
}

/// Structured mapping produced from one backend record
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct NormalizedRecord {
    pub class: String,
    pub rid: String,
    pub version: i64,
    pub storage: BTreeMap<String, NormalizedValue>,
}

/// Output of an invocation that returns a value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum NormalizedResult {
    Record(NormalizedRecord),
    Scalar(NormalizedValue),
    Sequence(Vec<NormalizedResult>),
}

impl NormalizedResult {
    /// Elements rendered one per row / document
    pub fn elements(&self) -> Vec<&NormalizedResult> {
        match self {
            NormalizedResult::Sequence(items) => items.iter().collect(),
            other => vec![other],
        }
    }

    pub fn as_record(&self) -> Option<&NormalizedRecord> {
        match self {
            NormalizedResult::Record(record) => Some(record),
            _ => None,
        }
    }

    /// Strings of a sequence of string scalars, e.g. `list databases`
    pub fn as_strings(&self) -> Option<Vec<&str>> {
        match self {
            NormalizedResult::Sequence(items) => items
                .iter()
                .map(|item| match item {
                    NormalizedResult::Scalar(NormalizedValue::String(s)) => Some(s.as_str()),
                    _ => None,
                })
                .collect(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_id_round_trip() {
        let rid: RecordId = "#12:7".parse().unwrap();
        assert_eq!(rid, RecordId::new(12, 7));
        assert_eq!(rid.handle(), "#12:7");

        assert!("12:7".parse::<RecordId>().is_err());
        assert!("#12".parse::<RecordId>().is_err());
        assert!("#a:b".parse::<RecordId>().is_err());
    }

    #[test]
    fn test_normalized_record_json_shape() {
        let mut storage = BTreeMap::new();
        storage.insert("name".to_string(), NormalizedValue::String("alice".to_string()));
        storage.insert("friend".to_string(), NormalizedValue::Reference("#9:1".to_string()));
        storage.insert(
            "tags".to_string(),
            NormalizedValue::Set(vec![NormalizedValue::Integer(1), NormalizedValue::Null]),
        );
        let record = NormalizedRecord {
            class: "Person".to_string(),
            rid: "#9:0".to_string(),
            version: 3,
            storage,
        };

        let json = serde_json::to_value(NormalizedResult::Record(record)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "class": "Person",
                "rid": "#9:0",
                "version": 3,
                "storage": {"friend": "#9:1", "name": "alice", "tags": [1, null]}
            })
        );
    }

    #[test]
    fn test_as_strings() {
        let result = NormalizedResult::Sequence(vec![
            NormalizedResult::Scalar(NormalizedValue::String("a".to_string())),
            NormalizedResult::Scalar(NormalizedValue::String("b".to_string())),
        ]);
        assert_eq!(result.as_strings(), Some(vec!["a", "b"]));

        let mixed = NormalizedResult::Sequence(vec![NormalizedResult::Scalar(
            NormalizedValue::Integer(1),
        )]);
        assert_eq!(mixed.as_strings(), None);
    }

    #[test]
    fn test_cell_text() {
        assert_eq!(NormalizedValue::Null.to_cell_text(), "");
        assert_eq!(NormalizedValue::Reference("#1:2".to_string()).to_cell_text(), "#1:2");
        assert_eq!(
            NormalizedValue::List(vec![NormalizedValue::Integer(1), NormalizedValue::Bool(true)])
                .to_cell_text(),
            "[1,true]"
        );
    }
}
