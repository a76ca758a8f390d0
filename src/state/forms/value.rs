//! Form value tree

use super::error::TrackerError;
use super::path::{FieldPath, Segment};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// A node in the form value tree
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "serde_json::Value", into = "serde_json::Value")]
pub enum FormValue {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    Date(NaiveDate),
    Object(BTreeMap<String, FormValue>),
    Array(Vec<FormValue>),
}

/// How raw text input is converted before it is stored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueAs {
    #[default]
    Text,
    Number,
    Date,
}

impl PartialEq for FormValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (FormValue::Null, FormValue::Null) => true,
            (FormValue::Bool(a), FormValue::Bool(b)) => a == b,
            // NaN marks an unparsable number input; two of them are the same input state
            (FormValue::Number(a), FormValue::Number(b)) => a == b || (a.is_nan() && b.is_nan()),
            (FormValue::Text(a), FormValue::Text(b)) => a == b,
            (FormValue::Date(a), FormValue::Date(b)) => a == b,
            (FormValue::Object(a), FormValue::Object(b)) => a == b,
            (FormValue::Array(a), FormValue::Array(b)) => a == b,
            _ => false,
        }
    }
}

impl FormValue {
    pub fn object() -> Self {
        FormValue::Object(BTreeMap::new())
    }

    /// Builder-style insert for object values; no-op on other variants
    pub fn with(mut self, key: &str, value: impl Into<FormValue>) -> Self {
        if let FormValue::Object(map) = &mut self {
            map.insert(key.to_string(), value.into());
        }
        self
    }

    /// Convert raw text input according to the field's coercion
    pub fn coerce(raw: &str, value_as: ValueAs) -> Self {
        match value_as {
            ValueAs::Text => FormValue::Text(raw.to_string()),
            ValueAs::Number => FormValue::Number(raw.trim().parse::<f64>().unwrap_or(f64::NAN)),
            ValueAs::Date => NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT)
                .map(FormValue::Date)
                .unwrap_or(FormValue::Null),
        }
    }

    /// Whether a `required` rule treats this value as missing
    pub fn is_empty_value(&self) -> bool {
        match self {
            FormValue::Null => true,
            FormValue::Bool(b) => !b,
            FormValue::Number(n) => n.is_nan(),
            FormValue::Text(s) => s.is_empty(),
            FormValue::Date(_) => false,
            FormValue::Object(map) => map.is_empty(),
            FormValue::Array(items) => items.is_empty(),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FormValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            FormValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Vec<FormValue>> {
        match self {
            FormValue::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Text used by pattern rules; dates and numbers match on their text form
    pub fn pattern_text(&self) -> Option<String> {
        match self {
            FormValue::Text(s) => Some(s.clone()),
            FormValue::Number(n) if !n.is_nan() => Some(n.to_string()),
            FormValue::Date(d) => Some(d.format(DATE_FORMAT).to_string()),
            _ => None,
        }
    }

    pub fn get(&self, path: &FieldPath) -> Option<&FormValue> {
        let mut node = self;
        for segment in path.segments() {
            node = match (node, segment) {
                (FormValue::Object(map), Segment::Key(key)) => map.get(key)?,
                (FormValue::Array(items), Segment::Index(i)) => items.get(*i)?,
                _ => return None,
            };
        }
        Some(node)
    }

    pub fn get_mut(&mut self, path: &FieldPath) -> Option<&mut FormValue> {
        let mut node = self;
        for segment in path.segments() {
            node = match (node, segment) {
                (FormValue::Object(map), Segment::Key(key)) => map.get_mut(key)?,
                (FormValue::Array(items), Segment::Index(i)) => items.get_mut(*i)?,
                _ => return None,
            };
        }
        Some(node)
    }

    /// Write `value` at `path`, creating intermediate objects and arrays
    ///
    /// A scalar standing where a container is needed gets replaced. An index
    /// may address an existing element or the slot just past the end; anything
    /// further out is refused and leaves the tree untouched.
    pub fn set(&mut self, path: &FieldPath, value: FormValue) -> Result<(), TrackerError> {
        self.check_indexes(path)?;
        let mut node = self;
        for segment in path.segments() {
            node = match segment {
                Segment::Key(key) => {
                    if !matches!(node, FormValue::Object(_)) {
                        *node = FormValue::object();
                    }
                    match node {
                        FormValue::Object(map) => map.entry(key.clone()).or_default(),
                        _ => unreachable!("node was just made an object"),
                    }
                }
                Segment::Index(i) => {
                    if !matches!(node, FormValue::Array(_)) {
                        *node = FormValue::Array(Vec::new());
                    }
                    match node {
                        FormValue::Array(items) => {
                            if *i == items.len() {
                                items.push(FormValue::Null);
                            }
                            &mut items[*i]
                        }
                        _ => unreachable!("node was just made an array"),
                    }
                }
            };
        }
        *node = value;
        Ok(())
    }

    /// Fail if an index along `path` lies more than one past the end of its array
    pub fn check_indexes(&self, path: &FieldPath) -> Result<(), TrackerError> {
        let mut node = Some(self);
        let mut prefix = FieldPath::default();
        for segment in path.segments() {
            node = match segment {
                Segment::Key(key) => {
                    prefix = prefix.key(key);
                    match node {
                        Some(FormValue::Object(map)) => map.get(key),
                        _ => None,
                    }
                }
                Segment::Index(i) => {
                    let items = match node {
                        Some(FormValue::Array(items)) => items.as_slice(),
                        _ => &[],
                    };
                    if *i > items.len() {
                        return Err(TrackerError::IndexOutOfRange {
                            path: prefix.to_string(),
                            index: *i,
                            len: items.len(),
                        });
                    }
                    prefix = prefix.index(*i);
                    items.get(*i)
                }
            };
        }
        Ok(())
    }

    /// Scalar leaves below this node, as paths relative to it
    ///
    /// Empty objects and arrays count as leaves so that they still map to a field.
    pub fn leaves(&self) -> Vec<(FieldPath, &FormValue)> {
        let mut out = Vec::new();
        Self::collect_leaves(self, FieldPath::default(), &mut out);
        out
    }

    fn collect_leaves<'a>(
        node: &'a FormValue,
        prefix: FieldPath,
        out: &mut Vec<(FieldPath, &'a FormValue)>,
    ) {
        match node {
            FormValue::Object(map) if !map.is_empty() => {
                for (key, child) in map {
                    Self::collect_leaves(child, prefix.key(key), out);
                }
            }
            FormValue::Array(items) if !items.is_empty() => {
                for (i, child) in items.iter().enumerate() {
                    Self::collect_leaves(child, prefix.index(i), out);
                }
            }
            _ => out.push((prefix, node)),
        }
    }

    /// Short human-readable rendering used in logs and the demo binary
    pub fn display_value(&self) -> String {
        match self {
            FormValue::Text(s) => s.clone(),
            FormValue::Date(d) => d.format(DATE_FORMAT).to_string(),
            other => serde_json::Value::from(other.clone()).to_string(),
        }
    }
}

impl From<serde_json::Value> for FormValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => FormValue::Null,
            serde_json::Value::Bool(b) => FormValue::Bool(b),
            serde_json::Value::Number(n) => FormValue::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => FormValue::Text(s),
            serde_json::Value::Array(items) => {
                FormValue::Array(items.into_iter().map(FormValue::from).collect())
            }
            serde_json::Value::Object(map) => FormValue::Object(
                map.into_iter()
                    .map(|(k, v)| (k, FormValue::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<FormValue> for serde_json::Value {
    fn from(value: FormValue) -> Self {
        match value {
            FormValue::Null => serde_json::Value::Null,
            FormValue::Bool(b) => serde_json::Value::Bool(b),
            FormValue::Number(n) => serde_json::Number::from_f64(n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            FormValue::Text(s) => serde_json::Value::String(s),
            FormValue::Date(d) => serde_json::Value::String(d.format(DATE_FORMAT).to_string()),
            FormValue::Array(items) => {
                serde_json::Value::Array(items.into_iter().map(serde_json::Value::from).collect())
            }
            FormValue::Object(map) => serde_json::Value::Object(
                map.into_iter()
                    .map(|(k, v)| (k, serde_json::Value::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<&str> for FormValue {
    fn from(value: &str) -> Self {
        FormValue::Text(value.to_string())
    }
}

impl From<String> for FormValue {
    fn from(value: String) -> Self {
        FormValue::Text(value)
    }
}

impl From<f64> for FormValue {
    fn from(value: f64) -> Self {
        FormValue::Number(value)
    }
}

impl From<i64> for FormValue {
    fn from(value: i64) -> Self {
        FormValue::Number(value as f64)
    }
}

impl From<bool> for FormValue {
    fn from(value: bool) -> Self {
        FormValue::Bool(value)
    }
}

impl From<NaiveDate> for FormValue {
    fn from(value: NaiveDate) -> Self {
        FormValue::Date(value)
    }
}

impl From<Vec<FormValue>> for FormValue {
    fn from(value: Vec<FormValue>) -> Self {
        FormValue::Array(value)
    }
}
