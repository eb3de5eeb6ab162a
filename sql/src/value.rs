//! Column values and result rows shared by both drivers.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A single column value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Textual form; `None` for NULL.
    pub fn to_text(&self) -> Option<String> {
        match self {
            Self::Null => None,
            Self::Int(n) => Some(n.to_string()),
            Self::Float(x) => Some(x.to_string()),
            Self::Text(s) => Some(s.clone()),
            Self::Bytes(b) => Some(String::from_utf8_lossy(b).into_owned()),
        }
    }

    /// Integer form; text is parsed, floats are truncated.
    pub fn to_int(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            Self::Float(x) => Some(*x as i64),
            Self::Text(_) | Self::Bytes(_) => {
                let text = self.to_text()?;
                let text = text.trim();
                text.parse::<i64>()
                    .ok()
                    .or_else(|| text.parse::<f64>().ok().map(|x| x as i64))
            }
            Self::Null => None,
        }
    }

    pub fn to_float(&self) -> Option<f64> {
        match self {
            Self::Int(n) => Some(*n as f64),
            Self::Float(x) => Some(*x),
            Self::Text(_) | Self::Bytes(_) => self.to_text()?.trim().parse().ok(),
            Self::Null => None,
        }
    }

    pub fn to_bool(&self) -> Option<bool> {
        match self {
            Self::Null => None,
            Self::Int(n) => Some(*n != 0),
            Self::Float(x) => Some(*x != 0.0),
            Self::Text(_) | Self::Bytes(_) => {
                let text = self.to_text()?;
                match text.trim().to_ascii_lowercase().as_str() {
                    "" | "0" | "false" | "no" | "off" => Some(false),
                    _ => Some(true),
                }
            }
        }
    }

    /// Name of the variant, used in bound-argument logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Null => "Null",
            Self::Int(_) => "Int",
            Self::Float(_) => "Float",
            Self::Text(_) => "Text",
            Self::Bytes(_) => "Bytes",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("NULL"),
            Self::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            other => f.write_str(&other.to_text().unwrap_or_default()),
        }
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Int(value.into())
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

// ---------------------------------------------------------------------------
// Driver conversions
// ---------------------------------------------------------------------------

impl From<rusqlite::types::ValueRef<'_>> for Value {
    fn from(value: rusqlite::types::ValueRef<'_>) -> Self {
        use rusqlite::types::ValueRef;
        match value {
            ValueRef::Null => Self::Null,
            ValueRef::Integer(n) => Self::Int(n),
            ValueRef::Real(x) => Self::Float(x),
            ValueRef::Text(t) => Self::Text(String::from_utf8_lossy(t).into_owned()),
            ValueRef::Blob(b) => Self::Bytes(b.to_vec()),
        }
    }
}

impl From<&Value> for rusqlite::types::Value {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Int(n) => Self::Integer(*n),
            Value::Float(x) => Self::Real(*x),
            Value::Text(s) => Self::Text(s.clone()),
            Value::Bytes(b) => Self::Blob(b.clone()),
        }
    }
}

impl From<mysql::Value> for Value {
    fn from(value: mysql::Value) -> Self {
        match value {
            mysql::Value::NULL => Self::Null,
            mysql::Value::Bytes(bytes) => match String::from_utf8(bytes) {
                Ok(text) => Self::Text(text),
                Err(err) => Self::Bytes(err.into_bytes()),
            },
            mysql::Value::Int(n) => Self::Int(n),
            mysql::Value::UInt(n) => i64::try_from(n).map_or_else(|_| Self::Text(n.to_string()), Self::Int),
            mysql::Value::Float(x) => Self::Float(f64::from(x)),
            mysql::Value::Double(x) => Self::Float(x),
            mysql::Value::Date(y, mo, d, h, mi, s, _) => {
                Self::Text(format!("{y:04}-{mo:02}-{d:02} {h:02}:{mi:02}:{s:02}"))
            }
            mysql::Value::Time(neg, days, h, mi, s, _) => {
                let hours = u32::from(h) + days * 24;
                let sign = if neg { "-" } else { "" };
                Self::Text(format!("{sign}{hours:02}:{mi:02}:{s:02}"))
            }
        }
    }
}

impl From<&Value> for mysql::Value {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => Self::NULL,
            Value::Int(n) => Self::Int(*n),
            Value::Float(x) => Self::Double(*x),
            Value::Text(s) => Self::Bytes(s.clone().into_bytes()),
            Value::Bytes(b) => Self::Bytes(b.clone()),
        }
    }
}

/// One result row with its column names.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row {
    columns: Vec<String>,
    values: Vec<Value>,
}

impl Row {
    pub fn new(columns: Vec<String>, values: Vec<Value>) -> Self {
        Self { columns, values }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value of a column by name, exact match first, then ignoring case.
    pub fn get(&self, column: &str) -> Option<&Value> {
        let index = self
            .columns
            .iter()
            .position(|c| c == column)
            .or_else(|| self.columns.iter().position(|c| c.eq_ignore_ascii_case(column)))?;
        self.values.get(index)
    }

    pub fn get_index(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }
}
