use std::cmp::Ordering;
use std::fmt;

use serde::Deserialize;
use serde::Serialize;

/// A bound parameter or a stored column value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SqlValue {
    Null,
    Int(i32),
    Int64(i64),
    Double(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl SqlValue {
    /// Name used in `bind_<type>(...)` diagnostics
    pub fn bind_type(&self) -> &'static str {
        match self {
            SqlValue::Null => "null",
            SqlValue::Int(_) => "int",
            SqlValue::Int64(_) => "int64",
            SqlValue::Double(_) => "double",
            SqlValue::Text(_) => "text",
            SqlValue::Blob(_) => "blob",
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            SqlValue::Int(v) => Some(*v as f64),
            SqlValue::Int64(v) => Some(*v as f64),
            SqlValue::Double(v) => Some(*v),
            _ => None,
        }
    }

    fn storage_class(&self) -> u8 {
        match self {
            SqlValue::Null => 0,
            SqlValue::Int(_) | SqlValue::Int64(_) | SqlValue::Double(_) => 1,
            SqlValue::Text(_) => 2,
            SqlValue::Blob(_) => 3,
        }
    }

    /// Ordering across storage classes: null < numeric < text < blob.
    /// Integers and doubles compare numerically.
    pub fn sort_cmp(
        &self,
        other: &SqlValue,
    ) -> Ordering {
        match (self, other) {
            (SqlValue::Int(a), SqlValue::Int(b)) => a.cmp(b),
            (SqlValue::Int64(a), SqlValue::Int64(b)) => a.cmp(b),
            (SqlValue::Text(a), SqlValue::Text(b)) => a.cmp(b),
            (SqlValue::Blob(a), SqlValue::Blob(b)) => a.cmp(b),
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
                _ => a.storage_class().cmp(&b.storage_class()),
            },
        }
    }

    /// Text rendering used by `LIKE` and text extraction
    pub fn as_text(&self) -> String {
        match self {
            SqlValue::Null => String::new(),
            SqlValue::Int(v) => v.to_string(),
            SqlValue::Int64(v) => v.to_string(),
            SqlValue::Double(v) => v.to_string(),
            SqlValue::Text(v) => v.clone(),
            SqlValue::Blob(v) => String::from_utf8_lossy(v).into_owned(),
        }
    }
}

impl fmt::Display for SqlValue {
    /// `bind_text("aa:bb", 5)`, `bind_int(12)`, ...
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "bind_{}", self.bind_type())?;
        match self {
            SqlValue::Null => write!(f, "(null)"),
            SqlValue::Int(v) => write!(f, "({v})"),
            SqlValue::Int64(v) => write!(f, "({v})"),
            SqlValue::Double(v) => write!(f, "({v})"),
            SqlValue::Text(v) => write!(f, "(\"{}\", {})", v, v.len()),
            SqlValue::Blob(v) => write!(f, "(\"{}\", {})", String::from_utf8_lossy(v), v.len()),
        }
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        SqlValue::Int(v)
    }
}

impl From<u32> for SqlValue {
    fn from(v: u32) -> Self {
        SqlValue::Int64(v as i64)
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Int64(v)
    }
}

impl From<u64> for SqlValue {
    fn from(v: u64) -> Self {
        SqlValue::Int64(v as i64)
    }
}

impl From<f32> for SqlValue {
    fn from(v: f32) -> Self {
        SqlValue::Double(v as f64)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::Double(v)
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Int(v as i32)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<Vec<u8>> for SqlValue {
    fn from(v: Vec<u8>) -> Self {
        SqlValue::Blob(v)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(SqlValue::Null)
    }
}

/// Typed extraction of one result column.
///
/// Conversions are lossy in the same way as a dynamically typed SQL store:
/// NULL reads as zero/empty, text is parsed as a number when asked for one,
/// and booleans are any non-zero integer.
pub trait FromColumn: Sized {
    fn from_column(value: &SqlValue) -> Self;
}

fn column_i64(value: &SqlValue) -> i64 {
    match value {
        SqlValue::Null => 0,
        SqlValue::Int(v) => *v as i64,
        SqlValue::Int64(v) => *v,
        SqlValue::Double(v) => *v as i64,
        SqlValue::Text(v) => {
            let v = v.trim();
            v.parse::<i64>()
                .or_else(|_| v.parse::<f64>().map(|f| f as i64))
                .unwrap_or(0)
        }
        SqlValue::Blob(_) => 0,
    }
}

fn column_f64(value: &SqlValue) -> f64 {
    match value {
        SqlValue::Int(v) => *v as f64,
        SqlValue::Int64(v) => *v as f64,
        SqlValue::Double(v) => *v,
        SqlValue::Text(v) => v.trim().parse::<f64>().unwrap_or(0.0),
        SqlValue::Null | SqlValue::Blob(_) => 0.0,
    }
}

impl FromColumn for i32 {
    fn from_column(value: &SqlValue) -> Self {
        column_i64(value) as i32
    }
}

impl FromColumn for u32 {
    fn from_column(value: &SqlValue) -> Self {
        column_i64(value) as u32
    }
}

impl FromColumn for i64 {
    fn from_column(value: &SqlValue) -> Self {
        column_i64(value)
    }
}

impl FromColumn for u64 {
    fn from_column(value: &SqlValue) -> Self {
        column_i64(value) as u64
    }
}

impl FromColumn for f32 {
    fn from_column(value: &SqlValue) -> Self {
        column_f64(value) as f32
    }
}

impl FromColumn for f64 {
    fn from_column(value: &SqlValue) -> Self {
        column_f64(value)
    }
}

impl FromColumn for bool {
    fn from_column(value: &SqlValue) -> Self {
        column_i64(value) != 0
    }
}

impl FromColumn for String {
    fn from_column(value: &SqlValue) -> Self {
        value.as_text()
    }
}

impl FromColumn for Vec<u8> {
    fn from_column(value: &SqlValue) -> Self {
        match value {
            SqlValue::Blob(v) => v.clone(),
            SqlValue::Null => Vec::new(),
            other => other.as_text().into_bytes(),
        }
    }
}
