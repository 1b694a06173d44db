use serde::{Deserialize, Serialize};
use std::fmt;

/// Fixed number of bytes reserved for the contents of a `Varchar` field.
pub const STRING_LEN: usize = 128;

/// Data types supported by the database. Every type has a fixed encoded
/// width, so every tuple of a table has the same size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    Int32,
    Varchar,
}

impl DataType {
    /// Number of bytes a value of this type occupies in a tuple.
    pub fn encoded_len(self) -> usize {
        match self {
            DataType::Int32 => 4,
            // length prefix, then zero-padded bytes
            DataType::Varchar => 4 + STRING_LEN,
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "int" | "int32" | "integer" => Some(DataType::Int32),
            "string" | "varchar" | "text" => Some(DataType::Varchar),
            _ => None,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Int32 => write!(f, "int"),
            DataType::Varchar => write!(f, "varchar"),
        }
    }
}

/// Values that can be stored in the database
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    Int32(i32),
    String(String),
}

impl Value {
    pub fn data_type(&self) -> DataType {
        match self {
            Value::Int32(_) => DataType::Int32,
            Value::String(_) => DataType::Varchar,
        }
    }

    /// Parses `text` as a value of `data_type`.
    pub fn parse(text: &str, data_type: DataType) -> Option<Self> {
        match data_type {
            DataType::Int32 => text.parse().ok().map(Value::Int32),
            DataType::Varchar => Some(Value::String(text.to_string())),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int32(v) => write!(f, "{}", v),
            Value::String(s) => write!(f, "{}", s),
        }
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int32(v)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encoded_len() {
        assert_eq!(DataType::Int32.encoded_len(), 4);
        assert_eq!(DataType::Varchar.encoded_len(), 132);
    }

    #[test]
    fn test_parse_type() {
        assert_eq!(DataType::parse("INT"), Some(DataType::Int32));
        assert_eq!(DataType::parse("varchar"), Some(DataType::Varchar));
        assert_eq!(DataType::parse("blob"), None);
    }

    #[test]
    fn test_parse_value() {
        assert_eq!(Value::parse("-7", DataType::Int32), Some(Value::Int32(-7)));
        assert_eq!(Value::parse("x", DataType::Int32), None);
        assert_eq!(Value::parse("abc", DataType::Varchar), Some("abc".into()));
    }
}
