//! Table schemas and the fixed-length tuple encoding.
//!
//! Fields are laid out back to back in column order. `Int32` is a big-endian
//! `i32`; `Varchar` is a big-endian `i32` byte length followed by
//! [`STRING_LEN`] bytes of UTF-8, zero padded.

use crate::access::value::{DataType, Value, STRING_LEN};
use crate::storage::error::{StorageError, StorageResult};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use serde::{Deserialize, Serialize};
use std::io::{Cursor, Read};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub data_type: DataType,
}

impl Column {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    columns: Vec<Column>,
}

impl Schema {
    pub fn new(columns: Vec<Column>) -> Self {
        Self { columns }
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Encoded size of every tuple of this schema.
    pub fn tuple_size(&self) -> usize {
        self.columns.iter().map(|c| c.data_type.encoded_len()).sum()
    }

    pub fn encode(&self, values: &[Value]) -> StorageResult<Vec<u8>> {
        if values.len() != self.columns.len() {
            return Err(StorageError::SchemaMismatch(format!(
                "expected {} values, got {}",
                self.columns.len(),
                values.len()
            )));
        }

        let mut data = Vec::with_capacity(self.tuple_size());
        for (value, column) in values.iter().zip(&self.columns) {
            match (value, column.data_type) {
                (Value::Int32(v), DataType::Int32) => data.write_i32::<BigEndian>(*v)?,
                (Value::String(s), DataType::Varchar) => {
                    let bytes = s.as_bytes();
                    if bytes.len() > STRING_LEN {
                        return Err(StorageError::SchemaMismatch(format!(
                            "column {} holds at most {} bytes, got {}",
                            column.name,
                            STRING_LEN,
                            bytes.len()
                        )));
                    }
                    data.write_i32::<BigEndian>(bytes.len() as i32)?;
                    data.extend_from_slice(bytes);
                    data.resize(data.len() + STRING_LEN - bytes.len(), 0);
                }
                (value, expected) => {
                    return Err(StorageError::SchemaMismatch(format!(
                        "column {} expects {}, got {}",
                        column.name,
                        expected,
                        value.data_type()
                    )));
                }
            }
        }

        Ok(data)
    }

    pub fn decode(&self, data: &[u8]) -> StorageResult<Vec<Value>> {
        if data.len() != self.tuple_size() {
            return Err(StorageError::Corrupted(format!(
                "tuple is {} bytes, schema expects {}",
                data.len(),
                self.tuple_size()
            )));
        }

        let mut cursor = Cursor::new(data);
        let mut values = Vec::with_capacity(self.columns.len());
        for column in &self.columns {
            let value = match column.data_type {
                DataType::Int32 => Value::Int32(cursor.read_i32::<BigEndian>()?),
                DataType::Varchar => {
                    let len = cursor.read_i32::<BigEndian>()?;
                    if !(0..=STRING_LEN as i32).contains(&len) {
                        return Err(StorageError::Corrupted(format!(
                            "string length {} in column {}",
                            len, column.name
                        )));
                    }
                    let mut buf = [0u8; STRING_LEN];
                    cursor.read_exact(&mut buf)?;
                    let text = std::str::from_utf8(&buf[..len as usize])
                        .map_err(|e| StorageError::Corrupted(e.to_string()))?;
                    Value::String(text.to_string())
                }
            };
            values.push(value);
        }

        Ok(values)
    }
}
