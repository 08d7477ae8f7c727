use crate::storage::error::{StorageError, StorageResult};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Cursor;

/// Maximum number of bytes stored for a `Varchar` field.
pub const STRING_LEN: usize = 128;

/// Data types supported by the database. Every type has a fixed on-page width.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    Boolean = 1,
    Int32 = 2,
    Varchar = 4,
}

impl DataType {
    pub fn from_u8(value: u8) -> StorageResult<Self> {
        match value {
            1 => Ok(DataType::Boolean),
            2 => Ok(DataType::Int32),
            4 => Ok(DataType::Varchar),
            _ => Err(StorageError::SchemaMismatch(format!(
                "Unknown data type: {}",
                value
            ))),
        }
    }

    /// Accepts the `Display` names plus common aliases, case-insensitively.
    pub fn from_name(name: &str) -> StorageResult<Self> {
        match name.to_ascii_lowercase().as_str() {
            "bool" | "boolean" => Ok(DataType::Boolean),
            "int" | "int32" | "integer" => Ok(DataType::Int32),
            "varchar" | "string" | "text" => Ok(DataType::Varchar),
            _ => Err(StorageError::SchemaMismatch(format!(
                "Unknown data type: {}",
                name
            ))),
        }
    }

    /// Number of bytes a field of this type occupies in a slot.
    pub fn width(&self) -> usize {
        match self {
            DataType::Boolean => 1,
            DataType::Int32 => 4,
            DataType::Varchar => 4 + STRING_LEN,
        }
    }

    /// Value a freshly created tuple holds for a field of this type.
    pub fn default_value(&self) -> Value {
        match self {
            DataType::Boolean => Value::Boolean(false),
            DataType::Int32 => Value::Int32(0),
            DataType::Varchar => Value::String(String::new()),
        }
    }

    /// Parses a textual value into this type.
    pub fn parse(&self, text: &str) -> StorageResult<Value> {
        match self {
            DataType::Boolean => match text.to_ascii_lowercase().as_str() {
                "true" | "t" | "1" => Ok(Value::Boolean(true)),
                "false" | "f" | "0" => Ok(Value::Boolean(false)),
                _ => Err(StorageError::SchemaMismatch(format!(
                    "Invalid boolean literal: {}",
                    text
                ))),
            },
            DataType::Int32 => text.parse::<i32>().map(Value::Int32).map_err(|e| {
                StorageError::SchemaMismatch(format!("Invalid integer literal {}: {}", text, e))
            }),
            DataType::Varchar => Ok(Value::String(text.to_string())),
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Boolean => write!(f, "BOOLEAN"),
            DataType::Int32 => write!(f, "INT"),
            DataType::Varchar => write!(f, "VARCHAR"),
        }
    }
}

/// Values that can be stored in the database
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    Boolean(bool),
    Int32(i32),
    String(String),
}

impl Value {
    /// Get the data type of this value
    pub fn data_type(&self) -> DataType {
        match self {
            Value::Boolean(_) => DataType::Boolean,
            Value::Int32(_) => DataType::Int32,
            Value::String(_) => DataType::Varchar,
        }
    }

    /// Check if this value is compatible with the given data type
    pub fn is_compatible_with(&self, data_type: DataType) -> bool {
        self.data_type() == data_type
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Value::Int32(v) => Some(*v),
            _ => None,
        }
    }

    /// Appends the fixed-width encoding of this value to `buf`.
    pub fn serialize_into(&self, buf: &mut Vec<u8>) -> StorageResult<()> {
        match self {
            Value::Boolean(b) => buf.write_u8(u8::from(*b))?,
            Value::Int32(i) => buf.write_i32::<BigEndian>(*i)?,
            Value::String(s) => {
                let bytes = truncated(s).as_bytes();
                buf.write_u32::<BigEndian>(bytes.len() as u32)?;
                buf.extend_from_slice(bytes);
                buf.resize(buf.len() + STRING_LEN - bytes.len(), 0);
            }
        }
        Ok(())
    }

    /// Reads one value of `data_type` from the cursor, consuming exactly its width.
    pub fn deserialize_from(
        cursor: &mut Cursor<&[u8]>,
        data_type: DataType,
    ) -> StorageResult<Value> {
        match data_type {
            DataType::Boolean => Ok(Value::Boolean(cursor.read_u8()? != 0)),
            DataType::Int32 => Ok(Value::Int32(cursor.read_i32::<BigEndian>()?)),
            DataType::Varchar => {
                let len = cursor.read_u32::<BigEndian>()? as usize;
                let start = cursor.position() as usize;
                let data = *cursor.get_ref();
                if len > STRING_LEN || start + STRING_LEN > data.len() {
                    return Err(StorageError::SchemaMismatch(format!(
                        "Invalid string length {} at offset {}",
                        len, start
                    )));
                }
                let s = String::from_utf8_lossy(&data[start..start + len]).into_owned();
                cursor.set_position((start + STRING_LEN) as u64);
                Ok(Value::String(s))
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Int32(i) => write!(f, "{}", i),
            Value::String(s) => write!(f, "{}", s),
        }
    }
}

// Longest prefix of `s` that fits in STRING_LEN bytes without splitting a char.
fn truncated(s: &str) -> &str {
    if s.len() <= STRING_LEN {
        return s;
    }
    let mut end = STRING_LEN;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(value: &Value) -> Vec<u8> {
        let mut buf = Vec::new();
        value.serialize_into(&mut buf).unwrap();
        buf
    }

    #[test]
    fn test_data_type_conversion() -> StorageResult<()> {
        assert_eq!(DataType::from_u8(1)?, DataType::Boolean);
        assert_eq!(DataType::from_u8(2)?, DataType::Int32);
        assert_eq!(DataType::from_u8(4)?, DataType::Varchar);
        assert!(DataType::from_u8(99).is_err());

        assert_eq!(DataType::from_name("INT")?, DataType::Int32);
        assert_eq!(DataType::from_name("text")?, DataType::Varchar);
        assert_eq!(DataType::from_name("Bool")?, DataType::Boolean);
        assert!(DataType::from_name("float").is_err());
        Ok(())
    }

    #[test]
    fn test_widths_match_encoding() {
        assert_eq!(encode(&Value::Boolean(true)).len(), DataType::Boolean.width());
        assert_eq!(encode(&Value::Int32(-7)).len(), DataType::Int32.width());
        assert_eq!(
            encode(&Value::String("abc".into())).len(),
            DataType::Varchar.width()
        );
    }

    #[test]
    fn test_int_is_big_endian() {
        assert_eq!(encode(&Value::Int32(1)), vec![0, 0, 0, 1]);
    }

    #[test]
    fn test_string_layout() {
        let bytes = encode(&Value::String("hi".into()));
        assert_eq!(&bytes[..4], &[0, 0, 0, 2]);
        assert_eq!(&bytes[4..6], b"hi");
        assert!(bytes[6..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_long_string_is_truncated() -> StorageResult<()> {
        let long = "é".repeat(100); // 200 bytes
        let bytes = encode(&Value::String(long));
        let mut cursor = Cursor::new(bytes.as_slice());
        let value = Value::deserialize_from(&mut cursor, DataType::Varchar)?;
        match value {
            Value::String(s) => {
                assert_eq!(s.len(), STRING_LEN);
                assert!(s.chars().all(|c| c == 'é'));
            }
            other => panic!("unexpected value {:?}", other),
        }
        Ok(())
    }

    #[test]
    fn test_value_compatibility() {
        assert!(Value::Boolean(true).is_compatible_with(DataType::Boolean));
        assert!(Value::Int32(42).is_compatible_with(DataType::Int32));
        assert!(Value::String("hello".to_string()).is_compatible_with(DataType::Varchar));

        assert!(!Value::Boolean(true).is_compatible_with(DataType::Int32));
        assert!(!Value::Int32(42).is_compatible_with(DataType::Varchar));
    }

    #[test]
    fn test_parse_literals() -> StorageResult<()> {
        assert_eq!(DataType::Int32.parse("-12")?, Value::Int32(-12));
        assert_eq!(DataType::Boolean.parse("TRUE")?, Value::Boolean(true));
        assert_eq!(DataType::Varchar.parse("x y")?, Value::String("x y".into()));
        assert!(DataType::Int32.parse("abc").is_err());
        Ok(())
    }
}
