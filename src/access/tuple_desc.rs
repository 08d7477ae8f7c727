//! Tuple schema: an ordered list of typed, optionally named fields.

use crate::access::value::DataType;
use crate::storage::error::{StorageError, StorageResult};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldInfo {
    pub data_type: DataType,
    pub name: Option<String>,
}

impl FieldInfo {
    pub fn new(data_type: DataType, name: Option<String>) -> Self {
        Self { data_type, name }
    }
}

impl fmt::Display for FieldInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{}({})", self.data_type, name),
            None => write!(f, "{}", self.data_type),
        }
    }
}

/// Describes the layout of every tuple stored in one heap file.
///
/// Two descriptors are equal when their field types match position by
/// position; field names are ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TupleDesc {
    fields: Vec<FieldInfo>,
    byte_size: usize,
}

impl TupleDesc {
    /// Creates a descriptor with anonymous fields.
    pub fn new(types: Vec<DataType>) -> Self {
        Self::from_fields(types.into_iter().map(|t| FieldInfo::new(t, None)).collect())
    }

    /// Creates a descriptor with named fields. `names` shorter than `types`
    /// leaves the trailing fields anonymous.
    pub fn with_names(types: Vec<DataType>, names: Vec<String>) -> Self {
        let mut names = names.into_iter();
        Self::from_fields(
            types
                .into_iter()
                .map(|t| FieldInfo::new(t, names.next()))
                .collect(),
        )
    }

    pub fn from_fields(fields: Vec<FieldInfo>) -> Self {
        let byte_size = fields.iter().map(|f| f.data_type.width()).sum();
        Self { fields, byte_size }
    }

    /// Concatenates two descriptors, `a`'s fields first.
    pub fn merge(a: &TupleDesc, b: &TupleDesc) -> TupleDesc {
        let fields = a.fields.iter().chain(b.fields.iter()).cloned().collect();
        Self::from_fields(fields)
    }

    pub fn num_fields(&self) -> usize {
        self.fields.len()
    }

    pub fn fields(&self) -> &[FieldInfo] {
        &self.fields
    }

    pub fn field_type(&self, index: usize) -> StorageResult<DataType> {
        self.field(index).map(|f| f.data_type)
    }

    pub fn field_name(&self, index: usize) -> StorageResult<Option<&str>> {
        self.field(index).map(|f| f.name.as_deref())
    }

    /// Index of the first field called `name`.
    pub fn index_of(&self, name: &str) -> StorageResult<usize> {
        self.fields
            .iter()
            .position(|f| f.name.as_deref() == Some(name))
            .ok_or_else(|| StorageError::SchemaMismatch(format!("No field named {}", name)))
    }

    pub fn types(&self) -> impl Iterator<Item = DataType> + '_ {
        self.fields.iter().map(|f| f.data_type)
    }

    /// Width in bytes of one tuple with this layout.
    pub fn byte_size(&self) -> usize {
        self.byte_size
    }

    fn field(&self, index: usize) -> StorageResult<&FieldInfo> {
        self.fields.get(index).ok_or_else(|| {
            StorageError::SchemaMismatch(format!(
                "Field index {} out of range ({} fields)",
                index,
                self.fields.len()
            ))
        })
    }
}

impl PartialEq for TupleDesc {
    fn eq(&self, other: &Self) -> bool {
        self.fields.len() == other.fields.len() && self.types().eq(other.types())
    }
}

impl Eq for TupleDesc {}

impl fmt::Display for TupleDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, field) in self.fields.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", field)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_size() {
        let td = TupleDesc::new(vec![DataType::Int32, DataType::Int32]);
        assert_eq!(td.byte_size(), 8);

        let td = TupleDesc::new(vec![DataType::Int32, DataType::Varchar, DataType::Boolean]);
        assert_eq!(td.byte_size(), 4 + 132 + 1);
    }

    #[test]
    fn test_equality_ignores_names() {
        let a = TupleDesc::with_names(
            vec![DataType::Int32, DataType::Varchar],
            vec!["id".into(), "name".into()],
        );
        let b = TupleDesc::new(vec![DataType::Int32, DataType::Varchar]);
        let c = TupleDesc::new(vec![DataType::Varchar, DataType::Int32]);
        let d = TupleDesc::new(vec![DataType::Int32]);

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
    }

    #[test]
    fn test_field_lookup() -> StorageResult<()> {
        let td = TupleDesc::with_names(
            vec![DataType::Int32, DataType::Varchar, DataType::Int32],
            vec!["a".into(), "b".into(), "a".into()],
        );
        assert_eq!(td.index_of("a")?, 0);
        assert_eq!(td.index_of("b")?, 1);
        assert!(td.index_of("zzz").is_err());
        assert_eq!(td.field_type(1)?, DataType::Varchar);
        assert_eq!(td.field_name(2)?, Some("a"));
        assert!(td.field_type(3).is_err());
        Ok(())
    }

    #[test]
    fn test_partial_names() -> StorageResult<()> {
        let td = TupleDesc::with_names(vec![DataType::Int32, DataType::Int32], vec!["x".into()]);
        assert_eq!(td.field_name(0)?, Some("x"));
        assert_eq!(td.field_name(1)?, None);
        Ok(())
    }

    #[test]
    fn test_merge() -> StorageResult<()> {
        let a = TupleDesc::with_names(vec![DataType::Int32], vec!["l".into()]);
        let b = TupleDesc::with_names(
            vec![DataType::Varchar, DataType::Boolean],
            vec!["r1".into(), "r2".into()],
        );
        let merged = TupleDesc::merge(&a, &b);
        assert_eq!(merged.num_fields(), 3);
        assert_eq!(merged.byte_size(), a.byte_size() + b.byte_size());
        assert_eq!(merged.index_of("r2")?, 2);
        Ok(())
    }

    #[test]
    fn test_display() {
        let td = TupleDesc::with_names(vec![DataType::Int32, DataType::Varchar], vec!["id".into()]);
        assert_eq!(td.to_string(), "INT(id), VARCHAR");
    }
}
