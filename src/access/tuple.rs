use crate::access::tuple_desc::TupleDesc;
use crate::access::value::Value;
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::page::PageId;
use std::cmp::Ordering;
use std::fmt;
use std::io::Cursor;
use std::sync::Arc;

/// Storage location of a tuple: a page and a slot on that page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordId {
    pub page_id: PageId,
    pub slot: usize,
}

impl RecordId {
    pub fn new(page_id: PageId, slot: usize) -> Self {
        Self { page_id, slot }
    }
}

impl PartialOrd for RecordId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RecordId {
    fn cmp(&self, other: &Self) -> Ordering {
        // First compare by page, then by slot
        match self.page_id.cmp(&other.page_id) {
            Ordering::Equal => self.slot.cmp(&other.slot),
            other => other,
        }
    }
}

/// Represents a row in the database
#[derive(Debug, Clone)]
pub struct Tuple {
    desc: Arc<TupleDesc>,
    values: Vec<Value>,
    record_id: Option<RecordId>,
}

impl Tuple {
    /// Creates a tuple whose fields hold their type's default value.
    pub fn new(desc: Arc<TupleDesc>) -> Self {
        let values = desc.types().map(|t| t.default_value()).collect();
        Self {
            desc,
            values,
            record_id: None,
        }
    }

    pub fn from_values(desc: Arc<TupleDesc>, values: Vec<Value>) -> StorageResult<Self> {
        if values.len() != desc.num_fields() {
            return Err(StorageError::SchemaMismatch(format!(
                "Value count {} doesn't match schema length {}",
                values.len(),
                desc.num_fields()
            )));
        }
        for (i, (value, expected)) in values.iter().zip(desc.types()).enumerate() {
            if !value.is_compatible_with(expected) {
                return Err(StorageError::SchemaMismatch(format!(
                    "Field {}: value {:?} is not compatible with type {}",
                    i, value, expected
                )));
            }
        }
        Ok(Self {
            desc,
            values,
            record_id: None,
        })
    }

    pub fn desc(&self) -> &Arc<TupleDesc> {
        &self.desc
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn value(&self, index: usize) -> StorageResult<&Value> {
        self.values.get(index).ok_or_else(|| {
            StorageError::SchemaMismatch(format!("Field index {} out of range", index))
        })
    }

    pub fn set_value(&mut self, index: usize, value: Value) -> StorageResult<()> {
        let expected = self.desc.field_type(index)?;
        if !value.is_compatible_with(expected) {
            return Err(StorageError::SchemaMismatch(format!(
                "Field {}: value {:?} is not compatible with type {}",
                index, value, expected
            )));
        }
        self.values[index] = value;
        Ok(())
    }

    pub fn record_id(&self) -> Option<RecordId> {
        self.record_id
    }

    pub fn set_record_id(&mut self, record_id: Option<RecordId>) {
        self.record_id = record_id;
    }

    /// Fixed-width encoding of the field values, `desc.byte_size()` bytes long.
    pub fn serialize(&self) -> StorageResult<Vec<u8>> {
        let mut data = Vec::with_capacity(self.desc.byte_size());
        for value in &self.values {
            value.serialize_into(&mut data)?;
        }
        Ok(data)
    }

    pub fn deserialize(desc: Arc<TupleDesc>, data: &[u8]) -> StorageResult<Self> {
        if data.len() < desc.byte_size() {
            return Err(StorageError::SchemaMismatch(format!(
                "Tuple data too short: {} < {}",
                data.len(),
                desc.byte_size()
            )));
        }
        let mut cursor = Cursor::new(data);
        let mut values = Vec::with_capacity(desc.num_fields());
        for data_type in desc.types() {
            values.push(Value::deserialize_from(&mut cursor, data_type)?);
        }
        Ok(Self {
            desc,
            values,
            record_id: None,
        })
    }
}

impl PartialEq for Tuple {
    fn eq(&self, other: &Self) -> bool {
        self.desc == other.desc && self.values == other.values
    }
}

impl fmt::Display for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, value) in self.values.iter().enumerate() {
            if i > 0 {
                write!(f, "\t")?;
            }
            write!(f, "{}", value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::value::DataType;

    fn desc() -> Arc<TupleDesc> {
        Arc::new(TupleDesc::new(vec![DataType::Int32, DataType::Varchar]))
    }

    #[test]
    fn test_record_id_ordering() {
        let r1 = RecordId::new(PageId::new(1, 1), 5);
        let r2 = RecordId::new(PageId::new(1, 1), 10);
        let r3 = RecordId::new(PageId::new(1, 2), 3);

        assert!(r1 < r2); // Same page, different slot
        assert!(r2 < r3); // Different page
    }

    #[test]
    fn test_new_tuple_has_defaults() {
        let tuple = Tuple::new(desc());
        assert_eq!(
            tuple.values(),
            &[Value::Int32(0), Value::String(String::new())]
        );
        assert!(tuple.record_id().is_none());
    }

    #[test]
    fn test_from_values_type_checks() {
        assert!(Tuple::from_values(desc(), vec![Value::Int32(1)]).is_err());
        assert!(Tuple::from_values(desc(), vec![Value::Int32(1), Value::Int32(2)]).is_err());
        assert!(
            Tuple::from_values(desc(), vec![Value::Int32(1), Value::String("a".into())]).is_ok()
        );
    }

    #[test]
    fn test_set_value() -> StorageResult<()> {
        let mut tuple = Tuple::new(desc());
        tuple.set_value(0, Value::Int32(9))?;
        assert_eq!(tuple.value(0)?, &Value::Int32(9));
        assert!(tuple.set_value(0, Value::Boolean(true)).is_err());
        assert!(tuple.set_value(5, Value::Int32(1)).is_err());
        Ok(())
    }

    #[test]
    fn test_serialize_width() -> StorageResult<()> {
        let tuple = Tuple::from_values(desc(), vec![Value::Int32(7), Value::String("x".into())])?;
        let data = tuple.serialize()?;
        assert_eq!(data.len(), tuple.desc().byte_size());

        let back = Tuple::deserialize(desc(), &data)?;
        assert_eq!(back, tuple);
        Ok(())
    }

    #[test]
    fn test_equality_ignores_record_id() -> StorageResult<()> {
        let a = Tuple::from_values(desc(), vec![Value::Int32(1), Value::String("a".into())])?;
        let mut b = a.clone();
        b.set_record_id(Some(RecordId::new(PageId::new(0, 0), 3)));
        assert_eq!(a, b);
        Ok(())
    }

    #[test]
    fn test_display() -> StorageResult<()> {
        let tuple = Tuple::from_values(desc(), vec![Value::Int32(7), Value::String("x".into())])?;
        assert_eq!(tuple.to_string(), "7\tx");
        Ok(())
    }
}
