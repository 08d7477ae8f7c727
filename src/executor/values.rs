//! Literal rows held in memory.

use crate::access::{Tuple, TupleDesc, Value};
use crate::executor::OpIterator;
use crate::storage::error::StorageError;
use anyhow::Result;
use std::sync::Arc;

pub struct ValuesExecutor {
    desc: Arc<TupleDesc>,
    rows: Vec<Tuple>,
    position: usize,
    is_open: bool,
}

impl ValuesExecutor {
    /// Every tuple must match `desc`.
    pub fn new(desc: Arc<TupleDesc>, rows: Vec<Tuple>) -> Result<Self> {
        if let Some(bad) = rows.iter().find(|t| **t.desc() != *desc) {
            return Err(StorageError::SchemaMismatch(format!(
                "row ({}) does not match ({})",
                bad.desc(),
                desc
            ))
            .into());
        }
        Ok(Self {
            desc,
            rows,
            position: 0,
            is_open: false,
        })
    }

    /// Builds type-checked tuples from raw values.
    pub fn from_values(desc: Arc<TupleDesc>, rows: Vec<Vec<Value>>) -> Result<Self> {
        let tuples = rows
            .into_iter()
            .map(|values| Tuple::from_values(desc.clone(), values))
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(desc, tuples)
    }
}

impl OpIterator for ValuesExecutor {
    fn open(&mut self) -> Result<()> {
        self.is_open = true;
        self.position = 0;
        Ok(())
    }

    fn has_next(&mut self) -> Result<bool> {
        Ok(self.is_open && self.position < self.rows.len())
    }

    fn next(&mut self) -> Result<Option<Tuple>> {
        if !self.has_next()? {
            return Ok(None);
        }
        let tuple = self.rows[self.position].clone();
        self.position += 1;
        Ok(Some(tuple))
    }

    fn rewind(&mut self) -> Result<()> {
        self.position = 0;
        Ok(())
    }

    fn close(&mut self) {
        self.is_open = false;
    }

    fn tuple_desc(&self) -> &Arc<TupleDesc> {
        &self.desc
    }
}
