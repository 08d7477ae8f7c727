//! Insert executor implementation.

use crate::access::{Tuple, TupleDesc, Value};
use crate::catalog::TableId;
use crate::executor::{count_desc, ExecutionContext, OpIterator, Operator};
use crate::storage::error::StorageError;
use anyhow::Result;
use std::sync::Arc;

/// Inserts every tuple its child produces into a table.
///
/// The first `next` performs the inserts and returns a single Int32 tuple
/// with the number of rows inserted; later calls return `None`.
pub struct Insert {
    context: ExecutionContext,
    table_id: TableId,
    child: Box<Operator>,
    desc: Arc<TupleDesc>,
    done: bool,
    is_open: bool,
}

impl Insert {
    pub fn new(context: &ExecutionContext, table_id: TableId, child: Operator) -> Result<Self> {
        let table_desc = context.pool.catalog().tuple_desc(table_id)?;
        if **child.tuple_desc() != *table_desc {
            return Err(StorageError::SchemaMismatch(format!(
                "cannot insert ({}) into table {} ({})",
                child.tuple_desc(),
                table_id,
                table_desc
            ))
            .into());
        }

        Ok(Self {
            context: context.clone(),
            table_id,
            child: Box::new(child),
            desc: count_desc(),
            done: false,
            is_open: false,
        })
    }
}

impl OpIterator for Insert {
    fn open(&mut self) -> Result<()> {
        self.child.open()?;
        self.is_open = true;
        self.done = false;
        Ok(())
    }

    fn has_next(&mut self) -> Result<bool> {
        Ok(self.is_open && !self.done)
    }

    fn next(&mut self) -> Result<Option<Tuple>> {
        if !self.has_next()? {
            return Ok(None);
        }

        let mut count = 0;
        while let Some(mut tuple) = self.child.next()? {
            self.context
                .pool
                .insert_tuple(self.context.tid, self.table_id, &mut tuple)?;
            count += 1;
        }
        self.done = true;

        Ok(Some(Tuple::from_values(
            self.desc.clone(),
            vec![Value::Int32(count)],
        )?))
    }

    fn rewind(&mut self) -> Result<()> {
        self.child.rewind()?;
        self.done = false;
        Ok(())
    }

    fn close(&mut self) {
        self.child.close();
        self.is_open = false;
    }

    fn tuple_desc(&self) -> &Arc<TupleDesc> {
        &self.desc
    }
}
