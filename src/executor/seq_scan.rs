//! Sequential scan executor implementation.

use crate::access::{DbFileIterator, HeapFileIterator, Tuple, TupleDesc};
use crate::catalog::TableId;
use crate::executor::{ExecutionContext, OpIterator};
use anyhow::{Context, Result};
use std::sync::Arc;

/// Reads every tuple of a table, in page then slot order, under the
/// context's transaction.
pub struct SeqScan {
    table_id: TableId,
    desc: Arc<TupleDesc>,
    iter: HeapFileIterator,
}

impl SeqScan {
    pub fn new(context: &ExecutionContext, table_id: TableId) -> Result<Self> {
        let file = context
            .pool
            .catalog()
            .lookup(table_id)
            .with_context(|| format!("scanning table {}", table_id))?;
        let desc = file.tuple_desc().clone();
        let iter = file.iterator(context.tid, &context.pool);

        Ok(Self {
            table_id,
            desc,
            iter,
        })
    }

    pub fn table_id(&self) -> TableId {
        self.table_id
    }
}

impl OpIterator for SeqScan {
    fn open(&mut self) -> Result<()> {
        Ok(self.iter.open()?)
    }

    fn has_next(&mut self) -> Result<bool> {
        Ok(self.iter.has_next()?)
    }

    fn next(&mut self) -> Result<Option<Tuple>> {
        Ok(self.iter.next()?)
    }

    fn rewind(&mut self) -> Result<()> {
        Ok(self.iter.rewind()?)
    }

    fn close(&mut self) {
        self.iter.close();
    }

    fn tuple_desc(&self) -> &Arc<TupleDesc> {
        &self.desc
    }
}
