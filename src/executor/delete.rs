//! Delete executor implementation.

use crate::access::{Tuple, TupleDesc, Value};
use crate::executor::{count_desc, ExecutionContext, OpIterator, Operator};
use anyhow::Result;
use std::sync::Arc;

/// Deletes every tuple its child produces, located by record id.
///
/// Same shape as [`Insert`](super::Insert): one count tuple, then `None`.
pub struct Delete {
    context: ExecutionContext,
    child: Box<Operator>,
    desc: Arc<TupleDesc>,
    done: bool,
    is_open: bool,
}

impl Delete {
    pub fn new(context: &ExecutionContext, child: Operator) -> Self {
        Self {
            context: context.clone(),
            child: Box::new(child),
            desc: count_desc(),
            done: false,
            is_open: false,
        }
    }
}

impl OpIterator for Delete {
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
            self.context.pool.delete_tuple(self.context.tid, &mut tuple)?;
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::DataType;
    use crate::executor::test_util::create_test_table;
    use crate::executor::{SeqScan, ValuesExecutor};
    use crate::storage::error::StorageError;
    use crate::transaction::TransactionId;

    #[test]
    fn test_delete_all_rows() -> Result<()> {
        let table = create_test_table(TupleDesc::new(vec![DataType::Int32]))?;
        let tid = TransactionId::new(1);
        let context = ExecutionContext::new(table.pool.clone(), tid);

        for i in 0..4 {
            let mut tuple = Tuple::from_values(table.desc.clone(), vec![Value::Int32(i)])?;
            table.pool.insert_tuple(tid, table.table_id, &mut tuple)?;
        }

        let scan = SeqScan::new(&context, table.table_id)?;
        let mut delete: Operator = Delete::new(&context, scan.into()).into();
        let out = delete.collect()?;
        assert_eq!(out[0].value(0)?, &Value::Int32(4));

        let mut scan: Operator = SeqScan::new(&context, table.table_id)?.into();
        assert!(scan.collect()?.is_empty());
        Ok(())
    }

    #[test]
    fn test_delete_requires_record_ids() -> Result<()> {
        let table = create_test_table(TupleDesc::new(vec![DataType::Int32]))?;
        let context = ExecutionContext::new(table.pool.clone(), TransactionId::new(1));

        let values =
            ValuesExecutor::from_values(table.desc.clone(), vec![vec![Value::Int32(1)]])?;
        let mut delete = Delete::new(&context, values.into());
        delete.open()?;

        let err = match delete.next() {
            Err(e) => e,
            Ok(_) => anyhow::bail!("expected TupleNotFound"),
        };
        assert!(matches!(
            err.downcast_ref::<StorageError>(),
            Some(StorageError::TupleNotFound(_))
        ));
        Ok(())
    }
}
