//! Executor layer for query execution.
//!
//! Pull-based operators in the Volcano style: each operator produces tuples
//! one at a time and pulls from its child as needed. Operators are a closed
//! set, dispatched through [`Operator`].

use crate::access::{DataType, Tuple, TupleDesc};
use crate::storage::buffer::BufferPool;
use crate::transaction::TransactionId;
use anyhow::Result;
use std::sync::Arc;
use thiserror::Error;

pub mod aggregate;
pub mod delete;
pub mod insert;
pub mod seq_scan;
pub mod values;

pub use aggregate::{Aggregate, AggregateOp};
pub use delete::Delete;
pub use insert::Insert;
pub use seq_scan::SeqScan;
pub use values::ValuesExecutor;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutorError {
    #[error("{op} is not supported over {data_type} fields")]
    UnsupportedAggregate { op: AggregateOp, data_type: DataType },

    #[error("Field index {index} out of range for {num_fields} fields")]
    InvalidField { index: usize, num_fields: usize },
}

/// Cursor over the output of an operator.
///
/// `next` returns `Ok(None)` once exhausted; an operator that is not open
/// behaves as exhausted.
pub trait OpIterator {
    fn open(&mut self) -> Result<()>;

    fn has_next(&mut self) -> Result<bool>;

    fn next(&mut self) -> Result<Option<Tuple>>;

    /// Restarts the output from the beginning.
    fn rewind(&mut self) -> Result<()>;

    fn close(&mut self);

    fn tuple_desc(&self) -> &Arc<TupleDesc>;
}

pub enum Operator {
    SeqScan(SeqScan),
    Values(ValuesExecutor),
    Insert(Insert),
    Delete(Delete),
    Aggregate(Aggregate),
}

impl Operator {
    fn inner(&self) -> &dyn OpIterator {
        match self {
            Operator::SeqScan(op) => op,
            Operator::Values(op) => op,
            Operator::Insert(op) => op,
            Operator::Delete(op) => op,
            Operator::Aggregate(op) => op,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn OpIterator {
        match self {
            Operator::SeqScan(op) => op,
            Operator::Values(op) => op,
            Operator::Insert(op) => op,
            Operator::Delete(op) => op,
            Operator::Aggregate(op) => op,
        }
    }

    /// Opens the operator and drains it.
    pub fn collect(&mut self) -> Result<Vec<Tuple>> {
        self.open()?;
        let mut tuples = Vec::new();
        while let Some(tuple) = self.next()? {
            tuples.push(tuple);
        }
        self.close();
        Ok(tuples)
    }
}

impl OpIterator for Operator {
    fn open(&mut self) -> Result<()> {
        self.inner_mut().open()
    }

    fn has_next(&mut self) -> Result<bool> {
        self.inner_mut().has_next()
    }

    fn next(&mut self) -> Result<Option<Tuple>> {
        self.inner_mut().next()
    }

    fn rewind(&mut self) -> Result<()> {
        self.inner_mut().rewind()
    }

    fn close(&mut self) {
        self.inner_mut().close()
    }

    fn tuple_desc(&self) -> &Arc<TupleDesc> {
        self.inner().tuple_desc()
    }
}

impl From<SeqScan> for Operator {
    fn from(op: SeqScan) -> Self {
        Operator::SeqScan(op)
    }
}

impl From<ValuesExecutor> for Operator {
    fn from(op: ValuesExecutor) -> Self {
        Operator::Values(op)
    }
}

impl From<Insert> for Operator {
    fn from(op: Insert) -> Self {
        Operator::Insert(op)
    }
}

impl From<Delete> for Operator {
    fn from(op: Delete) -> Self {
        Operator::Delete(op)
    }
}

impl From<Aggregate> for Operator {
    fn from(op: Aggregate) -> Self {
        Operator::Aggregate(op)
    }
}

/// Shared resources an operator runs against: the page cache and the
/// transaction it acts for.
#[derive(Clone)]
pub struct ExecutionContext {
    pub pool: BufferPool,
    pub tid: TransactionId,
}

impl ExecutionContext {
    pub fn new(pool: BufferPool, tid: TransactionId) -> Self {
        Self { pool, tid }
    }
}

/// One-field Int32 desc used for the row counts of Insert and Delete.
pub(crate) fn count_desc() -> Arc<TupleDesc> {
    Arc::new(TupleDesc::with_names(
        vec![DataType::Int32],
        vec!["count".to_string()],
    ))
}
