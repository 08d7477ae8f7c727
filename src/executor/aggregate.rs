//! Grouped aggregation over a single field.
//!
//! Integer fields support every [`AggregateOp`]; other field types support
//! only `Count`. AVG uses integer division, and sums wrap on overflow.
//! Groups are emitted in the order their first tuple arrived.

use crate::access::{DataType, FieldInfo, Tuple, TupleDesc, Value};
use crate::executor::{ExecutorError, OpIterator, Operator};
use anyhow::{bail, Result};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Supported aggregate functions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateOp {
    Min,
    Max,
    Sum,
    Avg,
    Count,
}

impl AggregateOp {
    pub fn name(&self) -> &'static str {
        match self {
            AggregateOp::Min => "MIN",
            AggregateOp::Max => "MAX",
            AggregateOp::Sum => "SUM",
            AggregateOp::Avg => "AVG",
            AggregateOp::Count => "COUNT",
        }
    }

    pub fn supports(&self, data_type: DataType) -> bool {
        *self == AggregateOp::Count || data_type == DataType::Int32
    }
}

impl fmt::Display for AggregateOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AggregateOp {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "min" => Ok(AggregateOp::Min),
            "max" => Ok(AggregateOp::Max),
            "sum" => Ok(AggregateOp::Sum),
            "avg" => Ok(AggregateOp::Avg),
            "count" => Ok(AggregateOp::Count),
            other => bail!("unknown aggregate '{}'", other),
        }
    }
}

/// Running state for one group.
#[derive(Debug, Clone, Default)]
struct AggregateState {
    count: i32,
    sum: i32,
    min: Option<i32>,
    max: Option<i32>,
}

impl AggregateState {
    fn update(&mut self, value: &Value) {
        self.count += 1;
        if let Some(n) = value.as_i32() {
            self.sum = self.sum.wrapping_add(n);
            self.min = Some(self.min.map_or(n, |m| m.min(n)));
            self.max = Some(self.max.map_or(n, |m| m.max(n)));
        }
    }

    fn finish(&self, op: AggregateOp) -> i32 {
        match op {
            AggregateOp::Count => self.count,
            AggregateOp::Sum => self.sum,
            AggregateOp::Avg => self.sum.checked_div(self.count).unwrap_or(0),
            AggregateOp::Min => self.min.unwrap_or(0),
            AggregateOp::Max => self.max.unwrap_or(0),
        }
    }
}

pub struct Aggregate {
    child: Box<Operator>,
    agg_field: usize,
    group_field: Option<usize>,
    op: AggregateOp,
    desc: Arc<TupleDesc>,
    results: Vec<Tuple>,
    position: usize,
    is_open: bool,
}

impl Aggregate {
    /// Aggregates field `agg_field` of `child` with `op`, optionally grouped
    /// by `group_field`.
    pub fn new(
        child: Operator,
        agg_field: usize,
        group_field: Option<usize>,
        op: AggregateOp,
    ) -> Result<Self> {
        let child_desc = child.tuple_desc().clone();
        let num_fields = child_desc.num_fields();
        for index in std::iter::once(agg_field).chain(group_field) {
            if index >= num_fields {
                return Err(ExecutorError::InvalidField { index, num_fields }.into());
            }
        }

        let agg_type = child_desc.field_type(agg_field)?;
        if !op.supports(agg_type) {
            return Err(ExecutorError::UnsupportedAggregate {
                op,
                data_type: agg_type,
            }
            .into());
        }

        let agg_name = format!(
            "{}({})",
            op,
            child_desc.field_name(agg_field)?.unwrap_or("?")
        );
        let mut fields = Vec::new();
        if let Some(group) = group_field {
            fields.push(FieldInfo::new(
                child_desc.field_type(group)?,
                child_desc.field_name(group)?.map(str::to_string),
            ));
        }
        fields.push(FieldInfo::new(DataType::Int32, Some(agg_name)));

        Ok(Self {
            child: Box::new(child),
            agg_field,
            group_field,
            op,
            desc: Arc::new(TupleDesc::from_fields(fields)),
            results: Vec::new(),
            position: 0,
            is_open: false,
        })
    }

    pub fn op(&self) -> AggregateOp {
        self.op
    }

    fn compute(&mut self) -> Result<Vec<Tuple>> {
        let mut order: Vec<Option<Value>> = Vec::new();
        let mut groups: HashMap<Option<Value>, AggregateState> = HashMap::new();

        while let Some(tuple) = self.child.next()? {
            let key = match self.group_field {
                Some(index) => Some(tuple.value(index)?.clone()),
                None => None,
            };
            let value = tuple.value(self.agg_field)?;

            if !groups.contains_key(&key) {
                order.push(key.clone());
            }
            groups.entry(key).or_default().update(value);
        }

        let mut results = Vec::with_capacity(order.len());
        for key in order {
            let Some(state) = groups.get(&key) else {
                continue;
            };
            let aggregate = Value::Int32(state.finish(self.op));
            let values = match key {
                Some(group) => vec![group, aggregate],
                None => vec![aggregate],
            };
            results.push(Tuple::from_values(self.desc.clone(), values)?);
        }
        Ok(results)
    }
}

impl OpIterator for Aggregate {
    fn open(&mut self) -> Result<()> {
        self.child.open()?;
        self.results = self.compute()?;
        self.position = 0;
        self.is_open = true;
        Ok(())
    }

    fn has_next(&mut self) -> Result<bool> {
        Ok(self.is_open && self.position < self.results.len())
    }

    fn next(&mut self) -> Result<Option<Tuple>> {
        if !self.has_next()? {
            return Ok(None);
        }
        let tuple = self.results[self.position].clone();
        self.position += 1;
        Ok(Some(tuple))
    }

    fn rewind(&mut self) -> Result<()> {
        self.position = 0;
        Ok(())
    }

    fn close(&mut self) {
        self.child.close();
        self.results.clear();
        self.is_open = false;
    }

    fn tuple_desc(&self) -> &Arc<TupleDesc> {
        &self.desc
    }
}
