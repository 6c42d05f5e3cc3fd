//! Relational selection.

use crate::errors::ExecutionError;
use crate::executor::Executor;
use strata::{Field, Tuple, TupleDesc};

/// Comparison operators a predicate can apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Equals,
    NotEquals,
    GreaterThan,
    GreaterThanOrEq,
    LessThan,
    LessThanOrEq,
}

/// Compares one field of a tuple against a constant operand.
/// A comparison across field types is false.
#[derive(Debug, Clone)]
pub struct Predicate {
    field: usize,
    op: CmpOp,
    operand: Field,
}

impl Predicate {
    pub fn new(field: usize, op: CmpOp, operand: Field) -> Predicate {
        Predicate { field, op, operand }
    }

    pub fn eval(&self, tuple: &Tuple) -> bool {
        let Some(value) = tuple.field(self.field) else {
            return false;
        };
        let Some(ordering) = value.partial_cmp(&self.operand) else {
            return false;
        };
        match self.op {
            CmpOp::Equals => ordering.is_eq(),
            CmpOp::NotEquals => ordering.is_ne(),
            CmpOp::GreaterThan => ordering.is_gt(),
            CmpOp::GreaterThanOrEq => ordering.is_ge(),
            CmpOp::LessThan => ordering.is_lt(),
            CmpOp::LessThanOrEq => ordering.is_le(),
        }
    }
}

/// Passes through the child tuples that satisfy the predicate.
pub struct Filter {
    predicate: Predicate,
    child: Box<dyn Executor>,
}

impl Filter {
    pub fn new(predicate: Predicate, child: Box<dyn Executor>) -> Filter {
        Filter { predicate, child }
    }

    pub fn predicate(&self) -> &Predicate {
        &self.predicate
    }
}

impl Executor for Filter {
    fn open(&mut self) -> Result<(), ExecutionError> {
        self.child.open()
    }

    fn close(&mut self) {
        self.child.close();
    }

    fn rewind(&mut self) -> Result<(), ExecutionError> {
        self.child.rewind()
    }

    fn tuple_desc(&self) -> TupleDesc {
        self.child.tuple_desc()
    }

    fn fetch_next(&mut self) -> Result<Option<Tuple>, ExecutionError> {
        while let Some(tuple) = self.child.fetch_next()? {
            if self.predicate.eval(&tuple) {
                return Ok(Some(tuple));
            }
        }
        Ok(None)
    }
}
