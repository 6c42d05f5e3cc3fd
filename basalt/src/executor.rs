//! The pull-based executor protocol.

use crate::errors::ExecutionError;
use strata::{Tuple, TupleDesc};

/// One operator in a query tree.
///
/// Operators own their children and expose a single pull hook,
/// [`Executor::fetch_next`]; end of stream is `Ok(None)`, never an error.
pub trait Executor {
    fn open(&mut self) -> Result<(), ExecutionError>;
    fn close(&mut self);
    /// Resets the stream to the beginning. Driven downward from the root.
    fn rewind(&mut self) -> Result<(), ExecutionError>;
    fn tuple_desc(&self) -> TupleDesc;
    /// The next tuple, or `None` at end of stream.
    fn fetch_next(&mut self) -> Result<Option<Tuple>, ExecutionError>;
}

/// Drives an executor tree from the root, layering the buffered
/// `has_next` / `next` protocol over [`Executor::fetch_next`].
///
/// `has_next` and `next` before `open` or after `close` are
/// [`ExecutionError::NotOpen`]; `next` past end of stream is
/// [`ExecutionError::Exhausted`].
pub struct Cursor {
    root: Box<dyn Executor>,
    opened: bool,
    lookahead: Option<Tuple>,
}

impl Cursor {
    pub fn new(root: Box<dyn Executor>) -> Cursor {
        Cursor {
            root,
            opened: false,
            lookahead: None,
        }
    }

    pub fn open(&mut self) -> Result<(), ExecutionError> {
        self.root.open()?;
        self.opened = true;
        self.lookahead = None;
        Ok(())
    }

    pub fn close(&mut self) {
        self.root.close();
        self.opened = false;
        self.lookahead = None;
    }

    pub fn rewind(&mut self) -> Result<(), ExecutionError> {
        if !self.opened {
            return Err(ExecutionError::NotOpen);
        }
        self.root.rewind()?;
        self.lookahead = None;
        Ok(())
    }

    pub fn tuple_desc(&self) -> TupleDesc {
        self.root.tuple_desc()
    }

    pub fn has_next(&mut self) -> Result<bool, ExecutionError> {
        if !self.opened {
            return Err(ExecutionError::NotOpen);
        }
        if self.lookahead.is_none() {
            self.lookahead = self.root.fetch_next()?;
        }
        Ok(self.lookahead.is_some())
    }

    pub fn next(&mut self) -> Result<Tuple, ExecutionError> {
        if !self.has_next()? {
            return Err(ExecutionError::Exhausted);
        }
        self.lookahead.take().ok_or(ExecutionError::Exhausted)
    }
}

/// An executor over an already materialized tuple vector.
pub struct TupleIterator {
    desc: TupleDesc,
    tuples: Vec<Tuple>,
    cursor: usize,
    opened: bool,
}

impl TupleIterator {
    pub fn new(desc: TupleDesc, tuples: Vec<Tuple>) -> TupleIterator {
        TupleIterator {
            desc,
            tuples,
            cursor: 0,
            opened: false,
        }
    }
}

impl Executor for TupleIterator {
    fn open(&mut self) -> Result<(), ExecutionError> {
        self.opened = true;
        self.cursor = 0;
        Ok(())
    }

    fn close(&mut self) {
        self.opened = false;
    }

    fn rewind(&mut self) -> Result<(), ExecutionError> {
        self.cursor = 0;
        Ok(())
    }

    fn tuple_desc(&self) -> TupleDesc {
        self.desc.clone()
    }

    fn fetch_next(&mut self) -> Result<Option<Tuple>, ExecutionError> {
        if !self.opened || self.cursor >= self.tuples.len() {
            return Ok(None);
        }
        let tuple = self.tuples[self.cursor].clone();
        self.cursor += 1;
        Ok(Some(tuple))
    }
}
