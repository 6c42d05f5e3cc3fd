//! The delete operator.

use crate::database::Database;
use crate::errors::ExecutionError;
use crate::executor::Executor;
use std::sync::Arc;
use strata::{Field, FieldType, TransactionId, Tuple, TupleDesc};

/// Reads tuples from its child and removes them from the table they belong
/// to. The first pull drains the child and yields a single one-column
/// tuple holding the delete count; later pulls yield nothing.
///
/// Child tuples must carry record ids, so the child is typically a scan of
/// the target table (possibly filtered).
pub struct Delete {
    db: Arc<Database>,
    tid: TransactionId,
    child: Box<dyn Executor>,
    done: bool,
}

impl Delete {
    pub fn new(db: Arc<Database>, tid: TransactionId, child: Box<dyn Executor>) -> Delete {
        Delete {
            db,
            tid,
            child,
            done: false,
        }
    }

    fn count_desc() -> TupleDesc {
        TupleDesc::unnamed(vec![FieldType::Int])
    }
}

impl Executor for Delete {
    fn open(&mut self) -> Result<(), ExecutionError> {
        self.child.open()?;
        self.done = false;
        Ok(())
    }

    fn close(&mut self) {
        self.child.close();
    }

    fn rewind(&mut self) -> Result<(), ExecutionError> {
        self.child.rewind()?;
        self.done = false;
        Ok(())
    }

    fn tuple_desc(&self) -> TupleDesc {
        Self::count_desc()
    }

    fn fetch_next(&mut self) -> Result<Option<Tuple>, ExecutionError> {
        if self.done {
            return Ok(None);
        }
        self.done = true;
        let mut count = 0;
        while let Some(tuple) = self.child.fetch_next()? {
            self.db.buffer_pool().delete_tuple(self.tid, &tuple)?;
            count += 1;
        }
        crate::basalt_debug_log!("[Delete::fetch_next] deleted {count} tuples");
        let result = Tuple::new(Self::count_desc(), vec![Field::Int(count)])?;
        Ok(Some(result))
    }
}
