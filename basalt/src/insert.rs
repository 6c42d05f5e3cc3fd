//! The insert operator.

use crate::database::Database;
use crate::errors::ExecutionError;
use crate::executor::Executor;
use std::sync::Arc;
use strata::{Field, FieldType, TransactionId, Tuple, TupleDesc};

/// Drains its child into the target table on the first pull and yields a
/// single one-column tuple holding the insert count. Later pulls yield
/// nothing: the operator is one-shot per transaction.
pub struct Insert {
    db: Arc<Database>,
    tid: TransactionId,
    table_id: u32,
    child: Box<dyn Executor>,
    done: bool,
}

impl Insert {
    /// Fails when the child's schema differs from the target table's.
    pub fn new(
        db: Arc<Database>,
        tid: TransactionId,
        child: Box<dyn Executor>,
        table_id: u32,
    ) -> Result<Insert, ExecutionError> {
        let table_desc = db.catalog().tuple_desc(table_id)?;
        if child.tuple_desc() != table_desc {
            return Err(ExecutionError::SchemaMismatch(
                "insert child schema does not match the target table".to_string(),
            ));
        }
        Ok(Insert {
            db,
            tid,
            table_id,
            child,
            done: false,
        })
    }

    fn count_desc() -> TupleDesc {
        TupleDesc::unnamed(vec![FieldType::Int])
    }
}

impl Executor for Insert {
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
            self.db
                .buffer_pool()
                .insert_tuple(self.tid, self.table_id, tuple)?;
            count += 1;
        }
        crate::basalt_debug_log!(
            "[Insert::fetch_next] inserted {count} tuples into table {}",
            self.table_id
        );
        let result = Tuple::new(Self::count_desc(), vec![Field::Int(count)])?;
        Ok(Some(result))
    }
}
