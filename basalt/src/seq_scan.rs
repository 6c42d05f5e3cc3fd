//! Sequential table scans.

use crate::database::Database;
use crate::errors::ExecutionError;
use crate::executor::Executor;
use std::sync::Arc;
use strata::heap_file::HeapFileIterator;
use strata::{TransactionId, Tuple, TupleDesc};

/// Scans every tuple of one table in page order through the buffer pool.
pub struct SeqScan {
    db: Arc<Database>,
    tid: TransactionId,
    table_id: u32,
    desc: TupleDesc,
    iter: Option<HeapFileIterator>,
}

impl SeqScan {
    /// Fails when the table is not registered in the catalog.
    pub fn new(
        db: Arc<Database>,
        tid: TransactionId,
        table_id: u32,
    ) -> Result<SeqScan, ExecutionError> {
        let desc = db.catalog().tuple_desc(table_id)?;
        Ok(SeqScan {
            db,
            tid,
            table_id,
            desc,
            iter: None,
        })
    }
}

impl Executor for SeqScan {
    fn open(&mut self) -> Result<(), ExecutionError> {
        let file = self.db.catalog().db_file(self.table_id)?;
        let mut iter = file.iter(Arc::clone(self.db.buffer_pool()), self.tid);
        iter.open();
        self.iter = Some(iter);
        Ok(())
    }

    fn close(&mut self) {
        if let Some(iter) = &mut self.iter {
            iter.close();
        }
        self.iter = None;
    }

    fn rewind(&mut self) -> Result<(), ExecutionError> {
        match &mut self.iter {
            Some(iter) => {
                iter.rewind();
                Ok(())
            }
            None => Err(ExecutionError::NotOpen),
        }
    }

    fn tuple_desc(&self) -> TupleDesc {
        self.desc.clone()
    }

    fn fetch_next(&mut self) -> Result<Option<Tuple>, ExecutionError> {
        match &mut self.iter {
            Some(iter) => Ok(iter.next_tuple()?),
            None => Ok(None),
        }
    }
}
