//! The engine context: one catalog plus one buffer pool, passed explicitly.

use crate::errors::ExecutionError;
use std::sync::Arc;
use strata::{BufferPool, Catalog, TransactionId, DEFAULT_POOL_PAGES};

/// Process-scoped engine state. Constructed once at startup and handed to
/// operators at construction time; there is deliberately no ambient
/// singleton.
pub struct Database {
    catalog: Arc<Catalog>,
    buffer_pool: Arc<BufferPool>,
}

impl Database {
    pub fn new(pool_pages: usize) -> Database {
        let catalog = Arc::new(Catalog::new());
        let buffer_pool = Arc::new(BufferPool::new(pool_pages, Arc::clone(&catalog)));
        Database {
            catalog,
            buffer_pool,
        }
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn buffer_pool(&self) -> &Arc<BufferPool> {
        &self.buffer_pool
    }

    /// Starts a new transaction.
    pub fn begin(&self) -> TransactionId {
        TransactionId::new()
    }

    /// Commits: flushes the transaction's pages and releases its locks.
    pub fn commit(&self, tid: TransactionId) -> Result<(), ExecutionError> {
        crate::basalt_debug_log!("[Database::commit] committing {tid:?}");
        self.buffer_pool.transaction_complete(tid, true)?;
        Ok(())
    }

    /// Aborts: drops the transaction's pages from the pool and releases its
    /// locks, so the on-disk pre-images become visible again.
    pub fn abort(&self, tid: TransactionId) -> Result<(), ExecutionError> {
        crate::basalt_debug_log!("[Database::abort] aborting {tid:?}");
        self.buffer_pool.transaction_complete(tid, false)?;
        Ok(())
    }

    /// Flushes every cached page. Call before process teardown.
    pub fn shutdown(&self) -> Result<(), ExecutionError> {
        self.buffer_pool.flush_all_pages()?;
        Ok(())
    }
}

impl Default for Database {
    fn default() -> Self {
        Self::new(DEFAULT_POOL_PAGES)
    }
}
