//! Manages the buffer pool, the bounded cache every page read and write
//! goes through.

use crate::catalog::Catalog;
use crate::errors::StorageError;
use crate::heap_page::HeapPage;
use crate::lock_manager::{LockManager, LockMode};
use crate::transaction::TransactionId;
use crate::tuple::Tuple;
use crate::PageId;
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::thread;

/// A cached page. Transaction isolation comes from the page lock held via
/// the lock manager; the `RwLock` only guards the in-memory representation.
pub type Frame = Arc<RwLock<HeapPage>>;

#[derive(Default)]
struct PoolState {
    frames: Vec<Option<Frame>>,
    cached: HashMap<PageId, usize>,
    idle: HashSet<usize>,
    last_used: HashMap<PageId, u64>,
    tick: u64,
}

impl PoolState {
    fn discard(&mut self, pid: PageId) {
        if let Some(idx) = self.cached.remove(&pid) {
            self.frames[idx] = None;
            self.idle.insert(idx);
        }
        self.last_used.remove(&pid);
    }
}

/// A bounded page cache with LRU eviction that never evicts a dirty page
/// (NO-STEAL), fronted by two-phase page locking.
pub struct BufferPool {
    catalog: Arc<Catalog>,
    lock_manager: LockManager,
    state: Mutex<PoolState>,
    capacity: usize,
}

impl BufferPool {
    /// A pool caching up to `capacity` pages.
    pub fn new(capacity: usize, catalog: Arc<Catalog>) -> BufferPool {
        let mut frames = Vec::with_capacity(capacity);
        let mut idle = HashSet::new();
        for i in 0..capacity {
            frames.push(None);
            idle.insert(i);
        }
        BufferPool {
            catalog,
            lock_manager: LockManager::new(),
            state: Mutex::new(PoolState {
                frames,
                cached: HashMap::new(),
                idle,
                last_used: HashMap::new(),
                tick: 0,
            }),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Fetches a page under the given lock mode, blocking (by spinning on
    /// the lock manager) until the lock is granted or the transaction is
    /// chosen as a deadlock victim.
    pub fn get_page(
        &self,
        tid: TransactionId,
        pid: PageId,
        mode: LockMode,
    ) -> Result<Frame, StorageError> {
        loop {
            if self.lock_manager.acquire(tid, pid, mode)? {
                break;
            }
            thread::yield_now();
        }

        let mut state = self.state.lock();
        state.tick += 1;
        let tick = state.tick;
        state.last_used.insert(pid, tick);

        if let Some(&idx) = state.cached.get(&pid) {
            let frame = state.frames[idx].as_ref().ok_or_else(|| {
                StorageError::Invariant(format!("cached page {pid:?} maps to an empty slot"))
            })?;
            return Ok(Arc::clone(frame));
        }

        if state.idle.is_empty() {
            self.evict(&mut state)?;
        }
        let idx = state
            .idle
            .iter()
            .next()
            .copied()
            .ok_or_else(|| StorageError::Invariant("no idle slot after eviction".to_string()))?;
        state.idle.remove(&idx);

        let page = match self
            .catalog
            .db_file(pid.table_id)
            .and_then(|file| file.read_page(pid))
        {
            Ok(page) => page,
            Err(err) => {
                state.idle.insert(idx);
                state.last_used.remove(&pid);
                return Err(err);
            }
        };
        let frame: Frame = Arc::new(RwLock::new(page));
        state.frames[idx] = Some(Arc::clone(&frame));
        state.cached.insert(pid, idx);
        Ok(frame)
    }

    /// Drops the least recently used clean page. Only legal when no slot
    /// is idle.
    fn evict(&self, state: &mut PoolState) -> Result<(), StorageError> {
        if !state.idle.is_empty() {
            return Err(StorageError::Invariant(
                "evict called while idle slots remain".to_string(),
            ));
        }
        let mut victim: Option<(PageId, u64)> = None;
        for (&pid, &idx) in &state.cached {
            let Some(frame) = &state.frames[idx] else {
                continue;
            };
            if frame.read().dirtied_by().is_some() {
                continue;
            }
            let used = state.last_used.get(&pid).copied().unwrap_or(0);
            if victim.map_or(true, |(_, best)| used < best) {
                victim = Some((pid, used));
            }
        }
        let Some((pid, _)) = victim else {
            crate::strata_debug_log!("[BufferPool::evict] pool full: every cached page is dirty");
            return Err(StorageError::TransactionAborted);
        };

        // A no-op for a clean victim; flush_entry checks the dirty flag.
        self.flush_entry(state, pid)?;
        let Some(idx) = state.cached.remove(&pid) else {
            return Err(StorageError::Invariant(
                "eviction victim vanished from the cache".to_string(),
            ));
        };
        crate::strata_debug_log!("[BufferPool::evict] evicting page {pid:?}");
        state.frames[idx] = None;
        state.idle.insert(idx);
        state.last_used.remove(&pid);
        Ok(())
    }

    fn flush_entry(&self, state: &PoolState, pid: PageId) -> Result<(), StorageError> {
        let Some(&idx) = state.cached.get(&pid) else {
            return Ok(());
        };
        let Some(frame) = &state.frames[idx] else {
            return Ok(());
        };
        let mut page = frame.write();
        if page.dirtied_by().is_some() {
            let file = self.catalog.db_file(pid.table_id)?;
            file.write_page(&page)?;
            page.mark_dirty(None);
        }
        Ok(())
    }

    /// Writes the page back iff it is dirty, then clears the dirty flag.
    pub fn flush_page(&self, pid: PageId) -> Result<(), StorageError> {
        let state = self.state.lock();
        self.flush_entry(&state, pid)
    }

    /// Flushes every cached page.
    pub fn flush_all_pages(&self) -> Result<(), StorageError> {
        let state = self.state.lock();
        let pids: Vec<PageId> = state.cached.keys().copied().collect();
        for pid in pids {
            self.flush_entry(&state, pid)?;
        }
        Ok(())
    }

    /// Inserts through the table's heap file, then marks the dirtied pages.
    pub fn insert_tuple(
        &self,
        tid: TransactionId,
        table_id: u32,
        tuple: Tuple,
    ) -> Result<(), StorageError> {
        let file = self.catalog.db_file(table_id)?;
        let dirtied = file.insert_tuple(self, tid, tuple)?;
        self.mark_dirty(&dirtied, tid);
        Ok(())
    }

    /// Deletes through the owning table's heap file, then marks the
    /// dirtied pages.
    pub fn delete_tuple(&self, tid: TransactionId, tuple: &Tuple) -> Result<(), StorageError> {
        let rid = tuple.record_id().ok_or_else(|| {
            StorageError::Invariant("delete of a tuple with no record id".to_string())
        })?;
        let file = self.catalog.db_file(rid.page_id.table_id)?;
        let dirtied = file.delete_tuple(self, tid, tuple)?;
        self.mark_dirty(&dirtied, tid);
        Ok(())
    }

    fn mark_dirty(&self, pids: &[PageId], tid: TransactionId) {
        let state = self.state.lock();
        for pid in pids {
            if let Some(&idx) = state.cached.get(pid) {
                if let Some(frame) = &state.frames[idx] {
                    frame.write().mark_dirty(Some(tid));
                }
            }
        }
    }

    /// Commits or aborts. Pages the transaction locked are flushed on
    /// commit, or dropped from the pool on abort so the next read reloads
    /// the on-disk pre-image. Every lock the transaction holds is then
    /// released.
    pub fn transaction_complete(
        &self,
        tid: TransactionId,
        commit: bool,
    ) -> Result<(), StorageError> {
        crate::strata_debug_log!(
            "[BufferPool::transaction_complete] {tid:?} commit={commit}"
        );
        let pids = self.lock_manager.pages_for(tid);
        {
            let mut state = self.state.lock();
            for pid in pids {
                if commit {
                    self.flush_entry(&state, pid)?;
                } else {
                    state.discard(pid);
                }
            }
        }
        self.lock_manager.release_transaction(tid);
        Ok(())
    }

    /// The unary commit form of [`BufferPool::transaction_complete`].
    pub fn transaction_complete_commit(&self, tid: TransactionId) -> Result<(), StorageError> {
        self.transaction_complete(tid, true)
    }

    /// Releases one page lock before transaction end.
    ///
    /// This breaks strict two-phase locking and can expose intermediate
    /// state; it exists for the heap file's insert capacity scan, which
    /// drops its probe lock on pages that turn out to be full.
    pub fn release_page(&self, tid: TransactionId, pid: PageId) {
        self.lock_manager.release(tid, pid);
    }

    pub fn holds_lock(&self, tid: TransactionId, pid: PageId) -> bool {
        self.lock_manager.holds_lock(tid, pid)
    }
}
