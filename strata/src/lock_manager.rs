//! Page-level two-phase locking with wait-for-graph deadlock detection.

use crate::transaction::TransactionId;
use crate::PageId;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};

/// The two modes a page lock supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockMode {
    Shared,
    Exclusive,
}

#[derive(Debug)]
pub enum LockError {
    Deadlock,
}

#[derive(Debug, Default)]
struct LockState {
    tid_to_pages: HashMap<TransactionId, HashSet<PageId>>,
    /// The strongest mode currently granted on each locked page.
    page_mode: HashMap<PageId, LockMode>,
    page_to_tids: HashMap<PageId, HashSet<TransactionId>>,
    /// The single page each blocked transaction is waiting to lock.
    waiting_on: HashMap<TransactionId, PageId>,
}

/// Grants and releases page locks, and aborts any transaction whose wait
/// would close a cycle in the wait-for graph.
#[derive(Debug, Default)]
pub struct LockManager {
    state: Mutex<LockState>,
}

impl LockManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// One non-blocking acquisition attempt.
    ///
    /// Returns `Ok(true)` when the lock is now held, `Ok(false)` when the
    /// caller must retry, and `Err(Deadlock)` when waiting would close a
    /// cycle in the wait-for graph, in which case the caller must abort
    /// `tid`.
    pub fn acquire(
        &self,
        tid: TransactionId,
        pid: PageId,
        mode: LockMode,
    ) -> Result<bool, LockError> {
        let mut state = self.state.lock();

        if !state.waiting_on.contains_key(&tid) {
            state.waiting_on.insert(tid, pid);
            if state.closes_cycle(tid) {
                // The requester is obliged to abort, so its edge goes away now.
                state.waiting_on.remove(&tid);
                crate::strata_debug_log!(
                    "[LockManager::acquire] deadlock on {pid:?}, aborting {tid:?}"
                );
                return Err(LockError::Deadlock);
            }
        }

        let grantable = match state.page_mode.get(&pid) {
            None => true,
            Some(LockMode::Shared) => match mode {
                LockMode::Shared => true,
                // Upgrade is legal only for the sole holder.
                LockMode::Exclusive => state
                    .page_to_tids
                    .get(&pid)
                    .is_some_and(|holders| holders.len() == 1 && holders.contains(&tid)),
            },
            Some(LockMode::Exclusive) => state
                .page_to_tids
                .get(&pid)
                .is_some_and(|holders| holders.contains(&tid)),
        };
        if !grantable {
            return Ok(false);
        }

        state.tid_to_pages.entry(tid).or_default().insert(pid);
        state.page_to_tids.entry(pid).or_default().insert(tid);
        let held = state.page_mode.entry(pid).or_insert(mode);
        if mode == LockMode::Exclusive {
            *held = LockMode::Exclusive;
        }
        state.waiting_on.remove(&tid);
        Ok(true)
    }

    /// Releases a single page lock.
    pub fn release(&self, tid: TransactionId, pid: PageId) {
        let mut state = self.state.lock();
        state.release_one(tid, pid);
    }

    /// Releases every lock held by the transaction and forgets its wait.
    pub fn release_transaction(&self, tid: TransactionId) {
        let mut state = self.state.lock();
        let pids: Vec<PageId> = state
            .tid_to_pages
            .get(&tid)
            .map(|pages| pages.iter().copied().collect())
            .unwrap_or_default();
        for pid in pids {
            state.release_one(tid, pid);
        }
        state.waiting_on.remove(&tid);
    }

    pub fn holds_lock(&self, tid: TransactionId, pid: PageId) -> bool {
        let state = self.state.lock();
        let forward = state
            .tid_to_pages
            .get(&tid)
            .is_some_and(|pages| pages.contains(&pid));
        let backward = state
            .page_to_tids
            .get(&pid)
            .is_some_and(|tids| tids.contains(&tid));
        forward && backward
    }

    /// Every page on which the transaction currently holds a lock.
    pub fn pages_for(&self, tid: TransactionId) -> Vec<PageId> {
        self.state
            .lock()
            .tid_to_pages
            .get(&tid)
            .map(|pages| pages.iter().copied().collect())
            .unwrap_or_default()
    }
}

impl LockState {
    fn release_one(&mut self, tid: TransactionId, pid: PageId) {
        if let Some(pages) = self.tid_to_pages.get_mut(&tid) {
            pages.remove(&pid);
            if pages.is_empty() {
                self.tid_to_pages.remove(&tid);
            }
        }
        if let Some(tids) = self.page_to_tids.get_mut(&pid) {
            tids.remove(&tid);
            if tids.is_empty() {
                self.page_to_tids.remove(&pid);
                self.page_mode.remove(&pid);
            }
        }
    }

    /// True when some wait-for path out of `start` leads back to `start`.
    /// An edge `a -> b` exists iff `a` waits on a page `b` holds.
    fn closes_cycle(&self, start: TransactionId) -> bool {
        let mut visited = HashSet::new();
        self.reaches(start, start, &mut visited)
    }

    fn reaches(
        &self,
        current: TransactionId,
        target: TransactionId,
        visited: &mut HashSet<TransactionId>,
    ) -> bool {
        let Some(pid) = self.waiting_on.get(&current) else {
            return false;
        };
        let Some(holders) = self.page_to_tids.get(pid) else {
            return false;
        };
        for &holder in holders {
            if holder == current {
                continue;
            }
            if holder == target {
                return true;
            }
            if visited.insert(holder) && self.reaches(holder, target, visited) {
                return true;
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pid(page_no: usize) -> PageId {
        PageId {
            table_id: 1,
            page_no,
        }
    }

    #[test]
    fn shared_locks_are_compatible() {
        let lm = LockManager::new();
        let (a, b) = (TransactionId::new(), TransactionId::new());

        assert!(lm.acquire(a, pid(0), LockMode::Shared).unwrap());
        assert!(lm.acquire(b, pid(0), LockMode::Shared).unwrap());
        assert!(lm.holds_lock(a, pid(0)));
        assert!(lm.holds_lock(b, pid(0)));
    }

    #[test]
    fn exclusive_excludes_everyone_else() {
        let lm = LockManager::new();
        let (a, b) = (TransactionId::new(), TransactionId::new());

        assert!(lm.acquire(a, pid(0), LockMode::Exclusive).unwrap());
        assert!(!lm.acquire(b, pid(0), LockMode::Shared).unwrap());
        assert!(!lm.acquire(b, pid(0), LockMode::Exclusive).unwrap());
        // The holder itself may re-enter in either mode.
        assert!(lm.acquire(a, pid(0), LockMode::Shared).unwrap());
        assert!(lm.acquire(a, pid(0), LockMode::Exclusive).unwrap());
    }

    #[test]
    fn sole_shared_holder_may_upgrade() {
        let lm = LockManager::new();
        let a = TransactionId::new();

        assert!(lm.acquire(a, pid(0), LockMode::Shared).unwrap());
        assert!(lm.acquire(a, pid(0), LockMode::Exclusive).unwrap());

        let b = TransactionId::new();
        assert!(!lm.acquire(b, pid(0), LockMode::Shared).unwrap());
    }

    #[test]
    fn upgrade_is_denied_while_others_share() {
        let lm = LockManager::new();
        let (a, b) = (TransactionId::new(), TransactionId::new());

        assert!(lm.acquire(a, pid(0), LockMode::Shared).unwrap());
        assert!(lm.acquire(b, pid(0), LockMode::Shared).unwrap());
        assert!(!lm.acquire(a, pid(0), LockMode::Exclusive).unwrap());
    }

    #[test]
    fn release_keeps_both_maps_in_agreement() {
        let lm = LockManager::new();
        let a = TransactionId::new();

        assert!(lm.acquire(a, pid(0), LockMode::Shared).unwrap());
        assert!(lm.acquire(a, pid(1), LockMode::Exclusive).unwrap());
        assert_eq!(lm.pages_for(a).len(), 2);

        lm.release(a, pid(0));
        assert!(!lm.holds_lock(a, pid(0)));
        assert!(lm.holds_lock(a, pid(1)));

        lm.release_transaction(a);
        assert!(!lm.holds_lock(a, pid(1)));
        assert!(lm.pages_for(a).is_empty());

        // Freed pages are grantable again.
        let b = TransactionId::new();
        assert!(lm.acquire(b, pid(1), LockMode::Exclusive).unwrap());
    }

    #[test]
    fn crossed_waits_are_reported_as_deadlock() {
        let lm = LockManager::new();
        let (a, b) = (TransactionId::new(), TransactionId::new());

        assert!(lm.acquire(a, pid(0), LockMode::Exclusive).unwrap());
        assert!(lm.acquire(b, pid(1), LockMode::Exclusive).unwrap());

        // b blocks on a's page; a then blocking on b's page closes the cycle.
        assert!(!lm.acquire(b, pid(0), LockMode::Shared).unwrap());
        assert!(matches!(
            lm.acquire(a, pid(1), LockMode::Shared),
            Err(LockError::Deadlock)
        ));
    }

    #[test]
    fn upgrade_race_is_a_deadlock() {
        let lm = LockManager::new();
        let (a, b) = (TransactionId::new(), TransactionId::new());

        assert!(lm.acquire(a, pid(0), LockMode::Shared).unwrap());
        assert!(lm.acquire(b, pid(0), LockMode::Shared).unwrap());

        assert!(!lm.acquire(b, pid(0), LockMode::Exclusive).unwrap());
        assert!(matches!(
            lm.acquire(a, pid(0), LockMode::Exclusive),
            Err(LockError::Deadlock)
        ));

        // Once the victim releases, the survivor's upgrade goes through.
        lm.release_transaction(a);
        assert!(lm.acquire(b, pid(0), LockMode::Exclusive).unwrap());
    }
}
