//! Transaction bookkeeping consumed by the lock manager.
//!
//! A transaction is otherwise opaque to this crate: no commit log, no undo
//! buffer, no recovery hooks. It exists so `lock_manager` has a real
//! collaborator carrying an id, a two-phase-locking state, and the two lock
//! sets the specification's wait-die protocol reads and mutates.

use crate::rid::Rid;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// The mode a lock request is held or requested in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Shared,
    Exclusive,
}

/// Two-phase locking state. Lower ids are older transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Growing,
    Shrinking,
    Committed,
    Aborted,
}

/// A single transaction's id, 2PL state, and owned lock sets.
///
/// `state` is mutated only by the lock manager (on wait-die loss, driving it
/// to `Aborted`) or by `TransactionManager::commit`/`abort`. The lock sets are
/// mutated only by the lock manager under its own internal mutex, but are
/// exposed behind their own `Mutex` here since transactions are shared
/// (`Arc<Transaction>`) across the thread that owns them and the lock
/// manager's internal bookkeeping.
#[derive(Debug)]
pub struct Transaction {
    id: u64,
    state: Mutex<TransactionState>,
    shared_lock_set: Mutex<HashSet<Rid>>,
    exclusive_lock_set: Mutex<HashSet<Rid>>,
}

impl Transaction {
    fn new(id: u64) -> Self {
        Self {
            id,
            state: Mutex::new(TransactionState::Growing),
            shared_lock_set: Mutex::new(HashSet::new()),
            exclusive_lock_set: Mutex::new(HashSet::new()),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> TransactionState {
        *self.state.lock().unwrap()
    }

    pub fn set_state(&self, state: TransactionState) {
        *self.state.lock().unwrap() = state;
    }

    pub fn shared_lock_set(&self) -> std::sync::MutexGuard<'_, HashSet<Rid>> {
        self.shared_lock_set.lock().unwrap()
    }

    pub fn exclusive_lock_set(&self) -> std::sync::MutexGuard<'_, HashSet<Rid>> {
        self.exclusive_lock_set.lock().unwrap()
    }
}

/// Issues monotonically increasing transaction ids and drives the
/// begin/commit/abort lifecycle. Lower ids are older, per the wait-die
/// ordering the lock manager relies on.
#[derive(Debug, Default)]
pub struct TransactionManager {
    next_txn_id: AtomicU64,
}

impl TransactionManager {
    pub fn new() -> Self {
        Self {
            next_txn_id: AtomicU64::new(0),
        }
    }

    /// Starts a new transaction in the `Growing` phase.
    pub fn begin(&self) -> std::sync::Arc<Transaction> {
        let id = self.next_txn_id.fetch_add(1, Ordering::SeqCst);
        std::sync::Arc::new(Transaction::new(id))
    }

    /// Commits a transaction. Does not release locks itself; callers are
    /// expected to have already unlocked every held `Rid` via the lock
    /// manager (strict two-phase locking releases at commit time).
    pub fn commit(&self, txn: &Transaction) {
        txn.set_state(TransactionState::Committed);
    }

    /// Aborts a transaction. Idempotent: aborting an already-aborted
    /// transaction (e.g. one the lock manager already killed via wait-die)
    /// is a no-op.
    pub fn abort(&self, txn: &Transaction) {
        txn.set_state(TransactionState::Aborted);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_monotonic_and_start_at_zero() {
        let mgr = TransactionManager::new();
        let t0 = mgr.begin();
        let t1 = mgr.begin();
        assert_eq!(t0.id(), 0);
        assert_eq!(t1.id(), 1);
        assert!(t0.id() < t1.id());
    }

    #[test]
    fn fresh_transaction_is_growing() {
        let mgr = TransactionManager::new();
        let txn = mgr.begin();
        assert_eq!(txn.state(), TransactionState::Growing);
    }

    #[test]
    fn abort_is_idempotent() {
        let mgr = TransactionManager::new();
        let txn = mgr.begin();
        mgr.abort(&txn);
        mgr.abort(&txn);
        assert_eq!(txn.state(), TransactionState::Aborted);
    }
}
