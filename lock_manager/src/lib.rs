//! Row-level two-phase locking with wait-die deadlock prevention.
//!
//! One mutex and one condition variable guard the entire lock table. A
//! transaction blocks by waiting on the condition variable (which releases
//! the mutex while parked) until its request reaches the front of its
//! queue's compatibility window; every granting or releasing operation
//! broadcasts so parked waiters re-check their condition.
//!
//! Wait-die: an older transaction (lower id) waits for a younger one to
//! release; a younger transaction requesting against an older one aborts
//! immediately rather than risk a cycle.

use common::{Rid, Transaction, TransactionState};
pub use common::LockMode;
use log::{debug, warn};
use std::collections::{HashMap, VecDeque};
use std::sync::{Condvar, Mutex, MutexGuard};

#[derive(Debug, Clone, Copy)]
struct Request {
    txn_id: u64,
    mode: LockMode,
    granted: bool,
}

#[derive(Debug, Default)]
struct LockRequestQueue {
    requests: VecDeque<Request>,
    exclusive_count: usize,
}

impl LockRequestQueue {
    /// The id of the oldest transaction with a request currently in this
    /// queue, or `None` if the queue is empty. Derived rather than tracked
    /// incrementally, so it can never drift from the request list.
    fn oldest(&self) -> Option<u64> {
        self.requests.iter().map(|r| r.txn_id).min()
    }
}

/// The row-level lock table.
pub struct LockManager {
    table: Mutex<HashMap<Rid, LockRequestQueue>>,
    cond: Condvar,
}

impl Default for LockManager {
    fn default() -> Self {
        Self::new()
    }
}

impl LockManager {
    pub fn new() -> Self {
        Self {
            table: Mutex::new(HashMap::new()),
            cond: Condvar::new(),
        }
    }

    /// Acquires a shared lock on `rid` for `txn`, blocking until granted.
    ///
    /// Returns `false` without blocking if `txn` is already aborted, or if
    /// wait-die decides `txn` must die (it is younger than the oldest
    /// transaction already holding or waiting for an exclusive lock).
    pub fn lock_shared(&self, txn: &Transaction, rid: Rid) -> bool {
        if txn.state() == TransactionState::Aborted {
            return false;
        }
        debug_assert_eq!(
            txn.state(),
            TransactionState::Growing,
            "LockShared requires a transaction in the growing phase"
        );

        let mut table = self.table.lock().unwrap();
        {
            let queue = table.entry(rid).or_default();
            if queue.exclusive_count > 0 {
                if let Some(oldest) = queue.oldest() {
                    if txn.id() > oldest {
                        txn.set_state(TransactionState::Aborted);
                        warn!(
                            "txn {} dies acquiring shared lock on a row with an exclusive holder/waiter older than it",
                            txn.id()
                        );
                        return false;
                    }
                }
            }
            queue.requests.push_back(Request {
                txn_id: txn.id(),
                mode: LockMode::Shared,
                granted: false,
            });
        }

        table = self
            .cond
            .wait_while(table, |table| Self::shared_must_wait(table, rid, txn.id()))
            .unwrap();

        let queue = table.get_mut(&rid).unwrap();
        let req = queue
            .requests
            .iter_mut()
            .find(|r| r.txn_id == txn.id())
            .expect("txn's own request must still be queued");
        req.granted = true;
        txn.shared_lock_set().insert(rid);
        drop(table);
        self.cond.notify_all();
        true
    }

    fn shared_must_wait(table: &HashMap<Rid, LockRequestQueue>, rid: Rid, txn_id: u64) -> bool {
        let queue = table.get(&rid).unwrap();
        for r in &queue.requests {
            if r.txn_id == txn_id {
                return false;
            }
            if r.mode != LockMode::Shared || !r.granted {
                return true;
            }
        }
        false
    }

    /// Acquires an exclusive lock on `rid` for `txn`, blocking until granted.
    pub fn lock_exclusive(&self, txn: &Transaction, rid: Rid) -> bool {
        if txn.state() == TransactionState::Aborted {
            return false;
        }
        debug_assert_eq!(
            txn.state(),
            TransactionState::Growing,
            "LockExclusive requires a transaction in the growing phase"
        );

        let mut table = self.table.lock().unwrap();
        {
            let queue = table.entry(rid).or_default();
            if let Some(oldest) = queue.oldest() {
                if txn.id() > oldest {
                    txn.set_state(TransactionState::Aborted);
                    warn!(
                        "txn {} dies acquiring exclusive lock on a row held/waited on by an older transaction",
                        txn.id()
                    );
                    return false;
                }
            }
            queue.requests.push_back(Request {
                txn_id: txn.id(),
                mode: LockMode::Exclusive,
                granted: false,
            });
            queue.exclusive_count += 1;
        }

        table = self
            .cond
            .wait_while(table, |table| {
                table.get(&rid).unwrap().requests.front().map(|r| r.txn_id) != Some(txn.id())
            })
            .unwrap();

        let queue = table.get_mut(&rid).unwrap();
        queue.requests.front_mut().unwrap().granted = true;
        txn.exclusive_lock_set().insert(rid);
        drop(table);
        self.cond.notify_all();
        true
    }

    /// Upgrades `txn`'s existing shared lock on `rid` to exclusive.
    ///
    /// Wait-die applies against every request queued strictly between the
    /// transaction's shared grant and the first exclusive request after it:
    /// if any of those is older, `txn` dies rather than risk starving it.
    pub fn lock_upgrade(&self, txn: &Transaction, rid: Rid) -> bool {
        if txn.state() == TransactionState::Aborted {
            return false;
        }

        let mut table = self.table.lock().unwrap();

        {
            let queue = match table.get(&rid) {
                Some(q) => q,
                None => return false,
            };
            let src = match queue
                .requests
                .iter()
                .position(|r| r.txn_id == txn.id() && r.mode == LockMode::Shared)
            {
                Some(i) => i,
                None => return false,
            };
            let tgt = queue
                .requests
                .iter()
                .enumerate()
                .skip(src + 1)
                .find(|(_, r)| r.mode == LockMode::Exclusive)
                .map(|(i, _)| i)
                .unwrap_or(queue.requests.len());

            for r in queue.requests.iter().take(tgt).skip(src + 1) {
                if r.txn_id < txn.id() {
                    txn.set_state(TransactionState::Aborted);
                    warn!("txn {} dies upgrading lock (wait-die against an older waiter)", txn.id());
                    return false;
                }
            }
        }

        {
            let queue = table.get_mut(&rid).unwrap();
            let src = queue
                .requests
                .iter()
                .position(|r| r.txn_id == txn.id() && r.mode == LockMode::Shared)
                .unwrap();
            queue.requests.remove(src);
            let tgt = queue
                .requests
                .iter()
                .enumerate()
                .skip(src)
                .find(|(_, r)| r.mode == LockMode::Exclusive)
                .map(|(i, _)| i)
                .unwrap_or(queue.requests.len());
            queue.requests.insert(
                tgt,
                Request {
                    txn_id: txn.id(),
                    mode: LockMode::Exclusive,
                    granted: false,
                },
            );
            queue.exclusive_count += 1;
        }

        table = self
            .cond
            .wait_while(table, |table| {
                table.get(&rid).unwrap().requests.front().map(|r| r.txn_id) != Some(txn.id())
            })
            .unwrap();

        let queue = table.get_mut(&rid).unwrap();
        queue.requests.front_mut().unwrap().granted = true;
        txn.shared_lock_set().remove(&rid);
        txn.exclusive_lock_set().insert(rid);
        drop(table);
        self.cond.notify_all();
        true
    }

    /// Releases `txn`'s lock on `rid`. A transaction still in its growing
    /// phase transitions to shrinking on its first unlock (non-strict 2PL).
    pub fn unlock(&self, txn: &Transaction, rid: Rid) -> bool {
        let mut table = self.table.lock().unwrap();

        {
            let queue = match table.get_mut(&rid) {
                Some(q) => q,
                None => return false,
            };
            let pos = match queue.requests.iter().position(|r| r.txn_id == txn.id()) {
                Some(p) => p,
                None => return false,
            };
            let req = queue.requests.remove(pos).unwrap();
            if req.mode == LockMode::Exclusive {
                queue.exclusive_count -= 1;
            }
        }

        txn.shared_lock_set().remove(&rid);
        txn.exclusive_lock_set().remove(&rid);

        if table.get(&rid).map(|q| q.requests.is_empty()) == Some(true) {
            table.remove(&rid);
        }

        if txn.state() == TransactionState::Growing {
            txn.set_state(TransactionState::Shrinking);
            debug!("txn {} entered shrinking phase", txn.id());
        }

        drop(table);
        self.cond.notify_all();
        true
    }
}
