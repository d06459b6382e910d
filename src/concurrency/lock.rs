use std::{
    collections::{HashSet, VecDeque},
    sync::Arc,
};

use parking_lot::{Condvar, Mutex};

use super::{Error, LockMode, Result, WaitsForGraph};
use crate::storage::TransactionId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LockRequest {
    txn: TransactionId,
    mode: LockMode,
}

#[derive(Debug, Default)]
struct LockState {
    owners: HashSet<TransactionId>,
    /// `None` while nobody owns the lock.
    mode: Option<LockMode>,
    queue: VecDeque<LockRequest>,
}

impl LockState {
    /// Whether `request` may be granted now.
    fn can_promote(&self, request: LockRequest) -> bool {
        if self.mode == Some(LockMode::Exclusive) && !self.owners.is_empty() {
            return false;
        }

        // a single owner waiting to upgrade goes before anybody else
        if self.owners.len() == 1 {
            if let Some(upgrade) = self.queue.iter().find(|r| self.owners.contains(&r.txn)) {
                return *upgrade == request;
            }
        }

        for (position, queued) in self.queue.iter().enumerate() {
            match queued.mode {
                LockMode::Shared if *queued == request => return true,
                LockMode::Shared => {}
                LockMode::Exclusive => {
                    return *queued == request && self.owners.is_empty() && position == 0;
                }
            }
        }

        false
    }

    fn dequeue(&mut self, request: LockRequest) {
        if let Some(position) = self.queue.iter().position(|r| *r == request) {
            self.queue.remove(position);
        }
    }
}

/// Shared/exclusive lock over one resource with a FIFO wait queue.
#[derive(Debug)]
pub struct Lock {
    resource: String,
    state: Mutex<LockState>,
    available: Condvar,
    graph: Arc<WaitsForGraph>,
}

impl Lock {
    pub fn new(resource: impl Into<String>, graph: Arc<WaitsForGraph>) -> Self {
        Self {
            resource: resource.into(),
            state: Mutex::new(LockState::default()),
            available: Condvar::new(),
            graph,
        }
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// Blocks until `txn` holds the lock in `mode`. Returns immediately if it
    /// already holds a sufficient mode.
    ///
    /// Before every wait the transaction is recorded as waiting for all
    /// current owners. If that would close a cycle in the waits-for graph the
    /// request is withdrawn and [`Error::Deadlock`] is returned.
    pub fn acquire(&self, txn: TransactionId, mode: LockMode) -> Result<()> {
        let mut state = self.state.lock();

        if state.owners.contains(&txn)
            && (mode == LockMode::Shared || state.mode == Some(LockMode::Exclusive))
        {
            return Ok(());
        }

        let request = LockRequest { txn, mode };
        state.queue.push_back(request);

        while !state.can_promote(request) {
            let owners: Vec<_> = state.owners.iter().copied().filter(|o| *o != txn).collect();

            self.graph.clear_edges_from(txn);
            if !self.graph.add_edges(txn, &owners) {
                state.dequeue(request);
                // others may have been queued behind this request
                self.available.notify_all();

                log::warn!(
                    "rejected {mode} lock on {} for transaction {txn}, waiting for {owners:?} would deadlock",
                    self.resource
                );

                return Err(Error::Deadlock {
                    txn,
                    mode,
                    resource: self.resource.clone(),
                });
            }

            log::trace!(
                "transaction {txn} waits for {mode} lock on {} held by {owners:?}",
                self.resource
            );
            self.available.wait(&mut state);
        }

        self.graph.clear_edges_from(txn);
        state.dequeue(request);
        state.owners.insert(txn);
        state.mode = Some(mode);

        log::trace!("transaction {txn} acquired {mode} lock on {}", self.resource);

        Ok(())
    }

    /// Gives up ownership of `txn` and wakes every waiter.
    pub fn release(&self, txn: TransactionId) {
        let mut state = self.state.lock();
        state.owners.remove(&txn);
        if state.owners.is_empty() {
            state.mode = None;
        }
        self.available.notify_all();

        log::trace!("transaction {txn} released lock on {}", self.resource);
    }

    pub fn holds(&self, txn: TransactionId, mode: LockMode) -> bool {
        let state = self.state.lock();
        state.owners.contains(&txn) && state.mode == Some(mode)
    }

    pub fn is_owner(&self, txn: TransactionId) -> bool {
        self.state.lock().owners.contains(&txn)
    }

    /// Nobody owns the lock and nobody waits for it.
    pub fn is_idle(&self) -> bool {
        let state = self.state.lock();
        state.owners.is_empty() && state.queue.is_empty()
    }

    pub fn mode(&self) -> Option<LockMode> {
        self.state.lock().mode
    }

    pub fn num_owners(&self) -> usize {
        self.state.lock().owners.len()
    }
}
