use std::{collections::HashMap, sync::Arc};

use parking_lot::Mutex;

use super::{Lock, LockMode, Result, WaitsForGraph};
use crate::storage::TransactionId;

/// Registry of per table locks sharing one waits-for graph.
///
/// Locks are created on first request and dropped again once nobody owns or
/// waits for them. The registry mutex only guards the map, it is never held
/// while blocking on a lock.
#[derive(Debug, Default)]
pub struct LockManager {
    locks: Mutex<HashMap<String, Arc<Lock>>>,
    graph: Arc<WaitsForGraph>,
}

impl LockManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn graph(&self) -> &Arc<WaitsForGraph> {
        &self.graph
    }

    fn lock_for(&self, resource: &str) -> Arc<Lock> {
        let mut locks = self.locks.lock();
        Arc::clone(
            locks
                .entry(resource.to_string())
                .or_insert_with(|| Arc::new(Lock::new(resource, Arc::clone(&self.graph)))),
        )
    }

    /// Drops the lock of `resource` if it is idle and only referenced by the
    /// registry and `lock`.
    fn remove_if_idle(&self, resource: &str, lock: Arc<Lock>) {
        let mut locks = self.locks.lock();
        if Arc::strong_count(&lock) == 2 && lock.is_idle() {
            locks.remove(resource);
        }
    }

    pub fn acquire(&self, resource: &str, txn: TransactionId, mode: LockMode) -> Result<()> {
        self.graph.add_node(txn);
        let lock = self.lock_for(resource);
        let result = lock.acquire(txn, mode);
        if result.is_err() {
            self.remove_if_idle(resource, lock);
        }
        result
    }

    pub fn release(&self, resource: &str, txn: TransactionId) {
        let Some(lock) = self.locks.lock().get(resource).cloned() else {
            return;
        };
        lock.release(txn);
        self.remove_if_idle(resource, lock);
    }

    pub fn holds(&self, resource: &str, txn: TransactionId, mode: LockMode) -> bool {
        self.locks
            .lock()
            .get(resource)
            .is_some_and(|lock| lock.holds(txn, mode))
    }

    /// Resources currently owned by `txn`.
    pub fn held_by(&self, txn: TransactionId) -> Vec<String> {
        self.locks
            .lock()
            .iter()
            .filter(|(_, lock)| lock.is_owner(txn))
            .map(|(resource, _)| resource.clone())
            .collect()
    }

    /// Releases every lock of `txn` and forgets it in the waits-for graph.
    pub fn release_all(&self, txn: TransactionId) {
        for resource in self.held_by(txn) {
            self.release(&resource, txn);
        }
        self.graph.remove_node(txn);
    }

    /// Number of locks currently in the registry.
    pub fn num_locks(&self) -> usize {
        self.locks.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use std::{thread, time::Duration};

    use super::*;
    use crate::concurrency::Error;

    #[test]
    fn test_locks_are_dropped_when_idle() -> anyhow::Result<()> {
        let manager = LockManager::new();

        manager.acquire("users", 1, LockMode::Shared)?;
        manager.acquire("orders", 1, LockMode::Exclusive)?;
        assert_eq!(manager.num_locks(), 2);
        assert!(manager.holds("orders", 1, LockMode::Exclusive));

        let mut held = manager.held_by(1);
        held.sort();
        assert_eq!(held, vec!["orders".to_string(), "users".to_string()]);

        manager.release("users", 1);
        assert_eq!(manager.num_locks(), 1);

        manager.release_all(1);
        assert_eq!(manager.num_locks(), 0);
        assert!(!manager.holds("orders", 1, LockMode::Exclusive));

        Ok(())
    }

    #[test]
    fn test_deadlock_is_rejected() -> anyhow::Result<()> {
        let manager = Arc::new(LockManager::new());

        manager.acquire("a", 1, LockMode::Exclusive)?;
        manager.acquire("b", 2, LockMode::Exclusive)?;

        let first = {
            let manager = Arc::clone(&manager);
            thread::spawn(move || manager.acquire("b", 1, LockMode::Exclusive))
        };

        for _ in 0..1000 {
            if manager.graph().edge_exists(1, 2) {
                break;
            }
            thread::sleep(Duration::from_millis(2));
        }
        assert!(manager.graph().edge_exists(1, 2));

        let result = manager.acquire("a", 2, LockMode::Exclusive);
        assert!(matches!(result, Err(Error::Deadlock { txn: 2, .. })));
        assert!(!manager.graph().edge_exists(2, 1));

        // 2 gives up, 1 gets its lock
        manager.release_all(2);
        first.join().expect("waiter panicked")?;
        assert!(manager.holds("b", 1, LockMode::Exclusive));
        assert!(manager.holds("a", 1, LockMode::Exclusive));

        Ok(())
    }
}
