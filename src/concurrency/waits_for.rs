use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;

use crate::storage::TransactionId;

/// Directed graph of transactions waiting for lock owners. Edges that would
/// close a cycle are never inserted, so the graph stays acyclic.
#[derive(Debug, Default)]
pub struct WaitsForGraph {
    edges: Mutex<HashMap<TransactionId, HashSet<TransactionId>>>,
}

/// Whether `target` can be reached from `start` following edges.
fn reaches(
    edges: &HashMap<TransactionId, HashSet<TransactionId>>,
    start: TransactionId,
    target: TransactionId,
) -> bool {
    let mut visited = HashSet::new();
    let mut stack = vec![start];

    while let Some(node) = stack.pop() {
        if node == target {
            return true;
        }
        if !visited.insert(node) {
            continue;
        }
        if let Some(next) = edges.get(&node) {
            stack.extend(next.iter().copied().filter(|n| !visited.contains(n)));
        }
    }

    false
}

impl WaitsForGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains_node(&self, txn: TransactionId) -> bool {
        self.edges.lock().contains_key(&txn)
    }

    pub fn add_node(&self, txn: TransactionId) {
        self.edges.lock().entry(txn).or_default();
    }

    /// Drops `txn` together with every edge into or out of it.
    pub fn remove_node(&self, txn: TransactionId) {
        let mut edges = self.edges.lock();
        edges.remove(&txn);
        for targets in edges.values_mut() {
            targets.remove(&txn);
        }
    }

    pub fn edge_exists(&self, from: TransactionId, to: TransactionId) -> bool {
        self.edges
            .lock()
            .get(&from)
            .is_some_and(|targets| targets.contains(&to))
    }

    /// Whether adding `from -> to` would close a cycle. Does not modify the
    /// graph.
    pub fn edge_causes_cycle(&self, from: TransactionId, to: TransactionId) -> bool {
        from != to && reaches(&self.edges.lock(), to, from)
    }

    /// Adds `from -> to` unless it would close a cycle. Self edges are
    /// ignored. Returns false when the edge was rejected.
    pub fn add_edge(&self, from: TransactionId, to: TransactionId) -> bool {
        self.add_edges(from, &[to])
    }

    /// Adds `from -> to` for every `to` in `targets`, or none of them if any
    /// would close a cycle. Returns false when the edges were rejected.
    pub fn add_edges(&self, from: TransactionId, targets: &[TransactionId]) -> bool {
        let mut edges = self.edges.lock();

        if targets
            .iter()
            .any(|&to| to != from && reaches(&edges, to, from))
        {
            return false;
        }

        let out = edges.entry(from).or_default();
        out.extend(targets.iter().copied().filter(|&to| to != from));
        for &to in targets {
            edges.entry(to).or_default();
        }

        true
    }

    pub fn remove_edge(&self, from: TransactionId, to: TransactionId) {
        if let Some(targets) = self.edges.lock().get_mut(&from) {
            targets.remove(&to);
        }
    }

    /// Removes every edge leaving `from`.
    pub fn clear_edges_from(&self, from: TransactionId) {
        if let Some(targets) = self.edges.lock().get_mut(&from) {
            targets.clear();
        }
    }
}
