//! Frontier state: which nodes are pending, attempted, or failed
//!
//! Owned by the crawler and mutated only between rounds.

use super::checkpoint::Checkpoint;
use crate::node::NodeIdentity;
use std::collections::HashSet;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrontierState {
    /// Known but not yet attempted this run
    pub to_scan: HashSet<NodeIdentity>,
    /// Attempted, whatever the outcome
    pub scanned: HashSet<NodeIdentity>,
    /// Attempted and failed
    pub error: HashSet<NodeIdentity>,
    /// Frontier left over when the run budget ran out
    pub not_scanned_yet: HashSet<NodeIdentity>,
    /// Attempted during this run, including nodes already in the checkpoint
    attempted: HashSet<NodeIdentity>,
    baseline: usize,
}

impl FrontierState {
    /// Fresh crawl starting from a single node
    pub fn seeded(bootstrap: NodeIdentity) -> Self {
        Self {
            to_scan: HashSet::from([bootstrap]),
            ..Self::default()
        }
    }

    /// Resume from a checkpoint; an empty `not_scanned_yet` restarts at `bootstrap`
    pub fn from_checkpoint(checkpoint: Checkpoint, bootstrap: NodeIdentity) -> Self {
        let scanned: HashSet<_> = checkpoint.scanned.into_iter().collect();
        let mut to_scan: HashSet<_> = checkpoint.not_scanned_yet.into_iter().collect();
        if to_scan.is_empty() {
            to_scan.insert(bootstrap);
        }
        Self {
            to_scan,
            baseline: scanned.len(),
            scanned,
            error: checkpoint.error.into_iter().collect(),
            not_scanned_yet: HashSet::new(),
            attempted: HashSet::new(),
        }
    }

    /// Sorted snapshot for persisting
    pub fn to_checkpoint(&self) -> Checkpoint {
        let sorted = |set: &HashSet<NodeIdentity>| {
            let mut nodes: Vec<_> = set.iter().cloned().collect();
            nodes.sort();
            nodes
        };
        Checkpoint {
            error: sorted(&self.error),
            scanned: sorted(&self.scanned),
            not_scanned_yet: sorted(&self.not_scanned_yet),
        }
    }

    /// Remove up to `max` nodes from the frontier, in no particular order
    pub fn take_batch(&mut self, max: usize) -> Vec<NodeIdentity> {
        let batch: Vec<_> = self.to_scan.iter().take(max).cloned().collect();
        for node in &batch {
            self.to_scan.remove(node);
        }
        batch
    }

    /// Record an attempt, successful or not
    pub fn mark_scanned(&mut self, node: NodeIdentity) {
        self.attempted.insert(node.clone());
        self.scanned.insert(node);
    }

    /// Record a failed attempt
    pub fn mark_failed(&mut self, node: NodeIdentity) {
        self.error.insert(node.clone());
        self.mark_scanned(node);
    }

    /// Add newly discovered peers to the frontier, skipping anything already
    /// attempted. Returns how many nodes were new to the frontier.
    pub fn merge_discovered(&mut self, discovered: HashSet<NodeIdentity>) -> usize {
        let before = self.to_scan.len();
        self.to_scan
            .extend(discovered.into_iter().filter(|node| !self.scanned.contains(node)));
        self.to_scan.len() - before
    }

    /// Park the remaining frontier for the next run
    pub fn fold_frontier(&mut self) {
        self.not_scanned_yet.extend(self.to_scan.drain());
    }

    /// Number of `scanned` entries that came from the checkpoint
    pub fn baseline(&self) -> usize {
        self.baseline
    }

    /// Nodes attempted during this run, whether or not the checkpoint
    /// already listed them as scanned
    pub fn newly_scanned(&self) -> usize {
        self.attempted.len()
    }
}
