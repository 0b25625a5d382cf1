//! Round-based traversal of the peer graph
//!
//! Each round drains as much of the frontier as the remaining budget allows,
//! probes every drained node concurrently, waits for all of them, then merges
//! whatever they advertised back into the frontier. A round is as wide as the
//! frontier and budget permit; there is no fixed worker pool.

use crate::network::{FailureKind, PeerSet, Probe, ProbeError};
use crate::node::NodeIdentity;
use crate::storage::FrontierState;
use futures::future::join_all;
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinError;
use tokio::time::timeout;

/// Crawl settings
#[derive(Debug, Clone)]
pub struct CrawlConfig {
    /// Maximum probe attempts in one run
    pub limit: usize,
    /// Outer deadline for one probe task, independent of the prober's own timeouts
    pub probe_deadline: Duration,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            limit: 100,
            probe_deadline: Duration::from_secs(5),
        }
    }
}

/// Why an attempt produced no peers
#[derive(Debug, thiserror::Error)]
pub enum AttemptError {
    #[error(transparent)]
    Probe(#[from] ProbeError),

    #[error("no answer within {0:?}, task cancelled")]
    DeadlineExceeded(Duration),

    #[error("probe task failed: {0}")]
    Dispatch(#[source] JoinError),
}

impl AttemptError {
    /// Deadline and task failures count as transport failures
    pub fn kind(&self) -> FailureKind {
        match self {
            AttemptError::Probe(e) => e.kind(),
            AttemptError::DeadlineExceeded(_) | AttemptError::Dispatch(_) => FailureKind::Transport,
        }
    }
}

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlEnd {
    /// Every reachable node was attempted before the budget ran out
    FrontierExhausted,
    /// The budget ran out; the rest of the frontier is in `not_scanned_yet`
    BudgetExhausted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlReport {
    pub attempts: usize,
    pub failures: usize,
    pub rounds: usize,
    pub end: CrawlEnd,
}

/// Drives probes over the frontier until it is empty or the budget is spent
pub struct Crawler<P> {
    prober: Arc<P>,
    config: CrawlConfig,
}

impl<P: Probe> Crawler<P> {
    pub fn new(prober: P, config: CrawlConfig) -> Self {
        Self {
            prober: Arc::new(prober),
            config,
        }
    }

    /// Crawl from `state` and hand it back once the run is over
    pub async fn run(&self, mut state: FrontierState) -> (FrontierState, CrawlReport) {
        let limit = self.config.limit;
        let mut attempts = 0;
        let mut failures = 0;
        let mut rounds = 0;

        let end = loop {
            if attempts >= limit {
                state.fold_frontier();
                info!(
                    "Reached limit of {} probes, {} nodes left for the next run",
                    limit,
                    state.not_scanned_yet.len()
                );
                break CrawlEnd::BudgetExhausted;
            }
            if state.to_scan.is_empty() {
                info!("Scanned {} nodes, then ran out (limit: {})", attempts, limit);
                break CrawlEnd::FrontierExhausted;
            }

            rounds += 1;
            let batch = state.take_batch(limit - attempts);
            let width = batch.len();
            let outcomes = self.run_round(attempts, &batch).await;
            attempts += batch.len();

            let mut discovered = PeerSet::new();
            for (node, outcome) in batch.into_iter().zip(outcomes) {
                match outcome {
                    Ok(peers) => {
                        discovered.extend(peers);
                        state.mark_scanned(node);
                    }
                    Err(e) => {
                        warn!("xx {} [{:?}]: {}", node, e.kind(), e);
                        failures += 1;
                        state.mark_failed(node);
                    }
                }
            }

            let advertised = discovered.len();
            let added = state.merge_discovered(discovered);
            info!(
                "Round {}: {} probed, {} peers advertised, {} new, {} pending ({}/{} probes used)",
                rounds,
                width,
                advertised,
                added,
                state.to_scan.len(),
                attempts,
                limit
            );
        };

        let report = CrawlReport {
            attempts,
            failures,
            rounds,
            end,
        };
        (state, report)
    }

    /// Probe every node of the batch concurrently and wait for all of them.
    /// Outcomes come back in batch order.
    async fn run_round(
        &self,
        first: usize,
        batch: &[NodeIdentity],
    ) -> Vec<Result<PeerSet, AttemptError>> {
        let deadline = self.config.probe_deadline;
        let handles: Vec<_> = batch
            .iter()
            .enumerate()
            .map(|(i, node)| {
                debug!("> spawning probe {} for {}", first + i + 1, node);
                let prober = Arc::clone(&self.prober);
                let node = node.clone();
                tokio::spawn(async move { timeout(deadline, prober.probe(&node)).await })
            })
            .collect();

        join_all(handles)
            .await
            .into_iter()
            .map(|joined| match joined {
                Ok(Ok(probed)) => probed.map_err(AttemptError::from),
                Ok(Err(_elapsed)) => Err(AttemptError::DeadlineExceeded(deadline)),
                Err(e) => Err(AttemptError::Dispatch(e)),
            })
            .collect()
    }
}
