//! p2p-scan: resumable crawler for Levin (Monero) P2P networks
//!
//! Starting from a bootstrap node, repeatedly asks known nodes for their peer
//! lists, widening the set of known nodes round by round. Progress is kept in
//! a JSON checkpoint so a crawl bounded by a per-run budget can continue where
//! the previous run stopped.

pub mod config;
pub mod crawl;
pub mod levin;
pub mod network;
pub mod node;
pub mod storage;

pub use config::{ConfigError, ScanConfig};
pub use crawl::{CrawlConfig, CrawlEnd, CrawlReport, Crawler};
pub use network::{NodeProber, Probe, ProbeError, ProberConfig};
pub use node::NodeIdentity;
pub use storage::{CheckpointStore, FrontierState, SaveOutcome};
