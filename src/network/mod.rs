//! Talking to individual P2P nodes
//!
//! One probe is one short-lived TCP connection: connect, send the Levin
//! handshake, read frames until the peer list arrives, hang up.

mod prober;

pub use prober::{
    collect_peers, FailureKind, NodeProber, PeerSet, Probe, ProbeError, ProbeResult,
    ProberConfig,
};
