//! Node prober: one connect, handshake, peer-list round trip
//!
//! Every failure mode is classified and handed back to the caller; nothing
//! here retries and nothing here touches crawl state.

use crate::levin::{self, LevinError, LEVIN_SIGNATURE, SIGNATURE_SIZE};
use crate::node::NodeIdentity;
use log::debug;
use std::collections::HashSet;
use std::future::Future;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

/// Peers learned from one node
pub type PeerSet = HashSet<NodeIdentity>;

/// Outcome of one probe: the advertised peers (possibly none) or why there are none
pub type ProbeResult = Result<PeerSet, ProbeError>;

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("connection timed out")]
    ConnectTimeout,

    #[error("connection refused")]
    ConnectionRefused,

    #[error("unable to connect: {0}")]
    Connect(#[source] io::Error),

    #[error("failed to build handshake: {0}")]
    Encode(#[source] LevinError),

    #[error("send failed: {0}")]
    Send(#[source] io::Error),

    #[error("response does not start with Levin signature (got {prefix})")]
    BadSignature { prefix: String },

    #[error("failed to decode response: {0}")]
    Decode(#[source] LevinError),

    #[error("receive failed: {0}")]
    Receive(#[source] io::Error),
}

/// Coarse failure classes, for logs and counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Transport,
    Protocol,
    Io,
}

impl ProbeError {
    pub fn kind(&self) -> FailureKind {
        match self {
            ProbeError::ConnectTimeout | ProbeError::ConnectionRefused | ProbeError::Connect(_) => {
                FailureKind::Transport
            }
            ProbeError::Encode(_) | ProbeError::BadSignature { .. } | ProbeError::Decode(_) => {
                FailureKind::Protocol
            }
            ProbeError::Send(_) | ProbeError::Receive(_) => FailureKind::Io,
        }
    }
}

/// Anything that can ask a node for its peers
pub trait Probe: Send + Sync + 'static {
    fn probe(&self, node: &NodeIdentity) -> impl Future<Output = ProbeResult> + Send;
}

/// Prober settings
#[derive(Debug, Clone)]
pub struct ProberConfig {
    /// Applies to the connect and to every individual read
    pub io_timeout: Duration,
    /// Largest frame body accepted from a remote
    pub max_body_size: u64,
}

impl Default for ProberConfig {
    fn default() -> Self {
        Self {
            io_timeout: Duration::from_secs(10),
            max_body_size: 4 * 1024 * 1024,
        }
    }
}

/// TCP prober speaking the Levin handshake
#[derive(Debug, Clone, Default)]
pub struct NodeProber {
    config: ProberConfig,
}

impl NodeProber {
    pub fn new(config: ProberConfig) -> Self {
        Self { config }
    }

    async fn connect(&self, node: &NodeIdentity) -> Result<TcpStream, ProbeError> {
        let connect = TcpStream::connect((node.host.as_str(), node.port));
        match timeout(self.config.io_timeout, connect).await {
            Err(_) => Err(ProbeError::ConnectTimeout),
            Ok(Err(e)) if e.kind() == io::ErrorKind::ConnectionRefused => {
                Err(ProbeError::ConnectionRefused)
            }
            Ok(Err(e)) if e.kind() == io::ErrorKind::TimedOut => Err(ProbeError::ConnectTimeout),
            Ok(Err(e)) => Err(ProbeError::Connect(e)),
            Ok(Ok(stream)) => Ok(stream),
        }
    }

    async fn exchange(
        &self,
        node: &NodeIdentity,
        stream: &mut TcpStream,
    ) -> Result<levin::Message, ProbeError> {
        let request = levin::build_handshake_request().map_err(ProbeError::Encode)?;
        stream.write_all(&request.header()).await.map_err(ProbeError::Send)?;
        stream.write_all(request.payload()).await.map_err(ProbeError::Send)?;
        debug!(">> sent packet '{}' to {}", levin::command_name(request.command), node);

        let signature = LEVIN_SIGNATURE.to_le_bytes();
        loop {
            let mut prefix = [0u8; SIGNATURE_SIZE];
            match timeout(self.config.io_timeout, stream.read_exact(&mut prefix)).await {
                Err(_) => return Err(ProbeError::Receive(io::ErrorKind::TimedOut.into())),
                Ok(Err(e)) => return Err(ProbeError::Receive(e)),
                Ok(Ok(_)) => {}
            }
            if prefix != signature {
                return Err(ProbeError::BadSignature {
                    prefix: hex::encode(prefix),
                });
            }

            let decode = levin::decode_frame(&prefix, stream, self.config.max_body_size);
            let message = match timeout(self.config.io_timeout, decode).await {
                Err(_) => return Err(ProbeError::Receive(io::ErrorKind::TimedOut.into())),
                Ok(Err(LevinError::Io(e))) => return Err(ProbeError::Receive(e)),
                Ok(Err(e)) => return Err(ProbeError::Decode(e)),
                Ok(Ok(message)) => message,
            };

            if message.is_peer_list() {
                return Ok(message);
            }
            debug!(
                "<< skipping '{}' ({}) from {}",
                levin::command_name(message.command()),
                message.command(),
                node
            );
        }
    }
}

impl Probe for NodeProber {
    async fn probe(&self, node: &NodeIdentity) -> ProbeResult {
        let mut stream = self.connect(node).await?;
        let outcome = self.exchange(node, &mut stream).await;
        let _ = stream.shutdown().await;

        let message = outcome?;
        Ok(collect_peers(node, &message))
    }
}

/// Keep every entry that coerces to a node, dropping the rest one by one
pub fn collect_peers(node: &NodeIdentity, message: &levin::Message) -> PeerSet {
    let mut peers = PeerSet::new();
    for record in message.peers() {
        match record {
            Ok(record) => {
                peers.insert(record.into());
            }
            Err(e) => debug!("<< dropping peer entry from {}: {}", node, e),
        }
    }
    debug!("<< {} advertised {} peers", node, peers.len());
    peers
}
