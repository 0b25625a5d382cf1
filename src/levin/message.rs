//! Handshake construction and decoding of inbound frames

use super::bucket::{Bucket, BucketHeader, HEADER_SIZE, SIGNATURE_SIZE};
use super::storage::{Section, Value};
use super::{LevinError, COMMAND_HANDSHAKE};
use crate::node::NodeIdentity;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use tokio::io::{AsyncRead, AsyncReadExt};

/// Monero mainnet network id
pub const MAINNET_NETWORK_ID: [u8; 16] = [
    0x12, 0x30, 0xf1, 0x71, 0x61, 0x04, 0x41, 0x61, 0x17, 0x31, 0x00, 0x82, 0x16, 0xa1, 0xa1, 0x10,
];

/// Monero mainnet genesis block id
pub const MAINNET_GENESIS_ID: [u8; 32] = [
    0x41, 0x80, 0x15, 0xbb, 0x9a, 0xe9, 0x82, 0xa1, 0x97, 0x5d, 0xa7, 0xd7, 0x92, 0x77, 0xc2, 0x70,
    0x57, 0x27, 0xa5, 0x68, 0x94, 0xba, 0x0f, 0xb2, 0x46, 0xad, 0xaa, 0xbb, 0x1f, 0x46, 0x32, 0xe3,
];

const ADDRESS_TYPE_IPV4: u64 = 1;
const ADDRESS_TYPE_IPV6: u64 = 2;

const PEERLIST_KEY: &str = "local_peerlist_new";

/// Why a single peer-list entry could not be turned into a node
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecordError {
    #[error("peer entry is not a section")]
    NotASection,

    #[error("peer entry is missing `{0}`")]
    MissingField(&'static str),

    #[error("peer entry field `{0}` is out of range")]
    OutOfRange(&'static str),

    #[error("unsupported address type {0}")]
    UnsupportedAddress(u64),
}

/// One entry of a peer list, as advertised by a remote node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerRecord {
    pub ip: IpAddr,
    pub port: u16,
    pub pruning_seed: Option<u32>,
    pub rpc_port: Option<u16>,
}

impl PeerRecord {
    /// Coerce a raw `local_peerlist_new` entry
    pub fn from_entry(entry: &Value) -> Result<Self, RecordError> {
        let entry = entry.as_section().ok_or(RecordError::NotASection)?;
        let adr = section_field(entry, "adr")?;
        let kind = entry_u64(adr, "type")?;
        let addr = section_field(adr, "addr")?;

        let ip = match kind {
            ADDRESS_TYPE_IPV4 => {
                let raw = u32::try_from(entry_u64(addr, "m_ip")?)
                    .map_err(|_| RecordError::OutOfRange("m_ip"))?;
                IpAddr::V4(Ipv4Addr::from(raw.to_le_bytes()))
            }
            ADDRESS_TYPE_IPV6 => {
                let raw: [u8; 16] = addr
                    .get("addr")
                    .and_then(Value::as_bytes)
                    .ok_or(RecordError::MissingField("addr"))?
                    .try_into()
                    .map_err(|_| RecordError::OutOfRange("addr"))?;
                IpAddr::V6(Ipv6Addr::from(raw))
            }
            other => return Err(RecordError::UnsupportedAddress(other)),
        };
        let port = u16::try_from(entry_u64(addr, "m_port")?)
            .map_err(|_| RecordError::OutOfRange("m_port"))?;

        let pruning_seed = optional_u64(entry, "pruning_seed")?
            .map(|v| u32::try_from(v).map_err(|_| RecordError::OutOfRange("pruning_seed")))
            .transpose()?;
        let rpc_port = optional_u64(entry, "rpc_port")?
            .map(|v| u16::try_from(v).map_err(|_| RecordError::OutOfRange("rpc_port")))
            .transpose()?;

        Ok(Self {
            ip,
            port,
            pruning_seed,
            rpc_port,
        })
    }

    /// Encode as a `local_peerlist_new` entry
    pub fn to_entry(&self) -> Value {
        let addr = match self.ip {
            IpAddr::V4(ip) => Section::new()
                .with("m_ip", Value::U32(u32::from_le_bytes(ip.octets())))
                .with("m_port", Value::U16(self.port)),
            IpAddr::V6(ip) => Section::new()
                .with("addr", Value::Bytes(ip.octets().to_vec()))
                .with("m_port", Value::U16(self.port)),
        };
        let kind = match self.ip {
            IpAddr::V4(_) => ADDRESS_TYPE_IPV4,
            IpAddr::V6(_) => ADDRESS_TYPE_IPV6,
        };
        let adr = Section::new()
            .with("type", Value::U8(kind as u8))
            .with("addr", Value::Section(addr));

        let mut entry = Section::new()
            .with("adr", Value::Section(adr))
            .with("id", Value::U64(rand::random()));
        if let Some(seed) = self.pruning_seed {
            entry.insert("pruning_seed", Value::U32(seed));
        }
        if let Some(port) = self.rpc_port {
            entry.insert("rpc_port", Value::U16(port));
        }
        Value::Section(entry)
    }
}

impl From<PeerRecord> for NodeIdentity {
    fn from(record: PeerRecord) -> Self {
        NodeIdentity::with_details(
            record.ip.to_string(),
            record.port,
            record.pruning_seed,
            record.rpc_port,
        )
    }
}

fn section_field<'a>(section: &'a Section, name: &'static str) -> Result<&'a Section, RecordError> {
    section
        .get(name)
        .and_then(Value::as_section)
        .ok_or(RecordError::MissingField(name))
}

fn entry_u64(section: &Section, name: &'static str) -> Result<u64, RecordError> {
    optional_u64(section, name)?.ok_or(RecordError::MissingField(name))
}

fn optional_u64(section: &Section, name: &'static str) -> Result<Option<u64>, RecordError> {
    match section.get(name) {
        None => Ok(None),
        Some(value) => value.as_u64().map(Some).ok_or(RecordError::OutOfRange(name)),
    }
}

/// A decoded inbound frame
#[derive(Debug, Clone)]
pub struct Message {
    pub header: BucketHeader,
    pub body: Section,
}

impl Message {
    pub fn command(&self) -> u32 {
        self.header.command
    }

    /// The handshake response carries the peer list and ends the exchange
    pub fn is_peer_list(&self) -> bool {
        self.header.command == COMMAND_HANDSHAKE
    }

    /// Every peer-list entry, each coerced independently
    pub fn peers(&self) -> Vec<Result<PeerRecord, RecordError>> {
        self.body
            .get(PEERLIST_KEY)
            .and_then(Value::as_array)
            .map(|entries| entries.iter().map(PeerRecord::from_entry).collect())
            .unwrap_or_default()
    }
}

fn handshake_payload_data() -> Section {
    Section::new()
        .with("current_height", Value::U64(1))
        .with("cumulative_difficulty", Value::U64(1))
        .with("cumulative_difficulty_top64", Value::U64(0))
        .with("top_id", Value::Bytes(MAINNET_GENESIS_ID.to_vec()))
        .with("top_version", Value::U8(1))
        .with("pruning_seed", Value::U32(0))
}

/// Build the handshake request sent to every probed node
pub fn build_handshake_request() -> Result<Bucket, LevinError> {
    let node_data = Section::new()
        .with("network_id", Value::Bytes(MAINNET_NETWORK_ID.to_vec()))
        .with("my_port", Value::U32(0))
        .with("rpc_port", Value::U16(0))
        .with("rpc_credits_per_hash", Value::U32(0))
        .with("peer_id", Value::U64(rand::random()))
        .with("support_flags", Value::U32(1));
    let body = Section::new()
        .with("node_data", Value::Section(node_data))
        .with("payload_data", Value::Section(handshake_payload_data()));
    Bucket::request(COMMAND_HANDSHAKE, &body)
}

/// Build a handshake response carrying the given raw peer-list entries
pub fn build_handshake_response(entries: Vec<Value>) -> Result<Bucket, LevinError> {
    let node_data = Section::new()
        .with("network_id", Value::Bytes(MAINNET_NETWORK_ID.to_vec()))
        .with("my_port", Value::U32(18080))
        .with("peer_id", Value::U64(rand::random()));
    let body = Section::new()
        .with("node_data", Value::Section(node_data))
        .with("payload_data", Value::Section(handshake_payload_data()))
        .with(PEERLIST_KEY, Value::Array(entries));
    Bucket::response(COMMAND_HANDSHAKE, &body)
}

/// Decode one frame whose first [`SIGNATURE_SIZE`] bytes were already read
pub async fn decode_frame<R>(
    prefix: &[u8; SIGNATURE_SIZE],
    stream: &mut R,
    max_body: u64,
) -> Result<Message, LevinError>
where
    R: AsyncRead + Unpin,
{
    let mut header_bytes = [0u8; HEADER_SIZE];
    header_bytes[..SIGNATURE_SIZE].copy_from_slice(prefix);
    stream.read_exact(&mut header_bytes[SIGNATURE_SIZE..]).await?;
    let header = BucketHeader::from_bytes(&header_bytes)?;

    if header.body_size > max_body {
        return Err(LevinError::BodyTooLarge {
            size: header.body_size,
            limit: max_body,
        });
    }
    let mut body = vec![0u8; header.body_size as usize];
    stream.read_exact(&mut body).await?;

    let body = if body.is_empty() {
        Section::new()
    } else {
        Section::from_bytes(&body)?
    };
    Ok(Message { header, body })
}
