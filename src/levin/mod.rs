//! Levin protocol codec: framing and payloads for Monero's P2P wire format
//!
//! Only the subset a crawler needs: building a handshake request and decoding
//! whatever framed messages come back, down to the peer list carried by the
//! handshake response.

mod bucket;
mod message;
mod storage;

pub use bucket::{Bucket, BucketHeader, HEADER_SIZE, SIGNATURE_SIZE};
pub use message::{
    build_handshake_request, build_handshake_response, decode_frame, Message, PeerRecord,
    RecordError, MAINNET_GENESIS_ID, MAINNET_NETWORK_ID,
};
pub use storage::{Section, Value};

/// Magic value at the start of every Levin frame
pub const LEVIN_SIGNATURE: u64 = 0x0101_0101_0101_2101;
pub const LEVIN_PROTOCOL_VERSION: u32 = 1;

pub const LEVIN_PACKET_REQUEST: u32 = 0x0000_0001;
pub const LEVIN_PACKET_RESPONSE: u32 = 0x0000_0002;

/// P2P command codes (`P2P_COMMANDS_POOL_BASE` is 1000)
pub const COMMAND_HANDSHAKE: u32 = 1001;
pub const COMMAND_TIMED_SYNC: u32 = 1002;
pub const COMMAND_PING: u32 = 1003;
pub const COMMAND_REQUEST_SUPPORT_FLAGS: u32 = 1007;

/// Human-readable name of a P2P command, for diagnostics
pub fn command_name(command: u32) -> &'static str {
    match command {
        COMMAND_HANDSHAKE => "handshake",
        COMMAND_TIMED_SYNC => "timed_sync",
        COMMAND_PING => "ping",
        COMMAND_REQUEST_SUPPORT_FLAGS => "support_flags",
        _ => "unknown",
    }
}

/// Codec errors
#[derive(Debug, thiserror::Error)]
pub enum LevinError {
    #[error("frame does not start with the Levin signature")]
    BadSignature,

    #[error("unsupported Levin protocol version {0}")]
    UnsupportedVersion(u32),

    #[error("frame body of {size} bytes exceeds limit of {limit}")]
    BodyTooLarge { size: u64, limit: u64 },

    #[error("payload does not start with the portable storage signature")]
    BadStorageSignature,

    #[error("payload truncated")]
    Truncated,

    #[error("unknown portable storage type tag {0:#04x}")]
    UnknownType(u8),

    #[error("invalid entry name")]
    InvalidName,

    #[error("portable storage nested too deeply")]
    TooDeep,

    #[error("array elements must share one type")]
    MixedArray,

    #[error("value {0} does not fit in a varint")]
    VarintOverflow(u64),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
