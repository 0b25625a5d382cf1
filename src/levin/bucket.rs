//! Levin frames ("buckets"): a 33-byte header followed by a storage body

use super::storage::Section;
use super::{
    LevinError, LEVIN_PACKET_REQUEST, LEVIN_PACKET_RESPONSE, LEVIN_PROTOCOL_VERSION,
    LEVIN_SIGNATURE,
};

pub const HEADER_SIZE: usize = 33;

/// Bytes read before deciding whether a stream speaks Levin at all
pub const SIGNATURE_SIZE: usize = 8;

/// Decoded Levin header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketHeader {
    pub body_size: u64,
    pub expect_response: bool,
    pub command: u32,
    pub return_code: i32,
    pub flags: u32,
    pub protocol_version: u32,
}

impl BucketHeader {
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        out[0..8].copy_from_slice(&LEVIN_SIGNATURE.to_le_bytes());
        out[8..16].copy_from_slice(&self.body_size.to_le_bytes());
        out[16] = u8::from(self.expect_response);
        out[17..21].copy_from_slice(&self.command.to_le_bytes());
        out[21..25].copy_from_slice(&self.return_code.to_le_bytes());
        out[25..29].copy_from_slice(&self.flags.to_le_bytes());
        out[29..33].copy_from_slice(&self.protocol_version.to_le_bytes());
        out
    }

    pub fn from_bytes(bytes: &[u8; HEADER_SIZE]) -> Result<Self, LevinError> {
        let u32_at = |at: usize| {
            u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
        };
        let u64_at = |at: usize| {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(&bytes[at..at + 8]);
            u64::from_le_bytes(buf)
        };

        if u64_at(0) != LEVIN_SIGNATURE {
            return Err(LevinError::BadSignature);
        }
        let header = Self {
            body_size: u64_at(8),
            expect_response: bytes[16] != 0,
            command: u32_at(17),
            return_code: u32_at(21) as i32,
            flags: u32_at(25),
            protocol_version: u32_at(29),
        };
        if header.protocol_version != LEVIN_PROTOCOL_VERSION {
            return Err(LevinError::UnsupportedVersion(header.protocol_version));
        }
        Ok(header)
    }

    pub fn is_response(&self) -> bool {
        self.flags & LEVIN_PACKET_RESPONSE != 0
    }
}

/// A complete outbound frame
#[derive(Debug, Clone)]
pub struct Bucket {
    pub command: u32,
    header: BucketHeader,
    payload: Vec<u8>,
}

impl Bucket {
    fn build(
        command: u32,
        flags: u32,
        expect_response: bool,
        return_code: i32,
        body: &Section,
    ) -> Result<Self, LevinError> {
        let payload = body.to_bytes()?;
        let header = BucketHeader {
            body_size: payload.len() as u64,
            expect_response,
            command,
            return_code,
            flags,
            protocol_version: LEVIN_PROTOCOL_VERSION,
        };
        Ok(Self {
            command,
            header,
            payload,
        })
    }

    /// A request frame that expects an answer
    pub fn request(command: u32, body: &Section) -> Result<Self, LevinError> {
        Self::build(command, LEVIN_PACKET_REQUEST, true, 0, body)
    }

    /// A successful response frame
    pub fn response(command: u32, body: &Section) -> Result<Self, LevinError> {
        Self::build(command, LEVIN_PACKET_RESPONSE, false, 1, body)
    }

    pub fn header(&self) -> [u8; HEADER_SIZE] {
        self.header.to_bytes()
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Header and payload as one contiguous buffer
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_SIZE + self.payload.len());
        out.extend_from_slice(&self.header());
        out.extend_from_slice(&self.payload);
        out
    }
}
