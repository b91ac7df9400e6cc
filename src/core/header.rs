//! # Packet Headers
//!
//! Contracts for the fixed-size prefix that declares each frame's payload
//! length, plus the default 4-byte big-endian length-prefix implementation.
//!
//! The framing layer trusts the header codec completely: the byte counts it
//! reports drive exactly how much of the stream is consumed, never buffer
//! lengths or whatever the payload codec happens to read.
//!
//! ## Wire Format (default codec)
//! ```text
//! [PayloadLength(4, big-endian)] [Payload(N)]
//! ```

use crate::error::{ProtocolError, Result};

/// A decoded packet header.
///
/// Opaque to the framing layer beyond the two size queries. `total_size`
/// equals the header's own byte count exactly when the payload is empty.
pub trait PacketHeader: Send + Sync + 'static {
    /// Number of payload bytes following the header.
    fn payload_size(&self) -> usize;

    /// Total packet size: header bytes plus payload bytes.
    fn total_size(&self) -> usize;
}

/// Encodes and decodes packet headers from raw bytes.
///
/// Implementations must report byte counts that can be trusted as the EXACT
/// amount of wire data the header occupies.
pub trait HeaderCodec: Send + Sync + 'static {
    type Header: PacketHeader;

    /// Whether a complete header can be decoded from the available bytes.
    fn is_header_readable(&self, buf: &[u8]) -> bool;

    /// The exact number of bytes the header at the start of `buf` occupies.
    fn header_size(&self, buf: &[u8]) -> usize;

    /// Decode the header from exactly `header_size` leading bytes.
    fn decode(&self, buf: &[u8]) -> Result<Self::Header>;

    /// Encode a header declaring `payload_size` payload bytes into `out`.
    /// Returns the number of header bytes written.
    fn encode(&self, payload_size: usize, out: &mut [u8]) -> Result<usize>;
}

/// Header produced by [`LengthPrefixCodec`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LengthPrefixHeader {
    payload_size: u32,
}

impl LengthPrefixHeader {
    pub fn new(payload_size: u32) -> Self {
        Self { payload_size }
    }
}

impl PacketHeader for LengthPrefixHeader {
    fn payload_size(&self) -> usize {
        self.payload_size as usize
    }

    fn total_size(&self) -> usize {
        LengthPrefixCodec::HEADER_SIZE + self.payload_size as usize
    }
}

/// Default header codec: a fixed 4-byte big-endian payload length prefix.
#[derive(Debug, Clone, Copy, Default)]
pub struct LengthPrefixCodec;

impl LengthPrefixCodec {
    pub const HEADER_SIZE: usize = 4;
}

impl HeaderCodec for LengthPrefixCodec {
    type Header = LengthPrefixHeader;

    fn is_header_readable(&self, buf: &[u8]) -> bool {
        buf.len() >= Self::HEADER_SIZE
    }

    fn header_size(&self, _buf: &[u8]) -> usize {
        Self::HEADER_SIZE
    }

    fn decode(&self, buf: &[u8]) -> Result<Self::Header> {
        if buf.len() < Self::HEADER_SIZE {
            return Err(ProtocolError::InvalidHeader);
        }

        let mut raw = [0u8; Self::HEADER_SIZE];
        raw.copy_from_slice(&buf[..Self::HEADER_SIZE]);
        Ok(LengthPrefixHeader::new(u32::from_be_bytes(raw)))
    }

    fn encode(&self, payload_size: usize, out: &mut [u8]) -> Result<usize> {
        let size = u32::try_from(payload_size)
            .map_err(|_| ProtocolError::OversizedPacket(payload_size))?;

        if out.len() < Self::HEADER_SIZE {
            return Err(ProtocolError::InvalidHeader);
        }

        out[..Self::HEADER_SIZE].copy_from_slice(&size.to_be_bytes());
        Ok(Self::HEADER_SIZE)
    }
}
