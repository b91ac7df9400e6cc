//! # Message Codecs
//!
//! Serialization of payload values to and from packet payload byte ranges.
//!
//! The framing layer is codec-agnostic: any [`MessageCodec`] can be plugged
//! into a session. Two implementations ship with the crate:
//! - [`BincodeCodec`]: serde + bincode for typed payloads (default)
//! - [`RawCodec`]: passthrough for payloads that are already raw bytes

use crate::error::{ProtocolError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::Cursor;
use std::marker::PhantomData;

/// Serializes and deserializes one payload type.
///
/// `serialize` writes into the caller-provided output range and reports the
/// number of bytes written; `deserialize` must tolerate an empty input for
/// zero-length payloads.
pub trait MessageCodec: Send + Sync + 'static {
    /// Payloads cross task boundaries and are borrowed across await points
    /// by the send path, so they must be shareable as well as sendable.
    type Payload: Send + Sync + 'static;

    /// Serialize `payload` into `out`, returning the number of bytes written.
    fn serialize(&self, payload: &Self::Payload, out: &mut [u8]) -> Result<usize>;

    /// Deserialize a payload from exactly the given bytes.
    fn deserialize(&self, buf: &[u8]) -> Result<Self::Payload>;
}

/// A decoded header paired with its decoded payload.
///
/// Produced once per successful frame read; ownership passes to the caller.
#[derive(Debug)]
pub struct IncomingMessage<H, P> {
    pub header: H,
    pub payload: P,
}

impl<H, P> IncomingMessage<H, P> {
    pub fn new(header: H, payload: P) -> Self {
        Self { header, payload }
    }
}

/// Bincode-backed codec for any serde payload type.
pub struct BincodeCodec<T> {
    _payload: PhantomData<fn() -> T>,
}

impl<T> BincodeCodec<T> {
    pub fn new() -> Self {
        Self {
            _payload: PhantomData,
        }
    }
}

impl<T> Default for BincodeCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> MessageCodec for BincodeCodec<T>
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    type Payload = T;

    fn serialize(&self, payload: &Self::Payload, out: &mut [u8]) -> Result<usize> {
        let mut cursor = Cursor::new(out);
        bincode::serialize_into(&mut cursor, payload)?;
        Ok(cursor.position() as usize)
    }

    fn deserialize(&self, buf: &[u8]) -> Result<Self::Payload> {
        Ok(bincode::deserialize(buf)?)
    }
}

/// Passthrough codec for raw byte payloads.
///
/// No transformation is performed; the payload bytes on the wire are the
/// payload value.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawCodec;

impl MessageCodec for RawCodec {
    type Payload = Vec<u8>;

    fn serialize(&self, payload: &Self::Payload, out: &mut [u8]) -> Result<usize> {
        if out.len() < payload.len() {
            return Err(ProtocolError::SerializeError(format!(
                "raw payload of {} bytes exceeds output range of {} bytes",
                payload.len(),
                out.len()
            )));
        }

        out[..payload.len()].copy_from_slice(payload);
        Ok(payload.len())
    }

    fn deserialize(&self, buf: &[u8]) -> Result<Self::Payload> {
        Ok(buf.to_vec())
    }
}
