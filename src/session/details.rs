//! # Session Data Model
//!
//! Identity, send outcomes and delivery contracts for managed sessions.

use crate::error::{ProtocolError, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// Identity of one managed session.
///
/// The connection id is process-unique and monotonically increasing,
/// assigned by the server at accept time and never reused, even after
/// disconnect. Immutable for the session's lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDetails {
    /// Server-assigned connection id.
    pub connection_id: u64,

    /// Remote address of the connected peer.
    pub remote_address: SocketAddr,
}

impl SessionDetails {
    pub fn new(connection_id: u64, remote_address: SocketAddr) -> Self {
        Self {
            connection_id,
            remote_address,
        }
    }
}

impl std::fmt::Display for SessionDetails {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Session {} ({})", self.connection_id, self.remote_address)
    }
}

/// Outcome of one send attempt.
///
/// Exactly one value is returned per attempt; ordinary transport-level
/// failure never surfaces as an error to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SendResult {
    /// The transport was never connected or is known-closed.
    FailedNotConnected,
    /// The message was serialized and flushed to the transport.
    Sent,
    /// The message was handed to the outgoing queue for the writer task.
    Queued,
    /// The outgoing queue was full; the message was not enqueued.
    Dropped,
    /// The connection went away before or during the attempt.
    Disconnected,
    /// An I/O fault occurred while sending.
    Error,
}

impl SendResult {
    /// Whether the message is on its way (sent or queued for the writer).
    pub fn is_delivered(&self) -> bool {
        matches!(self, SendResult::Sent | SendResult::Queued)
    }
}

/// Reliability/ordering contract requested for an outgoing message.
///
/// A protocol-level concept: each transport binding maps these onto its own
/// delivery primitives. The mapping must be bijective for the subset the
/// transport supports and must reject, never silently downgrade, anything
/// else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeliveryMethod {
    /// No delivery or ordering guarantee; duplicates may be delivered.
    UnreliableAcceptDuplicate,
    /// No delivery guarantee; packets older than the newest seen are dropped.
    UnreliableDiscardStale,
    /// Guaranteed delivery without ordering.
    ReliableUnordered,
    /// Guaranteed delivery; stale packets are discarded on arrival.
    ReliableDiscardStale,
    /// Guaranteed delivery in send order.
    ReliableOrdered,
}

/// Per-transport mapping of [`DeliveryMethod`] onto native primitives.
pub trait DeliveryMethodMapper: Send + Sync + 'static {
    /// Validate that the transport can honor `method`.
    ///
    /// Returns [`ProtocolError::UnsupportedDeliveryMethod`] for anything the
    /// transport cannot express exactly.
    fn resolve(&self, method: DeliveryMethod) -> Result<()>;
}

/// Mapper for strictly ordered, reliable byte-stream transports (TCP and
/// equivalents): only [`DeliveryMethod::ReliableOrdered`] maps.
#[derive(Debug, Clone, Copy, Default)]
pub struct StreamDeliveryMapper;

impl DeliveryMethodMapper for StreamDeliveryMapper {
    fn resolve(&self, method: DeliveryMethod) -> Result<()> {
        match method {
            DeliveryMethod::ReliableOrdered => Ok(()),
            other => Err(ProtocolError::UnsupportedDeliveryMethod(other)),
        }
    }
}
