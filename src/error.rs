//! # Error Types
//!
//! Comprehensive error handling for the session framework.
//!
//! This module defines all error variants that can occur during framing and
//! session operations, from low-level I/O errors to protocol violations.
//!
//! ## Error Categories
//! - **I/O Errors**: Transport read/write/flush failures
//! - **Framing Errors**: Truncated frames, oversized packets, bad headers
//! - **Serialization Errors**: Payload encode/decode failures
//! - **Lifecycle Errors**: Session creation and server startup failures
//!
//! All errors implement `std::error::Error` for interoperability.
//!
//! Errors in a single session's read or write loop are contained to that
//! session; errors handling one accepted connection are contained to that
//! connection. Only [`ProtocolError::Bind`] is fatal to a server as a whole.

use std::io;
use thiserror::Error;

/// Primary error type for all framing and session operations.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("Serialize error: {0}")]
    SerializeError(String),

    #[error("Deserialize error: {0}")]
    DeserializeError(String),

    #[error("Transport error: {0}")]
    TransportError(String),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Invalid packet header")]
    InvalidHeader,

    #[error("Stream ended with incomplete frame: needed {expected} payload bytes, got {available}")]
    TruncatedFrame { expected: usize, available: usize },

    #[error("Packet too large: {0} bytes")]
    OversizedPacket(usize),

    #[error("Variable-length packet headers are not supported: codec wrote {actual} bytes, expected {expected}")]
    UnsupportedHeaderSize { expected: usize, actual: usize },

    #[error("Delivery method {0:?} is not supported by this transport")]
    UnsupportedDeliveryMethod(crate::session::DeliveryMethod),

    #[error("Session creation failed: {0}")]
    SessionCreation(String),

    #[error("Failed to bind listener: {0}")]
    Bind(io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Custom error: {0}")]
    Custom(String),
}

/// Type alias for Results using ProtocolError
pub type Result<T> = std::result::Result<T, ProtocolError>;
