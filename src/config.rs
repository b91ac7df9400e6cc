//! # Configuration Management
//!
//! Centralized configuration for the session framework.
//!
//! This module provides structured configuration for servers and sessions,
//! including packet size bounds, queue capacities, and listener tuning.
//!
//! ## Configuration Sources
//! - Direct instantiation with defaults
//! - `default_with_overrides()` for targeted adjustments
//!
//! There is deliberately no file/CLI loading surface here; embedders own that.
//!
//! ## Security Considerations
//! - `max_payload_size` bounds allocation per frame (prevents memory exhaustion)
//! - The listen backlog default absorbs bursty connect storms without
//!   unbounded kernel queueing

use crate::utils::buffer_pool::BufferPool;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

/// Default fixed packet header size in bytes (a 4-byte length prefix).
pub const DEFAULT_HEADER_SIZE: usize = 4;

/// Max allowed payload size (16 MB)
pub const DEFAULT_MAX_PAYLOAD_SIZE: usize = 16 * 1024 * 1024;

/// Packet buffers at or above this size come from the large-object pool.
pub const LARGE_BUFFER_THRESHOLD: usize = 1024 * 1024;

/// Default maximum depth of the kernel accept queue.
pub const DEFAULT_LISTEN_BACKLOG: u32 = 1000;

/// Default capacity of a session's outgoing message queue.
pub const DEFAULT_OUTGOING_QUEUE_CAPACITY: usize = 256;

/// Default capacity of a session's inbound message channel.
pub const DEFAULT_INBOUND_QUEUE_CAPACITY: usize = 256;

/// Immutable per-connection packet size bounds.
///
/// Shared read-only across every session built from it. The header size
/// bounds describe the wire protocol's fixed-length prefix; only
/// `min_header_size == max_header_size` is currently supported, variable
/// length headers are a known gap.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConnectionOptions {
    /// Minimum required size of a packet header.
    pub min_header_size: usize,

    /// Maximum size of a packet header.
    pub max_header_size: usize,

    /// Maximum packet payload size.
    pub max_payload_size: usize,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            min_header_size: DEFAULT_HEADER_SIZE,
            max_header_size: DEFAULT_HEADER_SIZE,
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
        }
    }
}

impl ConnectionOptions {
    pub fn new(min_header_size: usize, max_header_size: usize, max_payload_size: usize) -> Self {
        Self {
            min_header_size,
            max_header_size,
            max_payload_size,
        }
    }

    /// The configured maximum total packet size (header + payload).
    pub fn max_packet_size(&self) -> usize {
        self.max_header_size + self.max_payload_size
    }

    /// Selects the buffer pool to rent packet buffers from.
    ///
    /// Packets at or above [`LARGE_BUFFER_THRESHOLD`] use the shared
    /// large-object pool, everything else the general pool.
    pub fn packet_buffer_pool(&self) -> BufferPool {
        if self.max_packet_size() >= LARGE_BUFFER_THRESHOLD {
            BufferPool::shared_large().clone()
        } else {
            BufferPool::shared().clone()
        }
    }

    /// Validate the options for common misconfigurations.
    ///
    /// Returns a list of validation errors. Empty list means the options are valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.min_header_size == 0 {
            errors.push("min_header_size must be non-zero".to_string());
        }

        if self.min_header_size > self.max_header_size {
            errors.push(format!(
                "min_header_size ({}) exceeds max_header_size ({})",
                self.min_header_size, self.max_header_size
            ));
        }

        if self.min_header_size != self.max_header_size {
            errors.push(
                "variable-length headers (min_header_size != max_header_size) are not supported"
                    .to_string(),
            );
        }

        if self.max_payload_size == 0 {
            errors.push("max_payload_size must be non-zero".to_string());
        }

        errors
    }
}

/// Server-side configuration: listen endpoint, backlog and queue capacities.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Address the server binds and listens on.
    pub bind_address: SocketAddr,

    /// Maximum depth of the kernel accept queue.
    #[serde(default = "default_backlog")]
    pub backlog: u32,

    /// Capacity of each session's outgoing message queue.
    #[serde(default = "default_outgoing_capacity")]
    pub outgoing_queue_capacity: usize,

    /// Capacity of each session's inbound message channel.
    #[serde(default = "default_inbound_capacity")]
    pub inbound_queue_capacity: usize,

    /// Packet size bounds applied to every accepted connection.
    #[serde(default)]
    pub connection: ConnectionOptions,
}

fn default_backlog() -> u32 {
    DEFAULT_LISTEN_BACKLOG
}

fn default_outgoing_capacity() -> usize {
    DEFAULT_OUTGOING_QUEUE_CAPACITY
}

fn default_inbound_capacity() -> usize {
    DEFAULT_INBOUND_QUEUE_CAPACITY
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0),
            backlog: DEFAULT_LISTEN_BACKLOG,
            outgoing_queue_capacity: DEFAULT_OUTGOING_QUEUE_CAPACITY,
            inbound_queue_capacity: DEFAULT_INBOUND_QUEUE_CAPACITY,
            connection: ConnectionOptions::default(),
        }
    }
}

impl ServerConfig {
    /// Apply overrides to the default configuration
    pub fn default_with_overrides<F>(mutator: F) -> Self
    where
        F: FnOnce(&mut Self),
    {
        let mut config = Self::default();
        mutator(&mut config);
        config
    }

    /// Validate the configuration for common issues and misconfigurations.
    ///
    /// Returns a list of validation errors. Empty list means configuration is valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = self.connection.validate();

        if self.backlog == 0 {
            errors.push("backlog must be non-zero".to_string());
        }

        if self.outgoing_queue_capacity == 0 {
            errors.push("outgoing_queue_capacity must be non-zero".to_string());
        }

        if self.inbound_queue_capacity == 0 {
            errors.push("inbound_queue_capacity must be non-zero".to_string());
        }

        errors
    }
}
