//! # Core Framing Components
//!
//! Low-level packet framing: header contracts, message codecs, and the
//! streaming frame reader/writer.
//!
//! This module is transport-agnostic. It consumes any `AsyncRead`/`AsyncWrite`
//! byte stream and reconstructs or emits discrete `[header][payload]` frames.
//!
//! ## Components
//! - **Header**: fixed-size prefix declaring the payload length
//! - **Codec**: payload serialization to/from packet byte ranges
//! - **Framing**: the partial-read-tolerant reader and payload-first writer
//!
//! ## Wire Format
//! ```text
//! [Header(fixed)] [Payload(N)]
//! ```
//!
//! ## Security
//! - Payload sizes are validated against the configured maximum before any
//!   allocation, so a hostile header cannot exhaust memory.

pub mod codec;
pub mod framing;
pub mod header;
