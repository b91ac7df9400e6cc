//! # Utility Components
//!
//! Shared infrastructure used across the framing and session layers.
//!
//! ## Components
//! - **Buffer Pool**: pooled packet scratch buffers with a large-object tier

pub mod buffer_pool;
