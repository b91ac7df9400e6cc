//! # Server Services
//!
//! Connection lifecycle management for the listening side: accept,
//! admission, registration and cascading shutdown across many concurrent
//! sessions.

pub mod server;

pub use server::{ServerApplication, SessionCreationContext, SessionFactory};
