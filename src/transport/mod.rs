//! # Transport Adapters
//!
//! The framing and session core depends only on the capability interface in
//! this module: byte streams (`AsyncRead`/`AsyncWrite`), a connection-state
//! query and an async graceful close. Each concrete transport (TCP here,
//! WebSocket bridges and the like elsewhere) is a separate adapter satisfying
//! that interface.

pub mod tcp;

use crate::error::Result;
use futures::future::BoxFuture;
use std::sync::atomic::{AtomicBool, Ordering};

/// Connection-state query and graceful close for one transport connection.
///
/// Split from the byte streams so that lifecycle code (send guards, session
/// teardown) can hold it without owning either stream half.
pub trait ConnectionService: Send + Sync + 'static {
    /// Whether the transport currently considers itself connected.
    fn is_connected(&self) -> bool;

    /// Best-effort graceful disconnect. Idempotent-safe: repeated calls may
    /// surface an error but must not corrupt state.
    fn disconnect(&self) -> BoxFuture<'_, Result<()>>;
}

/// Flag-backed [`ConnectionService`] for transports whose actual stream
/// shutdown happens on the write half (and for in-memory test transports).
#[derive(Debug, Default)]
pub struct FlagConnectionService {
    connected: AtomicBool,
}

impl FlagConnectionService {
    pub fn connected() -> Self {
        Self {
            connected: AtomicBool::new(true),
        }
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }
}

impl ConnectionService for FlagConnectionService {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn disconnect(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.connected.store(false, Ordering::SeqCst);
            Ok(())
        })
    }
}
