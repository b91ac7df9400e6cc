//! # TCP Transport Adapter
//!
//! Binds the framing/session core to `tokio::net::TcpStream`. Provides
//! split stream halves, a [`ConnectionService`] adapter and listener setup
//! with a configurable accept backlog.
//!
//! TCP offers exactly one delivery contract, so the adapter maps
//! [`crate::session::DeliveryMethod::ReliableOrdered`] and rejects every
//! other method via [`crate::session::StreamDeliveryMapper`].

use crate::error::{ProtocolError, Result};
use crate::transport::ConnectionService;
use futures::future::BoxFuture;
use socket2::{Domain, Protocol, Socket, Type};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tracing::debug;

/// One accepted or established TCP connection, split for the session's
/// independent read and write paths.
pub struct TcpConnection {
    pub read_half: OwnedReadHalf,
    pub write_half: OwnedWriteHalf,
    pub service: Arc<TcpConnectionService>,
}

impl TcpConnection {
    /// Split `stream` into session-ready halves plus a state service.
    pub fn from_stream(stream: TcpStream) -> Self {
        let peer = stream.peer_addr().ok();
        let (read_half, write_half) = stream.into_split();
        Self {
            read_half,
            write_half,
            service: Arc::new(TcpConnectionService {
                connected: AtomicBool::new(true),
                peer,
            }),
        }
    }

    /// Connect to a remote endpoint (client side).
    pub async fn connect(addr: SocketAddr) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        Ok(Self::from_stream(stream))
    }
}

/// Connection state for one TCP session.
///
/// The FIN itself is sent by shutting down the write half, which the
/// session's teardown does through its packet sink; this service tracks the
/// logical state that send guards consult.
#[derive(Debug)]
pub struct TcpConnectionService {
    connected: AtomicBool,
    peer: Option<SocketAddr>,
}

impl TcpConnectionService {
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }

    pub(crate) fn mark_disconnected(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }
}

impl ConnectionService for TcpConnectionService {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn disconnect(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.mark_disconnected();
            debug!(peer = ?self.peer, "TCP connection marked disconnected");
            Ok(())
        })
    }
}

/// Bind a listener with an explicit accept-queue depth.
///
/// Failure here is fatal to server startup, unlike any per-connection error.
pub fn bind_listener(addr: SocketAddr, backlog: u32) -> Result<TcpListener> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))
        .map_err(ProtocolError::Bind)?;

    socket.set_reuse_address(true).map_err(ProtocolError::Bind)?;
    socket.set_nodelay(true).map_err(ProtocolError::Bind)?;
    socket.bind(&addr.into()).map_err(ProtocolError::Bind)?;
    socket
        .listen(backlog.min(i32::MAX as u32) as i32)
        .map_err(ProtocolError::Bind)?;
    socket.set_nonblocking(true).map_err(ProtocolError::Bind)?;

    TcpListener::from_std(socket.into()).map_err(ProtocolError::Bind)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bind_and_connect() {
        let listener = bind_listener("127.0.0.1:0".parse().unwrap(), 16).unwrap();
        let addr = listener.local_addr().unwrap();

        let accept = tokio::spawn(async move { listener.accept().await.unwrap() });
        let connection = TcpConnection::connect(addr).await.unwrap();
        accept.await.unwrap();

        assert!(connection.service.is_connected());
        connection.service.disconnect().await.unwrap();
        assert!(!connection.service.is_connected());
    }

    #[tokio::test]
    async fn bind_failure_is_reported() {
        let listener = bind_listener("127.0.0.1:0".parse().unwrap(), 16).unwrap();
        let addr = listener.local_addr().unwrap();

        // Second bind to the same port without SO_REUSEPORT fails.
        let err = match bind_listener(addr, 16) {
            Err(e) => e,
            Ok(_) => return, // platform allowed rebind; nothing to assert
        };
        assert!(matches!(err, ProtocolError::Bind(_)));
    }
}
