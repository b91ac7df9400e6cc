//! # Server Application
//!
//! Accept loop, admission control, connection-id allocation, session
//! registry and cascading shutdown for a TCP-bound server.
//!
//! State machine: `Stopped → Listening → (per connection: Accepting →
//! Admitting → SessionActive → SessionEnded) → Stopped` on the shutdown
//! token.
//!
//! Error containment: everything that goes wrong while handling one
//! accepted connection (admission panic, factory failure) is logged and
//! confined to that connection; the accept loop keeps running. Only failing
//! to bind the listening endpoint is fatal.

use crate::config::ServerConfig;
use crate::core::codec::MessageCodec;
use crate::core::header::HeaderCodec;
use crate::error::{ProtocolError, Result};
use crate::session::details::SessionDetails;
use crate::session::managed::{ManagedSession, SessionHandle};
use crate::session::starter::drive;
use crate::transport::tcp::bind_listener;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Everything a factory needs to build one session: the accepted transport
/// and the identity the server assigned to it.
pub struct SessionCreationContext {
    pub stream: TcpStream,
    pub details: SessionDetails,
}

/// Builds sessions for accepted connections and decides admission.
///
/// `create` must produce a valid session; returning an error disposes the
/// accepted transport and affects only that connection attempt.
pub trait SessionFactory: Send + Sync + 'static {
    type Headers: HeaderCodec;
    type Messages: MessageCodec;

    /// Admission hook: return `true` to handle the client, `false` to
    /// reject. Rejection closes the transport without allocating a session
    /// or consuming a connection id. A panic here counts as rejection.
    fn is_client_acceptable(&self, _stream: &TcpStream) -> bool {
        true
    }

    /// Produce the managed session for an admitted connection.
    fn create(
        &self,
        context: SessionCreationContext,
    ) -> Result<ManagedSession<Self::Headers, Self::Messages>>;
}

type PayloadOf<F> = <<F as SessionFactory>::Messages as MessageCodec>::Payload;
type Registry<F> = Arc<RwLock<HashMap<u64, SessionHandle<PayloadOf<F>>>>>;

/// Callback fired once per ended session, before registry removal.
pub type SessionEndedHandler = dyn Fn(&SessionDetails) + Send + Sync;

/// TCP server application: accepts connections, builds sessions through the
/// factory and manages their lifecycle to completion.
pub struct ServerApplication<F: SessionFactory> {
    config: ServerConfig,
    factory: Arc<F>,
    sessions: Registry<F>,
    lifetime_connection_count: Arc<AtomicU64>,
    shutdown: CancellationToken,
    on_session_ended: Option<Arc<SessionEndedHandler>>,
}

impl<F: SessionFactory> ServerApplication<F> {
    pub fn new(config: ServerConfig, factory: F) -> Self {
        Self {
            config,
            factory: Arc::new(factory),
            sessions: Arc::new(RwLock::new(HashMap::new())),
            lifetime_connection_count: Arc::new(AtomicU64::new(0)),
            shutdown: CancellationToken::new(),
            on_session_ended: None,
        }
    }

    /// Register a callback fired exactly once per ended session, before the
    /// session is removed from the registry. A panicking callback is
    /// contained and cannot stop teardown.
    pub fn on_session_ended<H>(mut self, handler: H) -> Self
    where
        H: Fn(&SessionDetails) + Send + Sync + 'static,
    {
        self.on_session_ended = Some(Arc::new(handler));
        self
    }

    /// The server-wide shutdown token. Cancelling it stops the accept loop
    /// and cascades into every active session's cancellation hierarchy.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Request cascading shutdown.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Number of admitted connections serviced over the server's lifetime.
    pub fn lifetime_connection_count(&self) -> u64 {
        self.lifetime_connection_count.load(Ordering::SeqCst)
    }

    /// Number of currently registered sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.read().map(|s| s.len()).unwrap_or(0)
    }

    /// Look up a live session's sending handle by connection id.
    pub fn session_handle(&self, connection_id: u64) -> Option<SessionHandle<PayloadOf<F>>> {
        self.sessions
            .read()
            .ok()
            .and_then(|sessions| sessions.get(&connection_id).cloned())
    }

    /// Bind the configured endpoint and serve until shutdown.
    pub async fn listen(&self) -> Result<()> {
        let errors = self.config.validate();
        if !errors.is_empty() {
            return Err(ProtocolError::ConfigError(errors.join("; ")));
        }

        let listener = bind_listener(self.config.bind_address, self.config.backlog)?;
        self.serve(listener).await
    }

    /// Serve connections from an already-bound listener until shutdown.
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        if let Ok(addr) = listener.local_addr() {
            info!(address = %addr, "Server begin listening");
        }

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!("Shutdown requested; accept loop stopping");
                    return Ok(());
                }

                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => self.handle_accepted(stream, peer),
                    Err(e) => {
                        error!(error = %e, "Error accepting connection");
                    }
                },
            }
        }
    }

    /// Admission, id allocation, session creation, registration and task
    /// start for one accepted transport. Never propagates failure.
    fn handle_accepted(&self, stream: TcpStream, peer: SocketAddr) {
        // Admission runs user code; a panic is a rejection, not a server
        // fault.
        let factory = &self.factory;
        let acceptable = catch_unwind(AssertUnwindSafe(|| factory.is_client_acceptable(&stream)))
            .unwrap_or_else(|_| {
                error!(peer = %peer, "Admission hook panicked; rejecting connection");
                false
            });

        if !acceptable {
            debug!(peer = %peer, "Connection rejected by admission hook");
            drop(stream);
            return;
        }

        // Ids are allocated strictly post-admission; rejected transports
        // observe no increment.
        let connection_id = self.lifetime_connection_count.fetch_add(1, Ordering::SeqCst) + 1;
        let details = SessionDetails::new(connection_id, peer);

        info!(
            connection_id,
            peer = %peer,
            "Attempting to create session"
        );

        let context = SessionCreationContext {
            stream,
            details: details.clone(),
        };
        let created = catch_unwind(AssertUnwindSafe(|| factory.create(context)))
            .unwrap_or_else(|_| Err(ProtocolError::SessionCreation("factory panicked".into())));

        let session = match created {
            Ok(session) => session,
            Err(e) => {
                // Dropping the context released the transport; contained to
                // this connection attempt.
                error!(connection_id, error = %e, "Failed to create session");
                return;
            }
        };

        // Register before the read/write tasks start so lookups by
        // connection id are valid immediately.
        if let Ok(mut sessions) = self.sessions.write() {
            sessions.insert(connection_id, session.handle());
        }

        let sessions = self.sessions.clone();
        let shutdown = self.shutdown.clone();
        let on_ended = self.on_session_ended.clone();

        tokio::spawn(async move {
            let details = drive(session, &shutdown).await;

            // End-of-session notification fires exactly once, before
            // removal; a panicking subscriber must not stop teardown.
            if let Some(handler) = on_ended {
                let outcome = catch_unwind(AssertUnwindSafe(|| handler(&details)));
                if outcome.is_err() {
                    error!(
                        connection_id = details.connection_id,
                        "Session-ended handler panicked"
                    );
                }
            }

            if let Ok(mut sessions) = sessions.write() {
                if sessions.remove(&details.connection_id).is_none() {
                    warn!(
                        connection_id = details.connection_id,
                        "Session was already removed from registry"
                    );
                }
            }

            debug!(
                connection_id = details.connection_id,
                "Session torn down and unregistered"
            );
        });
    }
}
