//! # Session Orchestration
//!
//! The dual-loop-with-joint-cancellation primitive shared by the server's
//! per-connection handling and the client-side [`SessionStarter`].
//!
//! One orchestrator call per session: start the read and write tasks, await
//! whichever finishes first, cancel the sibling, attempt a graceful
//! disconnect, join both tasks (a cancelled task is still awaited, never
//! abandoned), and hand the terminated session's details back exactly once.
//!
//! Cancellation is a structured hierarchy: the caller's shutdown token is
//! the parent, each session derives a child, and each direction derives a
//! further child from that. Cancelling the parent cancels every session;
//! one direction finishing cancels its sibling only through the explicit
//! joint-termination rule, never by poisoning a shared token upward.

use crate::core::codec::MessageCodec;
use crate::core::header::HeaderCodec;
use crate::error::Result;
use crate::session::details::SessionDetails;
use crate::session::managed::{read_loop, write_loop, BoxedWriter, ManagedSession};
use crate::session::sink::PacketSink;
use crate::transport::ConnectionService;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

/// Upper bound on the graceful output-stream shutdown during teardown.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Run one session to termination. Returns the session's details after both
/// loops have fully finished and the transport has been asked to close.
pub(crate) async fn drive<H, C>(
    session: ManagedSession<H, C>,
    shutdown: &CancellationToken,
) -> SessionDetails
where
    H: HeaderCodec,
    C: MessageCodec,
{
    let ManagedSession {
        details,
        reader,
        sink,
        outgoing_rx,
        inbound_tx,
        connection,
        ..
    } = session;

    // Composed, not shared: per-session cancellation never affects siblings,
    // per-direction cancellation never routes back up.
    let session_cancel = shutdown.child_token();
    let read_cancel = session_cancel.child_token();
    let write_cancel = session_cancel.child_token();

    let mut read_task = tokio::spawn(read_loop(reader, inbound_tx, read_cancel, details.clone()));
    let mut write_task = tokio::spawn(write_loop(
        outgoing_rx,
        sink.clone(),
        write_cancel,
        details.clone(),
    ));

    // Joint termination: the moment either loop finishes, cancel the other,
    // then wait for it to fully finish.
    tokio::select! {
        finished = &mut read_task => {
            log_loop_exit(&details, "read", finished);
            session_cancel.cancel();
            graceful_disconnect(&details, &sink, &connection).await;
            log_loop_exit(&details, "write", (&mut write_task).await);
        }
        finished = &mut write_task => {
            log_loop_exit(&details, "write", finished);
            session_cancel.cancel();
            graceful_disconnect(&details, &sink, &connection).await;
            log_loop_exit(&details, "read", (&mut read_task).await);
        }
    }

    debug!(
        connection_id = details.connection_id,
        "Session stopped network read/write"
    );

    details
}

/// Best-effort transport close; failure is logged and never interrupts the
/// rest of teardown.
async fn graceful_disconnect<H, C>(
    details: &SessionDetails,
    sink: &PacketSink<BoxedWriter, H, C>,
    connection: &Arc<dyn ConnectionService>,
) where
    H: HeaderCodec,
    C: MessageCodec,
{
    // Bounded: a transport that stalls the shutdown must not block teardown.
    match tokio::time::timeout(CLOSE_TIMEOUT, sink.close()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(
            connection_id = details.connection_id,
            error = %e,
            "Session was open but failed to shut down its output stream"
        ),
        Err(_) => error!(
            connection_id = details.connection_id,
            "Timed out shutting down session output stream"
        ),
    }

    if let Err(e) = connection.disconnect().await {
        error!(
            connection_id = details.connection_id,
            error = %e,
            "Session was open but failed to disconnect"
        );
    }
}

fn log_loop_exit(
    details: &SessionDetails,
    direction: &str,
    finished: std::result::Result<Result<()>, JoinError>,
) {
    match finished {
        Ok(Ok(())) => debug!(
            connection_id = details.connection_id,
            direction, "Network loop finished"
        ),
        Ok(Err(e)) => error!(
            connection_id = details.connection_id,
            direction,
            error = %e,
            "Session encountered error in network loop"
        ),
        Err(join_error) => error!(
            connection_id = details.connection_id,
            direction,
            error = %join_error,
            "Network loop task failed to join"
        ),
    }
}

/// Client-side session orchestration.
///
/// Same joint-cancellation pattern as the server's per-session handling but
/// without a registry: one session, started fire-and-forget or awaited.
/// Provided so client code does not reimplement the cancellation
/// composition.
#[derive(Default)]
pub struct SessionStarter {
    on_ended: Option<Box<dyn Fn(&SessionDetails) + Send + Sync>>,
}

impl SessionStarter {
    pub fn new() -> Self {
        Self { on_ended: None }
    }

    /// Register a callback fired exactly once when the session ends.
    ///
    /// A panicking callback is contained; it cannot stop resource release.
    pub fn on_session_ended<F>(mut self, callback: F) -> Self
    where
        F: Fn(&SessionDetails) + Send + Sync + 'static,
    {
        self.on_ended = Some(Box::new(callback));
        self
    }

    /// Run the session to termination, returning its details.
    pub async fn start<H, C>(
        &self,
        session: ManagedSession<H, C>,
        shutdown: CancellationToken,
    ) -> SessionDetails
    where
        H: HeaderCodec,
        C: MessageCodec,
    {
        let details = drive(session, &shutdown).await;

        if let Some(callback) = &self.on_ended {
            let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                callback(&details)
            }));
            if outcome.is_err() {
                error!(
                    connection_id = details.connection_id,
                    "Session-ended callback panicked"
                );
            }
        }

        details
    }

    /// Fire-and-forget variant of [`SessionStarter::start`].
    pub fn start_detached<H, C>(
        self,
        session: ManagedSession<H, C>,
        shutdown: CancellationToken,
    ) -> tokio::task::JoinHandle<SessionDetails>
    where
        H: HeaderCodec,
        C: MessageCodec,
    {
        tokio::spawn(async move { self.start(session, shutdown).await })
    }
}
