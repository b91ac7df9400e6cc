//! # Managed Session
//!
//! Owns one connection's full lifecycle: the framing read loop, the queue
//! draining write loop, and the send surface exposed to application code.
//!
//! State machine per connection:
//! `Created → Running (read + write tasks) → Draining (one side finished,
//! sibling being cancelled) → Terminated`.
//!
//! Orchestration of the two loops (joint termination, teardown ordering)
//! lives in [`crate::session::starter`]; this module provides the pieces the
//! orchestrator drives.

use crate::config::ConnectionOptions;
use crate::core::codec::{IncomingMessage, MessageCodec};
use crate::core::framing::{FrameReader, FrameWriter, ReadStrategy, WriteStrategy};
use crate::core::header::HeaderCodec;
use crate::error::Result;
use crate::session::details::{DeliveryMethod, DeliveryMethodMapper, SendResult, SessionDetails, StreamDeliveryMapper};
use crate::session::queue::{outgoing_queue, MessageQueue, MessageQueueReceiver};
use crate::session::sink::PacketSink;
use crate::transport::ConnectionService;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

/// Type-erased read half of a session's transport.
pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// Type-erased write half of a session's transport.
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Cloneable sending surface of a live session.
///
/// This is what the server registry stores and what application code keeps
/// to push messages to a connection.
pub struct SessionHandle<P> {
    outgoing: MessageQueue<P>,
    connection: Arc<dyn ConnectionService>,
    details: SessionDetails,
    delivery: Arc<dyn DeliveryMethodMapper>,
}

impl<P> Clone for SessionHandle<P> {
    fn clone(&self) -> Self {
        Self {
            outgoing: self.outgoing.clone(),
            connection: self.connection.clone(),
            details: self.details.clone(),
            delivery: self.delivery.clone(),
        }
    }
}

impl<P> SessionHandle<P> {
    /// Enqueue a message for delivery with the transport's default contract
    /// ([`DeliveryMethod::ReliableOrdered`]).
    ///
    /// Never blocks and never fails with an error: the outcome is the
    /// returned [`SendResult`].
    pub fn send(&self, payload: P) -> SendResult {
        if !self.connection.is_connected() {
            return SendResult::FailedNotConnected;
        }

        self.outgoing.enqueue(payload)
    }

    /// Enqueue a message with an explicit delivery contract.
    ///
    /// Methods the transport cannot honor are rejected loudly, never
    /// silently downgraded.
    pub fn send_with(&self, payload: P, method: DeliveryMethod) -> SendResult {
        if let Err(e) = self.delivery.resolve(method) {
            error!(
                connection_id = self.details.connection_id,
                error = %e,
                "Rejected send with unsupported delivery method"
            );
            return SendResult::Error;
        }

        self.send(payload)
    }

    pub fn details(&self) -> &SessionDetails {
        &self.details
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }
}

/// One connection's read loop, write loop and teardown unit.
///
/// Built by a session factory, registered with a server (or handed to the
/// client-side [`crate::session::SessionStarter`]) and then consumed by the
/// orchestrator that runs its two tasks.
pub struct ManagedSession<H: HeaderCodec, C: MessageCodec> {
    pub(crate) details: SessionDetails,
    pub(crate) reader: FrameReader<BoxedReader, H, C>,
    pub(crate) sink: Arc<PacketSink<BoxedWriter, H, C>>,
    pub(crate) outgoing_rx: MessageQueueReceiver<C::Payload>,
    pub(crate) inbound_tx: mpsc::Sender<IncomingMessage<H::Header, C::Payload>>,
    pub(crate) connection: Arc<dyn ConnectionService>,
    pub(crate) handle: SessionHandle<C::Payload>,
}

impl<H, C> ManagedSession<H, C>
where
    H: HeaderCodec,
    C: MessageCodec,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        options: Arc<ConnectionOptions>,
        details: SessionDetails,
        read_half: BoxedReader,
        write_half: BoxedWriter,
        connection: Arc<dyn ConnectionService>,
        headers: Arc<H>,
        messages: Arc<C>,
        inbound_tx: mpsc::Sender<IncomingMessage<H::Header, C::Payload>>,
        queue_capacity: usize,
    ) -> Self {
        let reader = FrameReader::new(read_half, options.clone(), headers.clone(), messages.clone());
        let writer = FrameWriter::new(write_half, options, headers, messages);
        let sink = Arc::new(PacketSink::new(writer, connection.clone()));

        let (outgoing, outgoing_rx) = outgoing_queue(queue_capacity);
        let handle = SessionHandle {
            outgoing,
            connection: connection.clone(),
            details: details.clone(),
            delivery: Arc::new(StreamDeliveryMapper),
        };

        Self {
            details,
            reader,
            sink,
            outgoing_rx,
            inbound_tx,
            connection,
            handle,
        }
    }

    /// Replace the delivery-method mapper (defaults to the stream mapper).
    pub fn with_delivery_mapper(mut self, mapper: Arc<dyn DeliveryMethodMapper>) -> Self {
        self.handle.delivery = mapper;
        self
    }

    /// Inject read-path strategy overrides (block protocols and the like).
    pub fn with_read_strategy(mut self, strategy: ReadStrategy<H::Header>) -> Self {
        self.reader = self.reader.with_strategy(strategy);
        self
    }

    /// Inject write-path strategy overrides. Must be called before the
    /// session starts; once the writer task holds the sink lock the strategy
    /// is fixed.
    pub fn with_write_strategy(self, strategy: WriteStrategy) -> Self {
        let applied = self.sink.set_write_strategy(strategy);
        debug_assert!(applied, "write strategy must be set before the session starts");
        if !applied {
            error!(
                connection_id = self.details.connection_id,
                "Write strategy not applied; sink lock already held"
            );
        }
        self
    }

    pub fn details(&self) -> &SessionDetails {
        &self.details
    }

    /// A cloneable sending handle for this session.
    pub fn handle(&self) -> SessionHandle<C::Payload> {
        self.handle.clone()
    }

    /// The mutex-serialized direct send path (bypasses the queue, returns
    /// [`SendResult::Sent`] on success).
    pub fn sink(&self) -> Arc<PacketSink<BoxedWriter, H, C>> {
        self.sink.clone()
    }
}

/// Run the framing reader until end-of-stream, cancellation or a fatal
/// decode error, delivering each frame to the session's consumer channel.
pub(crate) async fn read_loop<H, C>(
    mut reader: FrameReader<BoxedReader, H, C>,
    inbound: mpsc::Sender<IncomingMessage<H::Header, C::Payload>>,
    cancel: CancellationToken,
    details: SessionDetails,
) -> Result<()>
where
    H: HeaderCodec,
    C: MessageCodec,
{
    loop {
        match reader.read_message(&cancel).await? {
            Some(message) => {
                // A full inbound channel must not pin the task past
                // cancellation; the session is ending, the frame is not.
                let delivered = tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!(
                            connection_id = details.connection_id,
                            "Cancelled while delivering inbound frame; stopping read loop"
                        );
                        return Ok(());
                    }
                    delivered = inbound.send(message) => delivered,
                };

                if delivered.is_err() {
                    debug!(
                        connection_id = details.connection_id,
                        "Inbound consumer dropped; stopping read loop"
                    );
                    return Ok(());
                }
            }
            None => {
                debug!(
                    connection_id = details.connection_id,
                    "Read loop reached end of stream"
                );
                return Ok(());
            }
        }
    }
}

/// Dequeue from the outgoing queue (suspending when empty) and push each
/// message through the sink. The single authorized writer.
pub(crate) async fn write_loop<H, C>(
    mut queue: MessageQueueReceiver<C::Payload>,
    sink: Arc<PacketSink<BoxedWriter, H, C>>,
    cancel: CancellationToken,
    details: SessionDetails,
) -> Result<()>
where
    H: HeaderCodec,
    C: MessageCodec,
{
    loop {
        let payload = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            dequeued = queue.dequeue() => match dequeued {
                Some(payload) => payload,
                None => {
                    debug!(
                        connection_id = details.connection_id,
                        "All producers dropped; stopping write loop"
                    );
                    return Ok(());
                }
            },
        };

        // The send itself must also observe cancellation: a peer applying
        // back-pressure can stall the flush indefinitely, and an abandoned
        // send releases the sink lock so teardown can close the stream.
        let result = tokio::select! {
            _ = cancel.cancelled() => {
                debug!(
                    connection_id = details.connection_id,
                    "Cancelled during send; stopping write loop"
                );
                return Ok(());
            }
            result = sink.send_message(&payload) => result,
        };

        if !result.is_delivered() {
            debug!(
                connection_id = details.connection_id,
                ?result,
                "Send did not complete; stopping write loop"
            );
            return Ok(());
        }
    }
}
