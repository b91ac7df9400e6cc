//! # Packet Sink
//!
//! The single authorized write path of a session: serializes sends from any
//! number of producer tasks through one mutual-exclusion lock held across
//! serialize+flush.
//!
//! Callers always receive a [`SendResult`]; transport-level failure is a
//! value, never a propagated error.

use crate::core::codec::MessageCodec;
use crate::core::framing::FrameWriter;
use crate::core::header::HeaderCodec;
use crate::error::Result;
use crate::session::details::SendResult;
use crate::transport::ConnectionService;
use std::sync::Arc;
use tokio::io::AsyncWrite;
use tokio::sync::Mutex;
use tracing::warn;

/// Mutex-serialized frame writer shared by a session's writer task and any
/// direct senders.
pub struct PacketSink<W, H, C> {
    writer: Mutex<FrameWriter<W, H, C>>,
    connection: Arc<dyn ConnectionService>,
}

impl<W, H, C> PacketSink<W, H, C>
where
    W: AsyncWrite + Unpin + Send,
    H: HeaderCodec,
    C: MessageCodec,
{
    pub fn new(writer: FrameWriter<W, H, C>, connection: Arc<dyn ConnectionService>) -> Self {
        Self {
            writer: Mutex::new(writer),
            connection,
        }
    }

    /// Serialize and flush one message.
    ///
    /// Returns immediately with [`SendResult::Disconnected`] if the transport
    /// is known-closed. Otherwise suspends only while another send holds the
    /// lock. It is not safe to write a stream from multiple tasks at once;
    /// the lock is held across the entire serialize+flush.
    pub async fn send_message(&self, payload: &C::Payload) -> SendResult {
        if !self.connection.is_connected() {
            return SendResult::Disconnected;
        }

        let mut writer = self.writer.lock().await;
        match writer.write_message(payload).await {
            Ok(()) => SendResult::Sent,
            Err(e) => {
                warn!(error = %e, "Failed to write outgoing message");
                SendResult::Error
            }
        }
    }

    /// Replace the writer's strategy, if no send currently holds the lock.
    ///
    /// Intended for session setup, before the writer task starts. Returns
    /// whether the strategy was applied.
    pub fn set_write_strategy(&self, strategy: crate::core::framing::WriteStrategy) -> bool {
        match self.writer.try_lock() {
            Ok(mut writer) => {
                writer.set_strategy(strategy);
                true
            }
            Err(_) => false,
        }
    }

    /// Best-effort graceful shutdown of the underlying output stream.
    ///
    /// Safe to call more than once; a second shutdown may surface an error
    /// but never corrupts state.
    pub async fn close(&self) -> Result<()> {
        self.writer.lock().await.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConnectionOptions;
    use crate::core::codec::RawCodec;
    use crate::core::header::LengthPrefixCodec;
    use crate::transport::FlagConnectionService;

    fn sink_over_duplex() -> (
        PacketSink<tokio::io::DuplexStream, LengthPrefixCodec, RawCodec>,
        tokio::io::DuplexStream,
        Arc<FlagConnectionService>,
    ) {
        let (client, server) = tokio::io::duplex(1024);
        let options = Arc::new(ConnectionOptions::new(4, 4, 256));
        let writer = FrameWriter::new(
            client,
            options,
            Arc::new(LengthPrefixCodec),
            Arc::new(RawCodec),
        );
        let service = Arc::new(FlagConnectionService::connected());
        let sink = PacketSink::new(writer, service.clone());
        (sink, server, service)
    }

    #[tokio::test]
    async fn sends_report_sent() {
        let (sink, mut server, _service) = sink_over_duplex();
        assert_eq!(sink.send_message(&vec![1, 2]).await, SendResult::Sent);

        let mut received = [0u8; 6];
        tokio::io::AsyncReadExt::read_exact(&mut server, &mut received)
            .await
            .unwrap();
        assert_eq!(received, [0, 0, 0, 2, 1, 2]);
    }

    #[tokio::test]
    async fn disconnected_before_lock() {
        let (sink, _server, service) = sink_over_duplex();
        service.set_connected(false);
        assert_eq!(
            sink.send_message(&vec![1]).await,
            SendResult::Disconnected
        );
    }
}
