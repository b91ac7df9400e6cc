//! # Frame Reader / Writer
//!
//! The streaming packet-framing state machine. Reconstructs discrete
//! `[header][payload]` frames from partial, arbitrarily-chunked byte
//! deliveries, and serializes outgoing messages payload-first into pooled
//! packet buffers.
//!
//! ## Reading
//! Bytes pulled from the transport accumulate in a [`BytesMut`]; bytes that
//! have been inspected but not yet consumed simply stay buffered across
//! calls, which realizes partial-header and partial-payload retry without
//! copying. Consumption always advances by exactly the byte counts the
//! header codec declares, never by buffer lengths.
//!
//! ## Writing
//! The payload is serialized first, into the region after the maximum header
//! size, because most header encodings embed the payload length. The header
//! is then encoded into the leading region. This ordering is structural, not
//! incidental.
//!
//! ## Concurrency
//! A [`FrameReader`] is driven by exactly one task (the session's read loop).
//! A [`FrameWriter`] is not safe for concurrent writers; sends are serialized
//! through [`crate::session::PacketSink`].

use crate::config::ConnectionOptions;
use crate::core::codec::{IncomingMessage, MessageCodec};
use crate::core::header::{HeaderCodec, PacketHeader};
use crate::error::{ProtocolError, Result};
use crate::utils::buffer_pool::{BufferPool, PooledBuffer};
use bytes::{Buf, BytesMut};
use std::io;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// Injected overrides for the frame read path.
///
/// Replaces what would otherwise be subclass hook methods: protocols with
/// block/chunk padding can widen the readability requirement and the number
/// of bytes discarded per payload.
pub struct ReadStrategy<H> {
    /// Whether enough bytes are available to read the payload. Default:
    /// available bytes >= the header's declared payload size.
    pub is_payload_readable: Option<Box<dyn Fn(&[u8], &H) -> bool + Send + Sync>>,

    /// How many buffered bytes the payload occupies on the wire. Default:
    /// the header's declared payload size. Block-based protocols may consume
    /// additional discarded padding.
    pub payload_bytes_read: Option<Box<dyn Fn(&H) -> usize + Send + Sync>>,
}

impl<H> Default for ReadStrategy<H> {
    fn default() -> Self {
        Self {
            is_payload_readable: None,
            payload_bytes_read: None,
        }
    }
}

/// Injected overrides for the frame write path.
#[derive(Default)]
pub struct WriteStrategy {
    /// Mutate the final packet buffer and adjust its length right before it
    /// is handed to the transport. Covers block-padding transports. Receives
    /// the buffer and the true length, returns the length to commit.
    pub before_send: Option<Box<dyn Fn(&mut [u8], usize) -> usize + Send + Sync>>,
}

/// Outcome of one attempt to pull more bytes from the transport.
enum Fill {
    /// At least one new byte is buffered.
    Data,
    /// The stream reported end-of-stream or an abort-equivalent error.
    Closed,
    /// The read was cancelled via the session's token.
    Cancelled,
}

/// Reconstructs one complete [`IncomingMessage`] per call from a byte stream
/// that yields availability in chunks not aligned with message boundaries.
pub struct FrameReader<R, H: HeaderCodec, C> {
    stream: R,
    buffer: BytesMut,
    options: Arc<ConnectionOptions>,
    headers: Arc<H>,
    messages: Arc<C>,
    pool: BufferPool,
    strategy: ReadStrategy<H::Header>,
}

impl<R, H, C> FrameReader<R, H, C>
where
    R: AsyncRead + Unpin + Send,
    H: HeaderCodec,
    C: MessageCodec,
{
    pub fn new(stream: R, options: Arc<ConnectionOptions>, headers: Arc<H>, messages: Arc<C>) -> Self {
        let pool = options.packet_buffer_pool();
        Self {
            stream,
            buffer: BytesMut::with_capacity(options.max_packet_size().min(64 * 1024)),
            options,
            headers,
            messages,
            pool,
            strategy: ReadStrategy::default(),
        }
    }

    pub fn with_strategy(mut self, strategy: ReadStrategy<H::Header>) -> Self {
        self.strategy = strategy;
        self
    }

    /// Read the next complete message from the stream.
    ///
    /// Returns `Ok(None)` on graceful end: the stream closed at a frame
    /// boundary or the token was cancelled. A stream that ends mid-payload
    /// yields [`ProtocolError::TruncatedFrame`]; a payload that fails to
    /// decode propagates its error. Both abort the session's read loop, the
    /// protocol defines no resync marker to recover with.
    pub async fn read_message(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<Option<IncomingMessage<H::Header, C::Payload>>> {
        // Header phase: wait until the codec can decode a header.
        while self.buffer.len() < self.options.min_header_size
            || !self.headers.is_header_readable(&self.buffer)
        {
            match self.fill(cancel).await? {
                Fill::Data => {}
                Fill::Closed | Fill::Cancelled => {
                    // Release inspected-but-unconsumed bytes; graceful end.
                    self.buffer.clear();
                    return Ok(None);
                }
            }
        }

        // The codec's reported size is authoritative, never the buffer length.
        let header_size = self.headers.header_size(&self.buffer);
        let header = self.headers.decode(&self.buffer[..header_size])?;
        self.buffer.advance(header_size);

        // A packet equal to its header size carries an empty payload; all the
        // data for the packet already exists.
        if header.total_size() == header_size {
            let payload = self.messages.deserialize(&[])?;
            return Ok(Some(IncomingMessage::new(header, payload)));
        }

        if header.payload_size() > self.options.max_payload_size {
            return Err(ProtocolError::OversizedPacket(header.payload_size()));
        }

        // Payload phase: a transport delivering piecemeal is retried here.
        while !self.payload_readable(&header) {
            match self.fill(cancel).await? {
                Fill::Data => {}
                Fill::Cancelled => {
                    self.buffer.clear();
                    return Ok(None);
                }
                Fill::Closed => {
                    return Err(ProtocolError::TruncatedFrame {
                        expected: header.payload_size(),
                        available: self.buffer.len(),
                    })
                }
            }
        }

        // Copy into a pooled scratch buffer so transport-owned memory is
        // never exposed past this call.
        let mut scratch = self.pool.acquire(header.payload_size());
        scratch.extend_from_slice(&self.buffer[..header.payload_size()]);
        let decoded = self.messages.deserialize(&scratch);

        // Consume exactly what the header declared, even if decoding read a
        // different offset internally. Header over serialization, always.
        self.buffer.advance(self.payload_consumed(&header));

        let payload = decoded?;
        trace!(
            payload_size = header.payload_size(),
            "Frame read from stream"
        );
        Ok(Some(IncomingMessage::new(header, payload)))
    }

    fn payload_readable(&self, header: &H::Header) -> bool {
        match &self.strategy.is_payload_readable {
            Some(check) => check(&self.buffer, header),
            None => self.buffer.len() >= header.payload_size(),
        }
    }

    fn payload_consumed(&self, header: &H::Header) -> usize {
        match &self.strategy.payload_bytes_read {
            Some(compute) => compute(header),
            None => header.payload_size(),
        }
    }

    /// Pull the next chunk from the transport into the buffer.
    ///
    /// An abort-style I/O error between state checks is indistinguishable
    /// from a close, so it is reported as one rather than as a fault.
    async fn fill(&mut self, cancel: &CancellationToken) -> Result<Fill> {
        tokio::select! {
            _ = cancel.cancelled() => Ok(Fill::Cancelled),
            read = self.stream.read_buf(&mut self.buffer) => match read {
                Ok(0) => Ok(Fill::Closed),
                Ok(_) => Ok(Fill::Data),
                Err(e) if is_abort(&e) => Ok(Fill::Closed),
                Err(e) => Err(e.into()),
            },
        }
    }
}

fn is_abort(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof
    )
}

/// Serializes one outgoing message at a time into a rented packet buffer and
/// commits it to the output stream.
///
/// The packet buffer is rented once at construction and zeroed once; each
/// send touches only the bytes of its own frame.
pub struct FrameWriter<W, H, C> {
    stream: W,
    options: Arc<ConnectionOptions>,
    headers: Arc<H>,
    messages: Arc<C>,
    scratch: PooledBuffer,
    strategy: WriteStrategy,
}

impl<W, H, C> FrameWriter<W, H, C>
where
    W: AsyncWrite + Unpin + Send,
    H: HeaderCodec,
    C: MessageCodec,
{
    pub fn new(stream: W, options: Arc<ConnectionOptions>, headers: Arc<H>, messages: Arc<C>) -> Self {
        let mut scratch = options.packet_buffer_pool().acquire(options.max_packet_size());
        scratch.resize(options.max_packet_size(), 0);
        Self {
            stream,
            options,
            headers,
            messages,
            scratch,
            strategy: WriteStrategy::default(),
        }
    }

    pub fn with_strategy(mut self, strategy: WriteStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn set_strategy(&mut self, strategy: WriteStrategy) {
        self.strategy = strategy;
    }

    /// Serialize one message and flush it to the transport.
    ///
    /// The flush is where back-pressure is observed: a slow consumer stalls
    /// the caller here instead of letting output race ahead.
    pub async fn write_message(&mut self, payload: &C::Payload) -> Result<()> {
        // Payload first: the header can't be built until its size is known.
        let header_region = self.options.min_header_size;
        let payload_size = self
            .messages
            .serialize(payload, &mut self.scratch[header_region..])?;

        if payload_size > self.options.max_payload_size {
            return Err(ProtocolError::OversizedPacket(payload_size));
        }

        let max_header = self.options.max_header_size;
        let header_size = self
            .headers
            .encode(payload_size, &mut self.scratch[..max_header])?;

        if header_size != self.options.min_header_size {
            return Err(ProtocolError::UnsupportedHeaderSize {
                expected: self.options.min_header_size,
                actual: header_size,
            });
        }

        let mut length = header_size + payload_size;
        if let Some(hook) = &self.strategy.before_send {
            length = hook(&mut self.scratch, length);
        }

        self.stream.write_all(&self.scratch[..length]).await?;
        self.stream.flush().await?;

        trace!(payload_size, length, "Frame flushed to stream");
        Ok(())
    }

    /// Best-effort graceful shutdown of the output stream.
    pub async fn close(&mut self) -> Result<()> {
        self.stream.shutdown().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::codec::RawCodec;
    use crate::core::header::LengthPrefixCodec;

    fn options() -> Arc<ConnectionOptions> {
        Arc::new(ConnectionOptions::new(4, 4, 1024))
    }

    #[tokio::test]
    async fn writer_then_reader_roundtrip() {
        let (client, server) = tokio::io::duplex(256);

        let headers = Arc::new(LengthPrefixCodec);
        let messages = Arc::new(RawCodec);

        let mut writer = FrameWriter::new(client, options(), headers.clone(), messages.clone());
        writer.write_message(&vec![9, 8, 7]).await.unwrap();

        let mut reader = FrameReader::new(server, options(), headers, messages);
        let cancel = CancellationToken::new();
        let msg = reader.read_message(&cancel).await.unwrap().unwrap();
        assert_eq!(msg.payload, vec![9, 8, 7]);
        assert_eq!(msg.header.payload_size(), 3);
    }

    #[tokio::test]
    async fn scratch_reuse_never_leaks_previous_frame() {
        let (client, mut server) = tokio::io::duplex(256);

        let mut writer = FrameWriter::new(
            client,
            options(),
            Arc::new(LengthPrefixCodec),
            Arc::new(RawCodec),
        );
        // A long frame followed by a short one: the short frame must contain
        // none of the long frame's bytes.
        writer.write_message(&vec![0xFF; 8]).await.unwrap();
        writer.write_message(&vec![0x01, 0x02]).await.unwrap();

        let mut wire = [0u8; 18];
        tokio::io::AsyncReadExt::read_exact(&mut server, &mut wire)
            .await
            .unwrap();
        assert_eq!(&wire[..4], &[0, 0, 0, 8]);
        assert!(wire[4..12].iter().all(|b| *b == 0xFF));
        assert_eq!(&wire[12..], &[0, 0, 0, 2, 0x01, 0x02]);
    }

    #[tokio::test]
    async fn reader_graceful_eof() {
        let (client, server) = tokio::io::duplex(64);
        drop(client);

        let mut reader = FrameReader::new(
            server,
            options(),
            Arc::new(LengthPrefixCodec),
            Arc::new(RawCodec),
        );
        let cancel = CancellationToken::new();
        assert!(reader.read_message(&cancel).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn reader_cancelled_before_frame() {
        let (_client, server) = tokio::io::duplex(64);

        let mut reader = FrameReader::new(
            server,
            options(),
            Arc::new(LengthPrefixCodec),
            Arc::new(RawCodec),
        );
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(reader.read_message(&cancel).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn truncated_payload_is_an_error() {
        let (mut client, server) = tokio::io::duplex(64);
        // Header declares 8 payload bytes, only 2 arrive before close.
        tokio::io::AsyncWriteExt::write_all(&mut client, &[0, 0, 0, 8, 1, 2])
            .await
            .unwrap();
        drop(client);

        let mut reader = FrameReader::new(
            server,
            options(),
            Arc::new(LengthPrefixCodec),
            Arc::new(RawCodec),
        );
        let cancel = CancellationToken::new();
        let err = reader.read_message(&cancel).await.unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::TruncatedFrame {
                expected: 8,
                available: 2
            }
        ));
    }

    #[tokio::test]
    async fn writer_rejects_oversized_payload() {
        let (client, _server) = tokio::io::duplex(64);

        let mut writer = FrameWriter::new(
            client,
            options(),
            Arc::new(LengthPrefixCodec),
            Arc::new(RawCodec),
        );
        let err = writer.write_message(&vec![0u8; 2048]).await.unwrap_err();
        assert!(matches!(err, ProtocolError::SerializeError(_)));
    }

    #[tokio::test]
    async fn oversized_header_claim_rejected() {
        let (mut client, server) = tokio::io::duplex(64);
        // Header claims more than max_payload_size.
        tokio::io::AsyncWriteExt::write_all(&mut client, &[0, 0, 0x10, 0, 1])
            .await
            .unwrap();

        let mut reader = FrameReader::new(
            server,
            options(),
            Arc::new(LengthPrefixCodec),
            Arc::new(RawCodec),
        );
        let cancel = CancellationToken::new();
        let err = reader.read_message(&cancel).await.unwrap_err();
        assert!(matches!(err, ProtocolError::OversizedPacket(_)));
    }

    #[tokio::test]
    async fn before_send_hook_pads_packet() {
        let (client, server) = tokio::io::duplex(256);

        // Pad every packet to 16 bytes, as a block transport would.
        let strategy = WriteStrategy {
            before_send: Some(Box::new(|buf: &mut [u8], length| {
                for b in &mut buf[length..16] {
                    *b = 0;
                }
                16
            })),
        };

        let mut writer = FrameWriter::new(
            client,
            options(),
            Arc::new(LengthPrefixCodec),
            Arc::new(RawCodec),
        )
        .with_strategy(strategy);
        writer.write_message(&vec![1, 2, 3]).await.unwrap();

        let mut received = vec![0u8; 16];
        let mut server = server;
        tokio::io::AsyncReadExt::read_exact(&mut server, &mut received)
            .await
            .unwrap();
        assert_eq!(&received[..7], &[0, 0, 0, 3, 1, 2, 3]);
    }
}
