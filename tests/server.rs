//! Server lifecycle integration tests over real TCP: admission control,
//! connection-id allocation, registry maintenance and cascading shutdown.

use netsession::config::{ConnectionOptions, ServerConfig};
use netsession::core::codec::RawCodec;
use netsession::core::framing::{FrameReader, FrameWriter};
use netsession::core::header::LengthPrefixCodec;
use netsession::error::Result;
use netsession::service::{ServerApplication, SessionCreationContext, SessionFactory};
use netsession::session::ManagedSession;
use netsession::transport::tcp::{bind_listener, TcpConnection};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

fn options() -> Arc<ConnectionOptions> {
    Arc::new(ConnectionOptions::new(4, 4, 64 * 1024))
}

/// Echoes every inbound frame back to its sender. Admission is controlled
/// by a shared flag so tests can reject connections on demand.
struct EchoFactory {
    options: Arc<ConnectionOptions>,
    accepting: Arc<AtomicBool>,
}

impl SessionFactory for EchoFactory {
    type Headers = LengthPrefixCodec;
    type Messages = RawCodec;

    fn is_client_acceptable(&self, _stream: &TcpStream) -> bool {
        self.accepting.load(Ordering::SeqCst)
    }

    fn create(
        &self,
        context: SessionCreationContext,
    ) -> Result<ManagedSession<LengthPrefixCodec, RawCodec>> {
        let connection = TcpConnection::from_stream(context.stream);
        let (inbound_tx, mut inbound_rx) = mpsc::channel(64);

        let session = ManagedSession::new(
            self.options.clone(),
            context.details,
            Box::new(connection.read_half),
            Box::new(connection.write_half),
            connection.service,
            Arc::new(LengthPrefixCodec),
            Arc::new(RawCodec),
            inbound_tx,
            64,
        );

        let handle = session.handle();
        tokio::spawn(async move {
            while let Some(message) = inbound_rx.recv().await {
                handle.send(message.payload);
            }
        });

        Ok(session)
    }
}

/// Server over an ephemeral localhost port with its accept loop running.
fn start_server(
    accepting: bool,
) -> (
    Arc<ServerApplication<EchoFactory>>,
    SocketAddr,
    Arc<AtomicBool>,
    Arc<AtomicUsize>,
) {
    let accepting = Arc::new(AtomicBool::new(accepting));
    let factory = EchoFactory {
        options: options(),
        accepting: accepting.clone(),
    };

    let ended = Arc::new(AtomicUsize::new(0));
    let counter = ended.clone();
    let server = Arc::new(
        ServerApplication::new(ServerConfig::default(), factory).on_session_ended(
            move |_details| {
                counter.fetch_add(1, Ordering::SeqCst);
            },
        ),
    );

    let listener = bind_listener("127.0.0.1:0".parse().unwrap(), 16).unwrap();
    let addr = listener.local_addr().unwrap();

    let accept_loop = server.clone();
    tokio::spawn(async move { accept_loop.serve(listener).await });

    (server, addr, accepting, ended)
}

struct FramedClient {
    reader: FrameReader<OwnedReadHalf, LengthPrefixCodec, RawCodec>,
    writer: FrameWriter<OwnedWriteHalf, LengthPrefixCodec, RawCodec>,
    cancel: CancellationToken,
}

impl FramedClient {
    async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.unwrap();
        let (read_half, write_half) = stream.into_split();
        Self {
            reader: FrameReader::new(
                read_half,
                options(),
                Arc::new(LengthPrefixCodec),
                Arc::new(RawCodec),
            ),
            writer: FrameWriter::new(
                write_half,
                options(),
                Arc::new(LengthPrefixCodec),
                Arc::new(RawCodec),
            ),
            cancel: CancellationToken::new(),
        }
    }

    async fn echo_roundtrip(&mut self, payload: Vec<u8>) {
        self.writer.write_message(&payload).await.unwrap();
        let reply = timeout(Duration::from_secs(5), self.reader.read_message(&self.cancel))
            .await
            .expect("echo reply never arrived")
            .unwrap()
            .unwrap();
        assert_eq!(reply.payload, payload);
    }

    /// Wait for the server to close the connection.
    async fn expect_closed(&mut self) {
        let next = timeout(Duration::from_secs(5), self.reader.read_message(&self.cancel))
            .await
            .expect("connection was not closed")
            .unwrap();
        assert!(next.is_none());
    }
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached within 5s");
}

#[tokio::test]
async fn rejected_connections_consume_nothing() {
    let (server, addr, accepting, _ended) = start_server(false);

    // Rejected: the transport is closed without a session or an id.
    let mut rejected = FramedClient::connect(addr).await;
    rejected.expect_closed().await;

    assert_eq!(server.lifetime_connection_count(), 0);
    assert_eq!(server.session_count(), 0);

    // The next admitted connection gets id 1, proving rejection consumed
    // no id.
    accepting.store(true, Ordering::SeqCst);
    let mut admitted = FramedClient::connect(addr).await;
    admitted.echo_roundtrip(vec![1, 2, 3]).await;

    assert_eq!(server.lifetime_connection_count(), 1);
    assert_eq!(server.session_count(), 1);
    assert!(server.session_handle(1).is_some());

    server.shutdown();
}

#[tokio::test]
async fn connection_ids_are_monotonic() {
    let (server, addr, _accepting, _ended) = start_server(true);

    let mut first = FramedClient::connect(addr).await;
    first.echo_roundtrip(vec![0xA0]).await;
    let mut second = FramedClient::connect(addr).await;
    second.echo_roundtrip(vec![0xB0]).await;

    assert_eq!(server.lifetime_connection_count(), 2);
    assert!(server.session_handle(1).is_some());
    assert!(server.session_handle(2).is_some());
    assert!(server.session_handle(3).is_none());

    server.shutdown();
}

#[tokio::test]
async fn client_disconnect_unregisters_session() {
    let (server, addr, _accepting, ended) = start_server(true);

    let mut client = FramedClient::connect(addr).await;
    client.echo_roundtrip(vec![9, 9]).await;
    assert_eq!(server.session_count(), 1);

    drop(client);

    wait_until(|| server.session_count() == 0).await;
    assert_eq!(ended.load(Ordering::SeqCst), 1);

    // The lifetime count never decreases and the id is never reused.
    assert_eq!(server.lifetime_connection_count(), 1);
    assert!(server.session_handle(1).is_none());

    server.shutdown();
}

#[tokio::test]
async fn shutdown_cascades_into_all_sessions() {
    let (server, addr, _accepting, ended) = start_server(true);

    let mut first = FramedClient::connect(addr).await;
    first.echo_roundtrip(vec![1]).await;
    let mut second = FramedClient::connect(addr).await;
    second.echo_roundtrip(vec![2]).await;
    assert_eq!(server.session_count(), 2);

    server.shutdown();

    // Both sessions are torn down, each fires its end event exactly once,
    // and each client observes the close.
    first.expect_closed().await;
    second.expect_closed().await;

    wait_until(|| server.session_count() == 0).await;
    assert_eq!(ended.load(Ordering::SeqCst), 2);
}
