//! # netsession
//!
//! Transport-agnostic session framework for binary, length-prefixed network
//! protocols used by real-time client/server applications.
//!
//! The crate owns three hard problems:
//! - **Packet framing**: a streaming state machine that reconstructs
//!   discrete messages from partial, arbitrarily-chunked byte deliveries
//!   ([`core::framing`])
//! - **Per-connection concurrency**: independent read and write tasks per
//!   session, started, cancelled and torn down as a unit without leaking
//!   resources or losing the termination event ([`session`])
//! - **Server lifecycle**: accept, admission control, session registration
//!   and cascading shutdown across many concurrent connections ([`service`])
//!
//! Wire codecs are pluggable: any [`core::header::HeaderCodec`] and
//! [`core::codec::MessageCodec`] pair can drive a session. Transports are
//! adapters over plain async byte streams ([`transport`]).
//!
//! ## Example
//! ```rust,no_run
//! use std::sync::Arc;
//! use tokio::sync::mpsc;
//! use netsession::config::{ConnectionOptions, ServerConfig};
//! use netsession::core::codec::RawCodec;
//! use netsession::core::header::LengthPrefixCodec;
//! use netsession::error::Result;
//! use netsession::service::{ServerApplication, SessionCreationContext, SessionFactory};
//! use netsession::session::ManagedSession;
//! use netsession::transport::tcp::TcpConnection;
//!
//! struct EchoFactory {
//!     options: Arc<ConnectionOptions>,
//! }
//!
//! impl SessionFactory for EchoFactory {
//!     type Headers = LengthPrefixCodec;
//!     type Messages = RawCodec;
//!
//!     fn create(
//!         &self,
//!         context: SessionCreationContext,
//!     ) -> Result<ManagedSession<LengthPrefixCodec, RawCodec>> {
//!         let connection = TcpConnection::from_stream(context.stream);
//!         let (inbound_tx, mut inbound_rx) = mpsc::channel(64);
//!
//!         let session = ManagedSession::new(
//!             self.options.clone(),
//!             context.details,
//!             Box::new(connection.read_half),
//!             Box::new(connection.write_half),
//!             connection.service,
//!             Arc::new(LengthPrefixCodec),
//!             Arc::new(RawCodec),
//!             inbound_tx,
//!             256,
//!         );
//!
//!         // Echo every frame back through the session's handle.
//!         let handle = session.handle();
//!         tokio::spawn(async move {
//!             while let Some(message) = inbound_rx.recv().await {
//!                 handle.send(message.payload);
//!             }
//!         });
//!
//!         Ok(session)
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = ServerConfig::default_with_overrides(|c| {
//!         c.bind_address = "127.0.0.1:9000".parse().unwrap();
//!     });
//!     let factory = EchoFactory {
//!         options: Arc::new(config.connection.clone()),
//!     };
//!     ServerApplication::new(config, factory).listen().await
//! }
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod service;
pub mod session;
pub mod transport;
pub mod utils;

pub use config::{ConnectionOptions, ServerConfig};
pub use core::codec::{BincodeCodec, IncomingMessage, MessageCodec, RawCodec};
pub use core::framing::{FrameReader, FrameWriter, ReadStrategy, WriteStrategy};
pub use core::header::{HeaderCodec, LengthPrefixCodec, LengthPrefixHeader, PacketHeader};
pub use error::{ProtocolError, Result};
pub use service::{ServerApplication, SessionCreationContext, SessionFactory};
pub use session::{
    DeliveryMethod, ManagedSession, SendResult, SessionDetails, SessionHandle, SessionStarter,
};
pub use transport::ConnectionService;
