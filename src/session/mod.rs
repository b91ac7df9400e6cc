//! # Managed Sessions
//!
//! Per-connection concurrency and lifecycle: the read/write task pair, the
//! outgoing queue, the serialized send path, and the orchestration that
//! tears a session down as a unit without leaking resources or losing the
//! termination event.
//!
//! ## Components
//! - **Details**: session identity, send outcomes, delivery contracts
//! - **Queue**: FIFO handoff from producers to the single writer task
//! - **Sink**: mutex-serialized serialize+flush path
//! - **Managed**: the session itself plus its cloneable sending handle
//! - **Starter**: joint-termination orchestration (client-side reusable)

pub mod details;
pub mod managed;
pub mod queue;
pub mod sink;
pub mod starter;

pub use details::{
    DeliveryMethod, DeliveryMethodMapper, SendResult, SessionDetails, StreamDeliveryMapper,
};
pub use managed::{BoxedReader, BoxedWriter, ManagedSession, SessionHandle};
pub use queue::{outgoing_queue, MessageQueue, MessageQueueReceiver};
pub use sink::PacketSink;
pub use starter::SessionStarter;
