//! # Outgoing Message Queue
//!
//! Ordered, thread-safe handoff between producer `send` calls and a
//! session's single writer task.
//!
//! Built on a bounded `tokio::sync::mpsc` channel: FIFO per session, the
//! dequeue side suspends when empty, and a full queue reports
//! [`SendResult::Dropped`] instead of blocking producers.

use crate::session::details::SendResult;
use tokio::sync::mpsc;

/// Producer half of a session's outgoing queue. Cheap to clone.
pub struct MessageQueue<T> {
    tx: mpsc::Sender<T>,
}

// Manual impl: the sender clones for any T, the payload never does.
impl<T> Clone for MessageQueue<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

/// Consumer half, owned by the session's writer task.
pub struct MessageQueueReceiver<T> {
    rx: mpsc::Receiver<T>,
}

/// Create a bounded outgoing queue.
pub fn outgoing_queue<T>(capacity: usize) -> (MessageQueue<T>, MessageQueueReceiver<T>) {
    let (tx, rx) = mpsc::channel(capacity);
    (MessageQueue { tx }, MessageQueueReceiver { rx })
}

impl<T> MessageQueue<T> {
    /// Enqueue a message for the writer task without blocking.
    pub fn enqueue(&self, message: T) -> SendResult {
        match self.tx.try_send(message) {
            Ok(()) => SendResult::Queued,
            Err(mpsc::error::TrySendError::Full(_)) => SendResult::Dropped,
            Err(mpsc::error::TrySendError::Closed(_)) => SendResult::Disconnected,
        }
    }

    /// Whether the consuming writer task is still alive.
    pub fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }
}

impl<T> MessageQueueReceiver<T> {
    /// Dequeue the next message, suspending while the queue is empty.
    ///
    /// Returns `None` once every producer handle is dropped.
    pub async fn dequeue(&mut self) -> Option<T> {
        self.rx.recv().await
    }
}
