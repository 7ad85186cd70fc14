//! Arrival queue: hand-off from the transport feed into the control loop.
//!
//! Unbounded by default, so enqueueing never suspends the feed. The bounded
//! mode applies backpressure instead. Neither mode drops messages.

use tokio::sync::mpsc;

use crate::error::QueueError;
use crate::message::Message;

/// Create an arrival queue. `None` capacity means unbounded.
pub fn arrival_queue(capacity: Option<usize>) -> (ArrivalSender, ArrivalReceiver) {
    match capacity {
        Some(cap) => {
            let (tx, rx) = mpsc::channel(cap);
            (
                ArrivalSender { inner: SenderInner::Bounded(tx) },
                ArrivalReceiver { inner: ReceiverInner::Bounded(rx) },
            )
        }
        None => {
            let (tx, rx) = mpsc::unbounded_channel();
            (
                ArrivalSender { inner: SenderInner::Unbounded(tx) },
                ArrivalReceiver { inner: ReceiverInner::Unbounded(rx) },
            )
        }
    }
}

#[derive(Clone)]
enum SenderInner {
    Unbounded(mpsc::UnboundedSender<Message>),
    Bounded(mpsc::Sender<Message>),
}

/// Sending half, held by the transport feed. Cheap to clone.
#[derive(Clone)]
pub struct ArrivalSender {
    inner: SenderInner,
}

impl ArrivalSender {
    /// Deposit a message into the pipeline.
    ///
    /// Fails only once the pipeline has stopped receiving; the message is then
    /// dropped unacknowledged and the broker will redeliver it.
    pub async fn enqueue(&self, message: Message) -> Result<(), QueueError> {
        let result = match &self.inner {
            SenderInner::Unbounded(tx) => tx.send(message).map_err(|e| e.0),
            SenderInner::Bounded(tx) => tx.send(message).await.map_err(|e| e.0),
        };
        result.map_err(|msg| QueueError::Closed(msg.id().to_string()))
    }

    pub fn is_closed(&self) -> bool {
        match &self.inner {
            SenderInner::Unbounded(tx) => tx.is_closed(),
            SenderInner::Bounded(tx) => tx.is_closed(),
        }
    }
}

enum ReceiverInner {
    Unbounded(mpsc::UnboundedReceiver<Message>),
    Bounded(mpsc::Receiver<Message>),
}

/// Receiving half, owned by the control loop.
pub struct ArrivalReceiver {
    inner: ReceiverInner,
}

impl ArrivalReceiver {
    /// Wait for the next message. `None` once closed and drained.
    pub async fn recv(&mut self) -> Option<Message> {
        match &mut self.inner {
            ReceiverInner::Unbounded(rx) => rx.recv().await,
            ReceiverInner::Bounded(rx) => rx.recv().await,
        }
    }

    /// Stop accepting new messages. Already queued messages stay receivable.
    pub fn close(&mut self) {
        match &mut self.inner {
            ReceiverInner::Unbounded(rx) => rx.close(),
            ReceiverInner::Bounded(rx) => rx.close(),
        }
    }

    pub fn len(&self) -> usize {
        match &self.inner {
            ReceiverInner::Unbounded(rx) => rx.len(),
            ReceiverInner::Bounded(rx) => rx.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
