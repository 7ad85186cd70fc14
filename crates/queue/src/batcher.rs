//! Batch accumulator for arriving messages.
//!
//! Holds the open batch as two parallel vectors (messages and their
//! payloads). Sealing moves both out, so a batch handed to the processor
//! can never grow again.

use std::time::{Duration, Instant};

use bytes::Bytes;
use uuid::Uuid;

use crate::message::Message;

/// Accumulates messages into the open batch.
///
/// Flushing is driven from outside (timer tick or shutdown); the optional
/// `max_size` lets the caller flush early when the batch is full.
pub struct BatchAccumulator {
    messages: Vec<Message>,
    payloads: Vec<Bytes>,
    max_size: Option<usize>,
    batch_started: Option<Instant>,
    next_seq: u64,
}

impl BatchAccumulator {
    /// Create an empty accumulator. `None` means no size cap.
    pub fn new(max_size: Option<usize>) -> Self {
        Self {
            messages: Vec::new(),
            payloads: Vec::new(),
            max_size,
            batch_started: None,
            next_seq: 0,
        }
    }

    /// Append a message and its payload to the open batch.
    ///
    /// Returns `true` when the batch has reached `max_size`.
    pub fn push(&mut self, message: Message) -> bool {
        if self.batch_started.is_none() {
            self.batch_started = Some(Instant::now());
        }
        self.payloads.push(message.payload().clone());
        self.messages.push(message);
        self.is_full()
    }

    pub fn is_full(&self) -> bool {
        self.max_size
            .map(|max| self.messages.len() >= max)
            .unwrap_or(false)
    }

    /// Number of messages in the open batch.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Seal the open batch and start a fresh one.
    ///
    /// Returns `None` for an empty batch, which must not reach the processor.
    pub fn seal(&mut self) -> Option<SealedBatch> {
        if self.messages.is_empty() {
            return None;
        }
        let age = self
            .batch_started
            .take()
            .map(|started| started.elapsed())
            .unwrap_or_default();
        let seq = self.next_seq;
        self.next_seq += 1;

        Some(SealedBatch {
            id: Uuid::new_v4(),
            seq,
            messages: std::mem::take(&mut self.messages),
            payloads: std::mem::take(&mut self.payloads),
            age,
        })
    }
}

/// A batch that has been handed off. Read-only except for consuming its
/// messages to acknowledge them.
#[derive(Debug)]
pub struct SealedBatch {
    id: Uuid,
    seq: u64,
    messages: Vec<Message>,
    payloads: Vec<Bytes>,
    age: Duration,
}

impl SealedBatch {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Position of this batch among all batches sealed by its accumulator.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Always at least 1; [`BatchAccumulator::seal`] never yields an empty batch.
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Payloads in arrival order; index `i` belongs to message `i`.
    pub fn payloads(&self) -> &[Bytes] {
        &self.payloads
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Time from the first arrival to sealing.
    pub fn age(&self) -> Duration {
        self.age
    }

    pub fn into_messages(self) -> Vec<Message> {
        self.messages
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::message::testing::{make_message, RecordingAcker};

    fn push_all(acc: &mut BatchAccumulator, bodies: &[&str], acker: &Arc<RecordingAcker>) {
        for body in bodies {
            acc.push(make_message(body, acker));
        }
    }

    #[test]
    fn test_seal_empty_returns_none() {
        let mut acc = BatchAccumulator::new(None);
        assert!(acc.seal().is_none());
        assert!(acc.is_empty());
    }

    #[test]
    fn test_payloads_parallel_to_messages() {
        let acker = Arc::new(RecordingAcker::default());
        let mut acc = BatchAccumulator::new(None);
        push_all(&mut acc, &["a", "b", "c"], &acker);

        let batch = acc.seal().unwrap();
        assert_eq!(batch.len(), 3);
        assert_eq!(batch.payloads(), &["a", "b", "c"]);
        for (msg, payload) in batch.messages().iter().zip(batch.payloads()) {
            assert_eq!(msg.payload(), payload);
        }
    }

    #[test]
    fn test_seal_resets_and_isolates_batches() {
        let acker = Arc::new(RecordingAcker::default());
        let mut acc = BatchAccumulator::new(None);
        push_all(&mut acc, &["a", "b"], &acker);

        let first = acc.seal().unwrap();
        assert!(acc.is_empty());

        push_all(&mut acc, &["c"], &acker);
        let second = acc.seal().unwrap();

        assert_eq!(first.payloads(), &["a", "b"]);
        assert_eq!(second.payloads(), &["c"]);
        assert_eq!(first.seq(), 0);
        assert_eq!(second.seq(), 1);
        assert_ne!(first.id(), second.id());
    }

    #[test]
    fn test_push_reports_full_at_max_size() {
        let acker = Arc::new(RecordingAcker::default());
        let mut acc = BatchAccumulator::new(Some(2));

        assert!(!acc.push(make_message("a", &acker)));
        assert!(acc.push(make_message("b", &acker)));
        assert!(acc.is_full());

        acc.seal().unwrap();
        assert!(!acc.is_full());
    }

    #[test]
    fn test_unbounded_never_full() {
        let acker = Arc::new(RecordingAcker::default());
        let mut acc = BatchAccumulator::new(None);
        for i in 0..1_000 {
            assert!(!acc.push(make_message(&i.to_string(), &acker)));
        }
        assert_eq!(acc.len(), 1_000);
    }

    #[test]
    fn test_age_measured_from_first_push() {
        let acker = Arc::new(RecordingAcker::default());
        let mut acc = BatchAccumulator::new(None);
        acc.push(make_message("a", &acker));
        std::thread::sleep(Duration::from_millis(15));

        let batch = acc.seal().unwrap();
        assert!(batch.age() >= Duration::from_millis(15));
    }
}
