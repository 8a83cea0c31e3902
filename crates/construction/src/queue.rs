//! Bounded construction queue
//!
//! Capacity is fixed at creation. Producers block when the queue is full;
//! nothing is ever dropped. The worker closes the queue once it observes the
//! shutdown signal, after which every put fails with `QueueClosed`.

use async_channel::{bounded, Receiver, Sender};
use contracts::{ContractError, QueueUnit};
use tracing::trace;

/// Name used in `QueueClosed` errors and metrics labels
pub const QUEUE_NAME: &str = "construction";

/// Returned by [`QueueProducer::try_put`]; hands the unit back
pub type TryPutError = async_channel::TrySendError<QueueUnit>;

/// Factory for the producer/consumer pair
pub struct ConstructionQueue;

impl ConstructionQueue {
    /// Create a queue holding at most `capacity` units
    ///
    /// # Panics
    /// Panics if `capacity` is 0 (rejected earlier by config validation).
    pub fn bounded(capacity: usize) -> (QueueProducer, QueueConsumer) {
        let (tx, rx) = bounded(capacity);
        (
            QueueProducer { tx, capacity },
            QueueConsumer { rx, capacity },
        )
    }
}

/// Producer side; cheap to clone across producer threads
#[derive(Debug, Clone)]
pub struct QueueProducer {
    tx: Sender<QueueUnit>,
    capacity: usize,
}

impl QueueProducer {
    /// Insert, blocking the calling thread while the queue is full
    ///
    /// Must not be called from inside an async runtime worker.
    pub fn put_blocking(&self, unit: impl Into<QueueUnit>) -> Result<(), ContractError> {
        self.tx
            .send_blocking(unit.into())
            .map_err(|_| ContractError::queue_closed(QUEUE_NAME))?;
        trace!(depth = self.tx.len(), "unit enqueued");
        Ok(())
    }

    /// Insert, suspending the calling task while the queue is full
    pub async fn put(&self, unit: impl Into<QueueUnit>) -> Result<(), ContractError> {
        self.tx
            .send(unit.into())
            .await
            .map_err(|_| ContractError::queue_closed(QUEUE_NAME))
    }

    /// Insert without waiting; the unit is handed back when full or closed
    pub fn try_put(&self, unit: impl Into<QueueUnit>) -> Result<(), TryPutError> {
        self.tx.try_send(unit.into())
    }

    /// Current depth (lock-free read, may be momentarily stale)
    pub fn len(&self) -> usize {
        self.tx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.tx.is_full()
    }

    /// Fixed capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Whether the worker has shut the queue
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consumer side, owned by the construction worker
#[derive(Debug)]
pub struct QueueConsumer {
    rx: Receiver<QueueUnit>,
    capacity: usize,
}

impl QueueConsumer {
    /// Take the next unit, blocking while the queue is empty
    ///
    /// Returns `None` once the queue is closed and drained.
    pub fn take(&self) -> Option<QueueUnit> {
        self.rx.recv_blocking().ok()
    }

    /// Take without waiting
    pub fn try_take(&self) -> Option<QueueUnit> {
        self.rx.try_recv().ok()
    }

    /// Reject every later put
    ///
    /// Returns the units still queued, in FIFO order; they are never processed.
    pub fn close(&self) -> Vec<QueueUnit> {
        self.rx.close();
        let mut rejected = Vec::new();
        while let Ok(unit) = self.rx.try_recv() {
            rejected.push(unit);
        }
        rejected
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::SignalUnit;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn signal() -> QueueUnit {
        SignalUnit::new(contracts::Signal::Flush, None).into()
    }

    #[test]
    fn test_put_beyond_capacity_blocks_until_drained() {
        let (producer, consumer) = ConstructionQueue::bounded(2);
        producer.put_blocking(signal()).unwrap();
        producer.put_blocking(signal()).unwrap();
        assert!(producer.is_full());

        let done = Arc::new(AtomicBool::new(false));
        let blocked = {
            let producer = producer.clone();
            let done = Arc::clone(&done);
            std::thread::spawn(move || {
                producer.put_blocking(signal()).unwrap();
                done.store(true, Ordering::SeqCst);
            })
        };

        std::thread::sleep(Duration::from_millis(100));
        assert!(!done.load(Ordering::SeqCst), "third put must block");
        assert_eq!(producer.len(), 2);

        assert!(consumer.take().is_some());
        blocked.join().unwrap();
        assert!(done.load(Ordering::SeqCst));
        assert_eq!(producer.len(), 2);
    }

    #[test]
    fn test_try_put_hands_unit_back_when_full() {
        let (producer, _consumer) = ConstructionQueue::bounded(1);
        assert!(producer.try_put(signal()).is_ok());
        match producer.try_put(signal()) {
            Err(TryPutError::Full(unit)) => assert!(unit.is_signal()),
            other => panic!("expected Full, got {other:?}"),
        }
    }

    #[test]
    fn test_close_rejects_later_puts() {
        let (producer, consumer) = ConstructionQueue::bounded(4);
        producer.put_blocking(signal()).unwrap();
        let rejected = consumer.close();
        assert_eq!(rejected.len(), 1);
        assert!(producer.is_closed());
        assert!(matches!(
            producer.put_blocking(signal()),
            Err(ContractError::QueueClosed { .. })
        ));
        assert!(consumer.take().is_none());
    }

    #[test]
    fn test_fifo_order() {
        let (producer, consumer) = ConstructionQueue::bounded(8);
        let signals = [
            contracts::Signal::Flush,
            contracts::Signal::TimepointFinished,
            contracts::Signal::AcquisitionFinished,
        ];
        for s in signals {
            producer.put_blocking(SignalUnit::new(s, None)).unwrap();
        }
        for expected in signals {
            match consumer.take() {
                Some(QueueUnit::Signal(unit)) => assert_eq!(unit.signal, expected),
                other => panic!("unexpected {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_async_put_waits_for_space() {
        let (producer, consumer) = ConstructionQueue::bounded(1);
        producer.put(signal()).await.unwrap();

        let pending = tokio::spawn({
            let producer = producer.clone();
            async move { producer.put(signal()).await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!pending.is_finished());

        assert!(consumer.try_take().is_some());
        pending.await.unwrap().unwrap();
        assert_eq!(consumer.len(), 1);
    }
}
