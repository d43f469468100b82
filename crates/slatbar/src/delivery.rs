//! Bounded hand-off from widget workers to the render consumer.
//!
//! Any worker thread may send; only the single render consumer
//! receives. `send` never blocks the caller: when the queue is
//! saturated or the consumer is gone, the failure is reported and the
//! caller logs and drops that one update. Payloads from one sender are
//! delivered in the order they were sent; ordering across different
//! senders is unspecified.

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use thiserror::Error;

use slatbar_core::WidgetKind;

/// Default queue capacity. Each widget rarely has more than one update
/// in flight, so a small multiple of the widget count is plenty.
pub const DEFAULT_CAPACITY: usize = 64;

/// One serialized snapshot in flight to the render consumer.
#[derive(Debug, Clone)]
pub struct Delivery {
    /// Which widget produced the payload.
    pub kind: WidgetKind,
    /// The snapshot in wire form.
    pub payload: String,
}

/// Why a delivery was refused.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DeliveryError {
    /// The queue is full; the consumer is not keeping up.
    #[error("delivery queue is saturated")]
    Saturated,
    /// The consumer has shut down.
    #[error("delivery channel is closed")]
    Closed,
}

/// Worker-side handle. Cloned into every worker thread.
#[derive(Debug, Clone)]
pub struct DeliverySender {
    tx: Sender<Delivery>,
}

impl DeliverySender {
    /// Queue a serialized snapshot for the render consumer.
    ///
    /// Returns immediately in all cases. Losing one update is
    /// acceptable; blocking a worker on consumer progress is not.
    pub fn send(&self, kind: WidgetKind, payload: String) -> Result<(), DeliveryError> {
        self.tx
            .try_send(Delivery { kind, payload })
            .map_err(|err| match err {
                TrySendError::Full(_) => DeliveryError::Saturated,
                TrySendError::Disconnected(_) => DeliveryError::Closed,
            })
    }
}

/// Consumer-side handle, held only by the render loop.
pub type DeliveryReceiver = Receiver<Delivery>;

/// Create the delivery channel shared by all workers.
pub fn delivery_channel(capacity: usize) -> (DeliverySender, DeliveryReceiver) {
    let (tx, rx) = bounded(capacity);
    (DeliverySender { tx }, rx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_and_receive() {
        let (tx, rx) = delivery_channel(4);

        tx.send(WidgetKind::Desktop, "p1".into()).unwrap();
        tx.send(WidgetKind::Desktop, "p2".into()).unwrap();

        assert_eq!(rx.recv().unwrap().payload, "p1");
        assert_eq!(rx.recv().unwrap().payload, "p2");
    }

    #[test]
    fn test_saturated_queue_reports_without_blocking() {
        let (tx, _rx) = delivery_channel(1);

        tx.send(WidgetKind::Weather, "p1".into()).unwrap();
        assert_eq!(
            tx.send(WidgetKind::Weather, "p2".into()),
            Err(DeliveryError::Saturated)
        );
    }

    #[test]
    fn test_closed_channel_reports() {
        let (tx, rx) = delivery_channel(1);
        drop(rx);

        assert_eq!(
            tx.send(WidgetKind::Email, "p1".into()),
            Err(DeliveryError::Closed)
        );
    }
}
