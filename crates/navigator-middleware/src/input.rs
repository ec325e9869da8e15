//! Ordered input feed for a single consumer.
//!
//! Pose updates, point batches and nominal commands share one bounded
//! [`tokio::sync::mpsc`] channel, so the consumer sees them in exactly the
//! order they were sent.  A full channel makes producers wait instead of
//! dropping input.  Once every [`InputSender`] is gone, [`InputReceiver::recv`]
//! drains what is left and then returns `None`.
//!
//! # Example
//!
//! ```rust
//! use navigator_middleware::input_channel;
//! use navigator_types::{Event, EventPayload, VehiclePose};
//!
//! let runtime = tokio::runtime::Runtime::new().unwrap();
//! runtime.block_on(async {
//!     let (tx, mut rx) = input_channel(8);
//!     let pose = EventPayload::Pose(VehiclePose::new(1.0, 0.0, 0.0));
//!     tx.send(Event::new("doc", pose)).await.unwrap();
//!     drop(tx);
//!
//!     assert!(rx.recv().await.is_some());
//!     assert!(rx.recv().await.is_none()); // every sender dropped
//! });
//! ```

use navigator_types::{Event, NavError};
use tokio::sync::mpsc;

/// Create a connected sender/receiver pair buffering up to `capacity`
/// events (at least one).
pub fn input_channel(capacity: usize) -> (InputSender, InputReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (InputSender { tx }, InputReceiver { rx })
}

/// Producer half.  Clone it to feed the same consumer from several tasks;
/// ordering is then per sender.
#[derive(Clone, Debug)]
pub struct InputSender {
    tx: mpsc::Sender<Event>,
}

impl InputSender {
    /// Queue `event`, waiting while the channel is full.
    ///
    /// Returns [`NavError::Channel`] when the consumer has gone away.
    pub async fn send(&self, event: Event) -> Result<(), NavError> {
        self.tx
            .send(event)
            .await
            .map_err(|_| NavError::Channel("input consumer has shut down".into()))
    }
}

/// Consumer half.
#[derive(Debug)]
pub struct InputReceiver {
    rx: mpsc::Receiver<Event>,
}

impl InputReceiver {
    /// Next event in send order, or `None` once all senders are dropped and
    /// the buffer is empty.
    pub async fn recv(&mut self) -> Option<Event> {
        self.rx.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use navigator_types::{ControlCommand, EventPayload, Point3, VehiclePose};

    #[tokio::test]
    async fn preserves_send_order_across_payload_kinds() {
        let (tx, mut rx) = input_channel(16);
        let sent = [
            EventPayload::Pose(VehiclePose::new(0.0, 0.0, 0.0)),
            EventPayload::PointCloud(vec![Point3::new(2.0, 0.0, 0.0)]),
            EventPayload::Pose(VehiclePose::new(100.0, 0.0, 0.0)),
            EventPayload::NominalCommand(ControlCommand::new(50.0, 0.0, 0.0, 0.0)),
        ];
        let mut ids = Vec::new();
        for payload in sent {
            let event = Event::new("test::feed", payload);
            ids.push(event.id);
            tx.send(event).await.unwrap();
        }
        drop(tx);

        let mut received = Vec::new();
        while let Some(event) = rx.recv().await {
            received.push(event.id);
        }
        assert_eq!(received, ids);
    }

    #[tokio::test]
    async fn send_fails_once_receiver_is_dropped() {
        let (tx, rx) = input_channel(4);
        drop(rx);
        let result = tx
            .send(Event::new("test::feed", EventPayload::PointCloud(Vec::new())))
            .await;
        assert!(matches!(result, Err(NavError::Channel(_))));
    }

    #[tokio::test]
    async fn full_channel_applies_backpressure() {
        let (tx, mut rx) = input_channel(1);
        tx.send(Event::new("test::feed", EventPayload::PointCloud(Vec::new())))
            .await
            .unwrap();

        // The second send cannot complete until the first event is consumed.
        let blocked = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            tx.send(Event::new("test::feed", EventPayload::PointCloud(Vec::new()))),
        )
        .await;
        assert!(blocked.is_err());

        assert!(rx.recv().await.is_some());
        tx.send(Event::new("test::feed", EventPayload::PointCloud(Vec::new())))
            .await
            .unwrap();
        assert!(rx.recv().await.is_some());
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let (tx, _rx) = input_channel(0);
        assert_eq!(tx.tx.max_capacity(), 1);
    }
}
